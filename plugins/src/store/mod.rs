pub mod filesystem;
pub mod http;
pub mod keystone;
pub mod swift;

pub use filesystem::{open_local, FilesystemStore};
pub use keystone::{select_endpoint, AdminToken, KeystoneClient};
pub use swift::{SwiftClient, SwiftConnector};
