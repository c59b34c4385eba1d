#[allow(clippy::module_inception)]
pub mod error;
pub mod executor;
pub mod script;
pub mod store;

pub use error::{ImageError, RepoError, TaskError};
pub use executor::ExecutorError;
pub use script::ScriptError;
pub use store::StoreError;
