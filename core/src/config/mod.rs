pub mod load;
pub mod types;

pub use load::*;
pub use types::*;
