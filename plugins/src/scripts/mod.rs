//! Task scripts: import (filesystem or object store), export, clone.

pub mod clone_image;
pub mod common;
pub mod export_store;
pub mod import_filesystem;
pub mod import_store;

pub use clone_image::CloneImageScript;
pub use export_store::ExportToStoreScript;
pub use import_filesystem::FilesystemImportScript;
pub use import_store::ObjectStoreImportScript;
