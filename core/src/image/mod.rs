//! Image metadata records that scripts create and fill with data.

pub mod factory;
pub mod memory;
pub mod model;
pub mod repository;

pub use factory::{DefaultImageFactory, ImageFactory};
pub use memory::InMemoryImageRepository;
pub use model::{Image, ImageLocation, ImageStatus, NewImage, Visibility};
pub use repository::ImageRepository;
