pub mod chunk;

pub use chunk::{ChunkStream, DEFAULT_CHUNK_SIZE};
