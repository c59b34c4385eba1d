use std::sync::{Arc, Mutex, PoisonError};

use futures::TryStreamExt;
use md5::{Digest, Md5};

use crate::stream::ChunkStream;

/// Running md5 of a payload plus its length. Clones share the same state so a
/// stream wrapped by [`Checksum::tap`] keeps feeding the original.
#[derive(Clone, Default)]
pub struct Checksum {
    inner: Arc<Mutex<(Md5, u64)>>,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, data: &[u8]) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.0.update(data);
        guard.1 += data.len() as u64;
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lower-case hex digest of everything seen so far.
    pub fn hex(&self) -> String {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        format!("{:x}", guard.0.clone().finalize())
    }

    /// Wraps `body` so every chunk read from it is also hashed here.
    pub fn tap(&self, body: ChunkStream) -> ChunkStream {
        let sum = self.clone();
        let chunk_size = body.chunk_size();
        ChunkStream::from_stream(
            body.into_stream().inspect_ok(move |b| sum.update(b)),
            chunk_size,
        )
    }

    pub fn of(data: &[u8]) -> String {
        format!("{:x}", Md5::digest(data))
    }
}

impl std::fmt::Debug for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checksum")
            .field("len", &self.len())
            .field("md5", &self.hex())
            .finish()
    }
}
