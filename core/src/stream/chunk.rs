//! Bounded-chunk reader shared by every store transport.
//!
//! A [`ChunkStream`] wraps whatever produces bytes (an HTTP body, a file, an
//! in-memory buffer) and hands them out in pieces no larger than its chunk
//! size. Uploads that split objects into segments use [`ChunkStream::read_up_to`]
//! to collect exactly one segment at a time.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;

/// Read size used when a transport does not ask for anything else.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

pub struct ChunkStream {
    inner: BoxStream<'static, Result<Bytes, StoreError>>,
    pending: Bytes,
    chunk_size: usize,
    bytes_read: u64,
    cancel: Option<CancellationToken>,
    finished: bool,
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("chunk_size", &self.chunk_size)
            .field("bytes_read", &self.bytes_read)
            .field("finished", &self.finished)
            .finish()
    }
}

impl ChunkStream {
    pub fn from_stream<S>(inner: S, chunk_size: usize) -> Self
    where
        S: Stream<Item = Result<Bytes, StoreError>> + Send + 'static,
    {
        Self {
            inner: inner.boxed(),
            pending: Bytes::new(),
            chunk_size: chunk_size.max(1),
            bytes_read: 0,
            cancel: None,
            finished: false,
        }
    }

    pub fn from_reader<R>(reader: R, chunk_size: usize) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        let chunk_size = chunk_size.max(1);
        let inner = ReaderStream::with_capacity(reader, chunk_size).map_err(StoreError::from);
        Self::from_stream(inner, chunk_size)
    }

    pub fn from_bytes(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        let data: Bytes = data.into();
        Self::from_stream(stream::iter([Ok(data)]), chunk_size)
    }

    pub fn empty() -> Self {
        Self::from_stream(stream::empty(), DEFAULT_CHUNK_SIZE)
    }

    /// Fail the next read with [`StoreError::Cancelled`] once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next piece of at most `chunk_size` bytes; `Ok(None)` at end of data.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, StoreError> {
        let max = self.chunk_size;
        self.next_bounded(max).await
    }

    /// Collects up to `limit` bytes. Returns fewer only at end of data.
    pub async fn read_up_to(&mut self, limit: usize) -> Result<Bytes, StoreError> {
        let mut buf = BytesMut::with_capacity(limit.min(self.chunk_size * 4));
        while buf.len() < limit {
            let want = (limit - buf.len()).min(self.chunk_size);
            match self.next_bounded(want).await? {
                Some(chunk) => buf.extend_from_slice(&chunk),
                None => break,
            }
        }
        Ok(buf.freeze())
    }

    pub async fn read_to_end(&mut self) -> Result<Bytes, StoreError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Re-exposes the remaining data as a `Stream` of chunks, e.g. for an
    /// HTTP request body.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Bytes, StoreError>> + Send + 'static {
        async_stream::try_stream! {
            while let Some(chunk) = self.next_chunk().await? {
                yield chunk;
            }
        }
    }

    async fn next_bounded(&mut self, max: usize) -> Result<Option<Bytes>, StoreError> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(StoreError::Cancelled);
        }

        while self.pending.is_empty() {
            if self.finished {
                return Ok(None);
            }
            let item = match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(StoreError::Cancelled),
                        item = self.inner.next() => item,
                    }
                }
                None => self.inner.next().await,
            };
            match item {
                Some(Ok(bytes)) => self.pending = bytes,
                Some(Err(e)) => return Err(e),
                None => self.finished = true,
            }
        }

        let take = max.max(1).min(self.pending.len());
        let chunk = self.pending.split_to(take);
        self.bytes_read += chunk.len() as u64;
        Ok(Some(chunk))
    }
}
