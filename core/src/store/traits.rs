use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::stream::ChunkStream;

/// Where an object ended up and what was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub location: String,
    /// Hex md5 of the full payload.
    pub checksum: String,
    pub size: u64,
}

/// Blob store as seen by scripts.
///
/// `get` and `add` report a missing container or object as
/// [`StoreError::NotFound`] and an existing destination as
/// [`StoreError::Duplicate`]; `add` never overwrites.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get(
        &self,
        container: &str,
        object: &str,
        auth_token: Option<&str>,
    ) -> Result<(ChunkStream, u64), StoreError>;

    /// `size == 0` means the length is not known up front.
    async fn add(
        &self,
        object_id: &str,
        data: ChunkStream,
        size: u64,
        auth_token: Option<&str>,
        container: &str,
    ) -> Result<StoredObject, StoreError>;

    async fn delete(
        &self,
        container: &str,
        object: &str,
        auth_token: Option<&str>,
    ) -> Result<(), StoreError>;

    fn location_for(&self, container: &str, object: &str) -> String {
        format!("{}://{}/{}", self.name(), container, object)
    }
}

/// One authenticated session against a container/object transport.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn head_container(&self, container: &str) -> Result<bool, StoreError>;

    /// Size of the object, `None` when it does not exist.
    async fn head_object(&self, container: &str, object: &str) -> Result<Option<u64>, StoreError>;

    async fn get_object(
        &self,
        container: &str,
        object: &str,
        chunk_size: usize,
    ) -> Result<(ChunkStream, u64), StoreError>;

    /// Writes `body` and returns the etag the backend reported. A `manifest`
    /// turns the object into a manifest for every object under that
    /// `container/prefix`.
    async fn put_object(
        &self,
        container: &str,
        object: &str,
        body: ChunkStream,
        content_length: Option<u64>,
        manifest: Option<&str>,
    ) -> Result<String, StoreError>;

    async fn delete_object(&self, container: &str, object: &str) -> Result<(), StoreError>;
}

/// Opens an [`ObjectClient`] for a caller's auth token.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self, auth_token: Option<&str>) -> Result<Arc<dyn ObjectClient>, StoreError>;
}
