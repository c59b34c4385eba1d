use std::sync::Arc;

use async_trait::async_trait;

use super::checksum::Checksum;
use super::traits::{Connector, ObjectClient, ObjectStore, StoredObject};
use crate::config::SegmentConfig;
use crate::error::StoreError;
use crate::stream::{ChunkStream, DEFAULT_CHUNK_SIZE};

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOptions {
    /// Objects of known size below this are written with one PUT.
    pub large_object_size: u64,
    pub large_object_chunk_size: u64,
    /// Chunk size handed out by streams returned from `get`.
    pub read_chunk_size: usize,
}

impl SegmentOptions {
    pub fn from_config(cfg: &SegmentConfig) -> Self {
        Self {
            large_object_size: cfg.large_object_size_mb * MB,
            large_object_chunk_size: cfg.large_object_chunk_size_mb.max(1) * MB,
            read_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self::from_config(&SegmentConfig::default())
    }
}

/// `{object}-00001`, `{object}-00002`, ...
pub fn segment_name(object_id: &str, index: usize) -> String {
    format!("{object_id}-{index:05}")
}

/// [`ObjectStore`] over any [`Connector`]: small objects go up in one PUT,
/// large or unsized ones as numbered segments joined by a manifest object.
pub struct SegmentedStore {
    connector: Arc<dyn Connector>,
    options: SegmentOptions,
}

impl SegmentedStore {
    pub fn new(connector: Arc<dyn Connector>, options: SegmentOptions) -> Self {
        Self { connector, options }
    }

    pub fn options(&self) -> &SegmentOptions {
        &self.options
    }

    async fn put_single(
        &self,
        client: &dyn ObjectClient,
        container: &str,
        object_id: &str,
        data: ChunkStream,
        size: u64,
    ) -> Result<String, StoreError> {
        let sum = Checksum::new();
        let etag = client
            .put_object(container, object_id, sum.tap(data), Some(size), None)
            .await?;

        let checksum = sum.hex();
        if sum.len() != size || (!etag.is_empty() && !etag.eq_ignore_ascii_case(&checksum)) {
            tracing::warn!(
                target: "imgtask.store",
                stage = "store.put.verify_failed",
                container = %container,
                object = %object_id,
                expected_size = size,
                sent = sum.len(),
                etag = %etag,
                checksum = %checksum
            );
            if let Err(e) = client.delete_object(container, object_id).await {
                tracing::warn!(
                    target: "imgtask.store",
                    stage = "store.put.cleanup_failed",
                    container = %container,
                    object = %object_id,
                    error = %e
                );
            }
            return Err(StoreError::Backend(format!(
                "upload of '{object_id}' could not be verified"
            )));
        }
        Ok(checksum)
    }

    /// Writes segments until `size` bytes (or end of data when `size == 0`)
    /// and then the manifest. Data beyond a known `size` is an error, as it
    /// is for single PUTs. Every segment written is pushed onto `written`
    /// so the caller can remove them if this fails.
    async fn put_segments(
        &self,
        client: &dyn ObjectClient,
        container: &str,
        object_id: &str,
        mut data: ChunkStream,
        size: u64,
        written: &mut Vec<String>,
    ) -> Result<String, StoreError> {
        let sum = Checksum::new();
        let mut index = 1;

        loop {
            let mut want = self.options.large_object_chunk_size;
            if size > 0 {
                want = want.min(size - sum.len());
                if want == 0 {
                    if !data.read_up_to(1).await?.is_empty() {
                        return Err(StoreError::Backend(format!(
                            "image data is longer than the declared {size} bytes"
                        )));
                    }
                    break;
                }
            }

            let segment = data.read_up_to(want as usize).await?;
            if segment.is_empty() {
                if size > 0 {
                    return Err(StoreError::Backend(format!(
                        "image data ended after {} of {size} bytes",
                        sum.len()
                    )));
                }
                break;
            }
            sum.update(&segment);

            let name = segment_name(object_id, index);
            let len = segment.len() as u64;
            client
                .put_object(
                    container,
                    &name,
                    ChunkStream::from_bytes(segment, self.options.read_chunk_size),
                    Some(len),
                    None,
                )
                .await?;
            tracing::debug!(
                target: "imgtask.store",
                stage = "store.segment.put",
                container = %container,
                segment = %name,
                bytes = len
            );
            written.push(name);
            index += 1;
        }

        let manifest = format!("{container}/{object_id}-");
        client
            .put_object(
                container,
                object_id,
                ChunkStream::empty(),
                Some(0),
                Some(&manifest),
            )
            .await?;
        Ok(sum.hex())
    }

    async fn cleanup(&self, client: &dyn ObjectClient, container: &str, written: &[String]) {
        for name in written {
            match client.delete_object(container, name).await {
                Ok(()) => tracing::debug!(
                    target: "imgtask.store",
                    stage = "store.segment.cleanup",
                    container = %container,
                    segment = %name
                ),
                Err(e) => tracing::warn!(
                    target: "imgtask.store",
                    stage = "store.segment.cleanup_failed",
                    container = %container,
                    segment = %name,
                    error = %e
                ),
            }
        }
    }
}

#[async_trait]
impl ObjectStore for SegmentedStore {
    fn name(&self) -> &str {
        self.connector.name()
    }

    async fn get(
        &self,
        container: &str,
        object: &str,
        auth_token: Option<&str>,
    ) -> Result<(ChunkStream, u64), StoreError> {
        let client = self.connector.connect(auth_token).await?;
        client
            .get_object(container, object, self.options.read_chunk_size)
            .await
    }

    async fn add(
        &self,
        object_id: &str,
        data: ChunkStream,
        size: u64,
        auth_token: Option<&str>,
        container: &str,
    ) -> Result<StoredObject, StoreError> {
        let client = self.connector.connect(auth_token).await?;

        if !client.head_container(container).await? {
            return Err(StoreError::NotFound(format!(
                "container '{container}' does not exist in {}",
                self.name()
            )));
        }
        if client.head_object(container, object_id).await?.is_some() {
            return Err(StoreError::Duplicate(format!(
                "{} already has an object with id '{object_id}' in container '{container}'",
                self.name()
            )));
        }

        let checksum = if size > 0 && size < self.options.large_object_size {
            self.put_single(client.as_ref(), container, object_id, data, size)
                .await?
        } else {
            let mut written = Vec::new();
            match self
                .put_segments(client.as_ref(), container, object_id, data, size, &mut written)
                .await
            {
                Ok(sum) => sum,
                Err(e) => {
                    tracing::warn!(
                        target: "imgtask.store",
                        stage = "store.segment.failed",
                        container = %container,
                        object = %object_id,
                        written = written.len(),
                        error = %e
                    );
                    self.cleanup(client.as_ref(), container, &written).await;
                    return Err(e);
                }
            }
        };

        let stored_size = match size {
            0 => client.head_object(container, object_id).await?.unwrap_or(0),
            n => n,
        };
        tracing::info!(
            target: "imgtask.store",
            stage = "store.add.done",
            store = %self.name(),
            container = %container,
            object = %object_id,
            size = stored_size
        );
        Ok(StoredObject {
            location: self.location_for(container, object_id),
            checksum,
            size: stored_size,
        })
    }

    async fn delete(
        &self,
        container: &str,
        object: &str,
        auth_token: Option<&str>,
    ) -> Result<(), StoreError> {
        let client = self.connector.connect(auth_token).await?;
        client.delete_object(container, object).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectClient;
    use pretty_assertions::assert_eq;

    fn store(client: &MemoryObjectClient, large: u64, chunk: u64) -> SegmentedStore {
        SegmentedStore::new(
            Arc::new(client.clone()),
            SegmentOptions {
                large_object_size: large,
                large_object_chunk_size: chunk,
                read_chunk_size: 4,
            },
        )
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn small_object_is_a_single_put() {
        let client = MemoryObjectClient::with_containers(["c"]);
        let data = payload(10);
        let stored = store(&client, 100, 4)
            .add("obj", ChunkStream::from_bytes(data.clone(), 3), 10, None, "c")
            .await
            .unwrap();

        assert_eq!(client.object_names("c"), vec!["obj".to_string()]);
        assert_eq!(stored.checksum, Checksum::of(&data));
        assert_eq!(stored.size, 10);
        assert_eq!(stored.location, "memory://c/obj");
    }

    #[tokio::test]
    async fn large_object_is_segmented_behind_a_manifest() {
        let client = MemoryObjectClient::with_containers(["c"]);
        let data = payload(10);
        let s = store(&client, 8, 4);
        let stored = s
            .add("obj", ChunkStream::from_bytes(data.clone(), 3), 10, None, "c")
            .await
            .unwrap();

        assert_eq!(
            client.object_names("c"),
            vec!["obj", "obj-00001", "obj-00002", "obj-00003"]
        );
        assert_eq!(client.manifest_of("c", "obj").as_deref(), Some("c/obj-"));
        assert_eq!(stored.checksum, Checksum::of(&data));

        let (mut body, len) = s.get("c", "obj", None).await.unwrap();
        assert_eq!(len, 10);
        assert_eq!(body.read_to_end().await.unwrap().to_vec(), data);
    }

    #[tokio::test]
    async fn unknown_size_is_segmented_until_end_of_data() {
        let client = MemoryObjectClient::with_containers(["c"]);
        let data = payload(8);
        let stored = store(&client, 100, 4)
            .add("obj", ChunkStream::from_bytes(data.clone(), 3), 0, None, "c")
            .await
            .unwrap();

        assert_eq!(
            client.object_names("c"),
            vec!["obj", "obj-00001", "obj-00002"]
        );
        assert_eq!(stored.size, 8);
        assert_eq!(stored.checksum, Checksum::of(&data));
    }

    #[tokio::test]
    async fn failure_on_third_segment_removes_the_first_two() {
        let client = MemoryObjectClient::with_containers(["c"]);
        client.fail_put_of(segment_name("obj", 3));

        let err = store(&client, 8, 4)
            .add("obj", ChunkStream::from_bytes(payload(20), 4), 20, None, "c")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(client.deleted(), vec!["c/obj-00001", "c/obj-00002"]);
        assert!(client.object_names("c").is_empty());
    }

    #[tokio::test]
    async fn short_stream_with_known_size_is_cleaned_up() {
        let client = MemoryObjectClient::with_containers(["c"]);
        let err = store(&client, 8, 4)
            .add("obj", ChunkStream::from_bytes(payload(6), 4), 12, None, "c")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("6 of 12"));
        assert!(client.object_names("c").is_empty());
    }

    #[tokio::test]
    async fn data_beyond_declared_size_is_rejected_on_both_paths() {
        let client = MemoryObjectClient::with_containers(["c"]);
        let s = store(&client, 8, 4);

        let err = s
            .add("big", ChunkStream::from_bytes(payload(20), 4), 12, None, "c")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("longer than the declared 12 bytes"));
        assert_eq!(
            client.deleted(),
            vec!["c/big-00001", "c/big-00002", "c/big-00003"]
        );

        let err = s
            .add("small", ChunkStream::from_bytes(payload(6), 4), 4, None, "c")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(client.object_names("c").is_empty());
    }

    #[tokio::test]
    async fn missing_container_and_duplicates_are_rejected() {
        let client = MemoryObjectClient::with_containers(["c"]);
        client.insert("c", "obj", &b"x"[..]);
        let s = store(&client, 8, 4);

        let err = s
            .add("obj", ChunkStream::from_bytes(&b"y"[..], 4), 1, None, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(ref m) if m.contains("does not exist")));

        let err = s
            .add("obj", ChunkStream::from_bytes(&b"y"[..], 4), 1, None, "c")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }
}
