#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use imgtask_core::api::{
    AppConfig, ChunkStream, Executor, ImportSource, InMemoryImageRepository, MemoryObjectClient,
    ObjectStore, RequestContext, SegmentOptions, SegmentedStore, Services, StoreError,
    StoredObject, Task, TaskFactory,
};
use imgtask_plugins::factory::build_registry;
use serde_json::Value;

pub const OWNER: &str = "tenant-a";
pub const DEST: &str = "dest";
pub const IMAGES: &str = "images";

pub struct Harness {
    pub services: Services,
    pub remote: MemoryObjectClient,
    /// Backing client of the image store.
    pub images: MemoryObjectClient,
    pub image_repo: InMemoryImageRepository,
    pub executor: Executor,
}

/// Segmented store options with tiny thresholds so a 20 byte payload splits
/// into five 4 byte segments.
pub fn small_segments() -> SegmentOptions {
    SegmentOptions {
        large_object_size: 8,
        large_object_chunk_size: 4,
        read_chunk_size: 4,
    }
}

fn build(
    import: ImportSource,
    remote: MemoryObjectClient,
    remote_store: Arc<dyn ObjectStore>,
    image_segments: SegmentOptions,
) -> Harness {
    let mut cfg = AppConfig::default();
    cfg.scripts.import = import;
    cfg.executor.pool_size = 4;

    let images = MemoryObjectClient::with_containers([IMAGES]);
    let image_repo = InMemoryImageRepository::new();
    let mut services = Services::in_memory(IMAGES).with_remote_store(remote_store);
    services.image_store = Arc::new(SegmentedStore::new(Arc::new(images.clone()), image_segments));
    services.image_repo = Arc::new(image_repo.clone());

    let executor = Executor::from_config(&cfg, services.clone(), build_registry(&cfg));
    executor.start();
    Harness {
        services,
        remote,
        images,
        image_repo,
        executor,
    }
}

pub fn harness(import: ImportSource, remote_containers: &[&str]) -> Harness {
    let remote = MemoryObjectClient::with_containers(remote_containers.iter().copied());
    let remote_store: Arc<dyn ObjectStore> =
        Arc::new(SegmentedStore::new(Arc::new(remote.clone()), small_segments()));
    build(import, remote, remote_store, SegmentOptions::default())
}

/// Remote reads come from `remote_store`; the image store segments every
/// 4 bytes.
pub fn harness_with_remote(import: ImportSource, remote_store: Arc<dyn ObjectStore>) -> Harness {
    build(import, MemoryObjectClient::new(), remote_store, small_segments())
}

pub fn request() -> RequestContext {
    RequestContext::new(Some(OWNER.to_string())).with_auth_token("user-token")
}

impl Harness {
    /// Creates and dispatches one task without waiting for it.
    pub async fn submit(&self, raw: Value) -> String {
        let mut task = TaskFactory::default()
            .new_task(Some(&request()), &raw)
            .unwrap();
        self.services.task_repo.add(&mut task).await.unwrap();

        self.executor
            .begin_processing(task.task_id(), &request())
            .await
            .unwrap();
        task.task_id().to_string()
    }

    /// Creates, dispatches and waits for one task; returns its final row.
    pub async fn run(&self, raw: Value) -> Task {
        let id = self.submit(raw).await;
        self.executor.wait_idle().await;
        self.services.task_repo.get(&id).await.unwrap()
    }

    pub fn remote_store(&self) -> Arc<dyn ObjectStore> {
        self.services.remote_store.clone().unwrap()
    }

    /// Polls until the image store holds `count` objects.
    pub async fn wait_for_image_objects(&self, count: usize) {
        for _ in 0..500 {
            if self.images.object_names(IMAGES).len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("image store never reached {count} objects");
    }
}

/// How a [`TrickleStore`] read ends after its first bytes.
#[derive(Clone, Copy)]
pub enum Tail {
    /// Never delivers another byte.
    Stall,
    /// Fails like a dropped connection.
    Fail,
}

/// Remote store whose reads hand out `head` and then stall or fail.
pub struct TrickleStore {
    pub head: &'static [u8],
    pub tail: Tail,
}

#[async_trait]
impl ObjectStore for TrickleStore {
    fn name(&self) -> &str {
        "trickle"
    }

    async fn get(
        &self,
        _container: &str,
        _object: &str,
        _auth_token: Option<&str>,
    ) -> Result<(ChunkStream, u64), StoreError> {
        let head = stream::iter([Ok(Bytes::from_static(self.head))]);
        let data = match self.tail {
            Tail::Stall => ChunkStream::from_stream(head.chain(stream::pending()), 4),
            Tail::Fail => ChunkStream::from_stream(
                head.chain(stream::iter([Err(StoreError::Backend("connection reset".into()))])),
                4,
            ),
        };
        Ok((data, 0))
    }

    async fn add(
        &self,
        _object_id: &str,
        _data: ChunkStream,
        _size: u64,
        _auth_token: Option<&str>,
        _container: &str,
    ) -> Result<StoredObject, StoreError> {
        Err(StoreError::Backend("read-only".into()))
    }

    async fn delete(
        &self,
        _container: &str,
        _object: &str,
        _auth_token: Option<&str>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Backend("read-only".into()))
    }
}

pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

pub fn image_id_of(task: &Task) -> String {
    task.result().unwrap()["image_id"]
        .as_str()
        .unwrap()
        .to_string()
}
