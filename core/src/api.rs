//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `imgtask_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load_default, AppConfig, ExecutorConfig, FilesystemStoreConfig, ImageStoreBackend,
    ImageStoreConfig, ImportSource, LoggingConfig, RemoteStoreBackend, RemoteStoreConfig,
    ScriptsConfig, SegmentConfig, SwiftConfig, TaskConfig,
};
pub use crate::context::{RequestContext, Services, ServicesFactory};
pub use crate::error::{ExecutorError, ImageError, RepoError, ScriptError, StoreError, TaskError};
pub use crate::executor::{Executor, ScriptRegistry, TokioWorkerPool, WorkerPool};
pub use crate::image::{
    DefaultImageFactory, Image, ImageFactory, ImageLocation, ImageRepository, ImageStatus,
    InMemoryImageRepository, NewImage, Visibility,
};
pub use crate::script::{require_keys, KillSwitch, ScriptContext, TaskScript};
pub use crate::store::{
    segment_name, Checksum, Connector, MemoryObjectClient, ObjectClient, ObjectStore,
    SegmentOptions, SegmentedStore, StoredObject,
};
pub use crate::stream::{ChunkStream, DEFAULT_CHUNK_SIZE};
pub use crate::task::{
    InMemoryTaskRepository, ListParams, SortDir, SortKey, Task, TaskFactory, TaskFilters,
    TaskInput, TaskRepository, TaskStatus, TaskType,
};
pub use crate::util::{retry_async, ExponentialBackoff, RetryPolicy};
