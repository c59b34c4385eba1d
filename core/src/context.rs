use std::sync::Arc;

use crate::config::AppConfig;
use crate::image::{DefaultImageFactory, ImageFactory, ImageRepository, InMemoryImageRepository};
use crate::store::{MemoryObjectClient, ObjectStore, SegmentOptions, SegmentedStore};
use crate::task::{InMemoryTaskRepository, TaskRepository};

/// Identity of the caller a task is created and run for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub owner: Option<String>,
    pub auth_token: Option<String>,
}

impl RequestContext {
    pub fn new(owner: Option<String>) -> Self {
        Self {
            owner,
            ..Default::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }
}

/// Collaborators the executor and scripts work against.
#[derive(Clone)]
pub struct Services {
    pub task_repo: Arc<dyn TaskRepository>,
    pub image_repo: Arc<dyn ImageRepository>,
    pub image_factory: Arc<dyn ImageFactory>,
    /// Backend holding image data.
    pub image_store: Arc<dyn ObjectStore>,
    /// Container inside `image_store` that image objects are written to.
    pub image_container: String,
    /// External store import/export scripts read from or write to.
    pub remote_store: Option<Arc<dyn ObjectStore>>,
}

impl Services {
    /// Everything in process: in-memory repositories and an in-memory image
    /// store with `image_container` already created. No remote store.
    pub fn in_memory(image_container: &str) -> Self {
        let client = MemoryObjectClient::with_containers([image_container]);
        Self {
            task_repo: Arc::new(InMemoryTaskRepository::new()),
            image_repo: Arc::new(InMemoryImageRepository::new()),
            image_factory: Arc::new(DefaultImageFactory),
            image_store: Arc::new(SegmentedStore::new(
                Arc::new(client),
                SegmentOptions::default(),
            )),
            image_container: image_container.to_string(),
            remote_store: None,
        }
    }

    pub fn with_remote_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.remote_store = Some(store);
        self
    }
}

#[async_trait::async_trait]
pub trait ServicesFactory: Send + Sync {
    async fn build_services(&self, cfg: &AppConfig) -> anyhow::Result<Services>;
}
