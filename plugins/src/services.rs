//! Builds the [`Services`] bundle from configuration for the CLI.
use std::sync::Arc;

use async_trait::async_trait;
use imgtask_core::api::{
    AppConfig, DefaultImageFactory, InMemoryImageRepository, InMemoryTaskRepository, Services,
    ServicesFactory,
};

use crate::factory;

#[derive(Debug, Default)]
pub struct PluginServicesFactory;

#[async_trait]
impl ServicesFactory for PluginServicesFactory {
    async fn build_services(&self, cfg: &AppConfig) -> anyhow::Result<Services> {
        let image_store = factory::build_image_store(cfg).await?;
        let remote_store = factory::build_remote_store(cfg)?;
        tracing::debug!(
            target: "imgtask.services",
            stage = "services.built",
            image_store = %image_store.name(),
            remote_store = %remote_store.name(),
            container = %cfg.image_store.container
        );

        Ok(Services {
            task_repo: Arc::new(InMemoryTaskRepository::new()),
            image_repo: Arc::new(InMemoryImageRepository::new()),
            image_factory: Arc::new(DefaultImageFactory),
            image_store,
            image_container: cfg.image_store.container.clone(),
            remote_store: Some(remote_store),
        })
    }
}
