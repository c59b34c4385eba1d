use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use imgtask_core::api::{
    AppConfig, FilesystemStoreConfig, ImageStoreBackend, ImportSource, MemoryObjectClient,
    ObjectStore, RemoteStoreBackend, ScriptRegistry, SegmentOptions, SegmentedStore, TaskScript,
    TaskType,
};
use imgtask_core::config::get_imgtask_data_dir;

use crate::scripts::{
    CloneImageScript, ExportToStoreScript, FilesystemImportScript, ObjectStoreImportScript,
};
use crate::store::{FilesystemStore, SwiftConnector};

fn filesystem_root(cfg: &FilesystemStoreConfig, fallback: &str) -> Result<String> {
    if !cfg.data_dir.trim().is_empty() {
        return Ok(cfg.data_dir.clone());
    }
    let dir: PathBuf = get_imgtask_data_dir()?.join(fallback);
    Ok(dir.to_string_lossy().into_owned())
}

/// Store holding image data, with the configured container present.
pub async fn build_image_store(cfg: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    let container = cfg.image_store.container.as_str();
    match &cfg.image_store.backend {
        ImageStoreBackend::Filesystem(fs_cfg) => {
            let store = FilesystemStore::new(&filesystem_root(fs_cfg, "images")?);
            store.ensure_container(container).await?;
            Ok(Arc::new(store))
        }
        ImageStoreBackend::Memory(seg) => {
            let client = MemoryObjectClient::with_containers([container]);
            Ok(Arc::new(SegmentedStore::new(
                Arc::new(client),
                SegmentOptions::from_config(seg),
            )))
        }
    }
}

/// Store that object-store imports read from and exports write to.
pub fn build_remote_store(cfg: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    match &cfg.remote_store.backend {
        RemoteStoreBackend::Swift(swift) => {
            let connector = SwiftConnector::new(swift.clone())?;
            Ok(Arc::new(SegmentedStore::new(
                Arc::new(connector),
                SegmentOptions::from_config(&swift.segments),
            )))
        }
        RemoteStoreBackend::Filesystem(fs_cfg) => Ok(Arc::new(FilesystemStore::new(
            &filesystem_root(fs_cfg, "remote")?,
        ))),
        RemoteStoreBackend::Memory(seg) => Ok(Arc::new(SegmentedStore::new(
            Arc::new(MemoryObjectClient::new()),
            SegmentOptions::from_config(seg),
        ))),
    }
}

/// One script per task type; `scripts.import` picks where imports read from.
pub fn build_registry(cfg: &AppConfig) -> ScriptRegistry {
    let formats = cfg.tasks.allowed_import_formats.clone();
    let import: Arc<dyn TaskScript> = match cfg.scripts.import {
        ImportSource::Filesystem => Arc::new(FilesystemImportScript::new(formats)),
        ImportSource::ObjectStore => Arc::new(ObjectStoreImportScript::new(formats)),
    };

    ScriptRegistry::new()
        .with(TaskType::Import, import)
        .with(TaskType::Export, Arc::new(ExportToStoreScript))
        .with(TaskType::Clone, Arc::new(CloneImageScript))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_task_type() {
        let registry = build_registry(&AppConfig::default());
        assert_eq!(
            registry.task_types(),
            vec![TaskType::Clone, TaskType::Export, TaskType::Import]
        );
        let import = registry.get(TaskType::Import).unwrap();
        assert_eq!(import.name(), "import_filesystem");
    }

    #[test]
    fn import_source_selects_script() {
        let mut cfg = AppConfig::default();
        cfg.scripts.import = ImportSource::ObjectStore;
        let import = build_registry(&cfg).get(TaskType::Import).unwrap();
        assert_eq!(import.name(), "import_object_store");
    }

    #[tokio::test]
    async fn filesystem_image_store_creates_its_container() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.image_store.backend = ImageStoreBackend::Filesystem(FilesystemStoreConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
        });

        let store = build_image_store(&cfg).await.unwrap();
        assert_eq!(store.name(), "file");
        assert!(dir.path().join("images").is_dir());
    }

    #[test]
    fn swift_without_auth_address_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.remote_store.backend = RemoteStoreBackend::Swift(Default::default());
        let err = build_remote_store(&cfg).err().unwrap();
        assert!(err.to_string().contains("auth_address"));
    }
}
