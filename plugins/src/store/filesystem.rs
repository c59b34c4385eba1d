//! Local directory store: a container is a sub-directory of the root, an
//! object is a file inside it.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use imgtask_core::api::{Checksum, ChunkStream, ObjectStore, StoreError, StoredObject, DEFAULT_CHUNK_SIZE};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// `~` in `root` is expanded.
    pub fn new(root: &str) -> Self {
        Self {
            root: PathBuf::from(shellexpand::tilde(root).as_ref()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_container(&self, container: &str) -> Result<(), StoreError> {
        let dir = self.container_path(container)?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(())
    }

    fn container_path(&self, container: &str) -> Result<PathBuf, StoreError> {
        check_segment(container)?;
        Ok(self.root.join(container))
    }

    fn object_path(&self, container: &str, object: &str) -> Result<PathBuf, StoreError> {
        check_segment(object)?;
        Ok(self.container_path(container)?.join(object))
    }

    async fn write_all(
        file: &mut tokio::fs::File,
        data: &mut ChunkStream,
        sum: &Checksum,
    ) -> Result<(), StoreError> {
        while let Some(chunk) = data.next_chunk().await? {
            file.write_all(&chunk).await?;
            sum.update(&chunk);
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

/// Names must be a single plain path component.
fn check_segment(name: &str) -> Result<(), StoreError> {
    let mut parts = Path::new(name).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StoreError::BadStoreUri(name.to_string())),
    }
}

/// Opens a local file for reading in default-size chunks.
pub async fn open_local(path: &Path) -> Result<(ChunkStream, u64), StoreError> {
    let file = tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            StoreError::NotFound(format!("file '{}' does not exist", path.display()))
        }
        _ => StoreError::Io(e),
    })?;
    let meta = file.metadata().await?;
    if !meta.is_file() {
        return Err(StoreError::BadStoreUri(path.display().to_string()));
    }
    Ok((ChunkStream::from_reader(file, DEFAULT_CHUNK_SIZE), meta.len()))
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(
        &self,
        container: &str,
        object: &str,
        _auth_token: Option<&str>,
    ) -> Result<(ChunkStream, u64), StoreError> {
        open_local(&self.object_path(container, object)?).await
    }

    async fn add(
        &self,
        object_id: &str,
        mut data: ChunkStream,
        size: u64,
        _auth_token: Option<&str>,
        container: &str,
    ) -> Result<StoredObject, StoreError> {
        let dir = self.container_path(container)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Err(StoreError::NotFound(format!(
                "container '{container}' does not exist in {}",
                self.root.display()
            )));
        }
        let path = self.object_path(container, object_id)?;

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Duplicate(format!(
                    "Image file {} already exists!",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let sum = Checksum::new();
        let mut res = Self::write_all(&mut file, &mut data, &sum).await;
        if res.is_ok() && size > 0 && sum.len() != size {
            res = Err(StoreError::Backend(format!(
                "wrote {} bytes but {size} were expected",
                sum.len()
            )));
        }
        drop(file);

        if let Err(e) = res {
            tracing::warn!(
                target: "imgtask.store",
                stage = "fs.add.failed",
                path = %path.display(),
                error = %e
            );
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                tracing::warn!(
                    target: "imgtask.store",
                    stage = "fs.add.cleanup_failed",
                    path = %path.display(),
                    error = %rm
                );
            }
            return Err(e);
        }

        tracing::info!(
            target: "imgtask.store",
            stage = "fs.add.done",
            path = %path.display(),
            size = sum.len()
        );
        Ok(StoredObject {
            location: format!("file://{}", path.display()),
            checksum: sum.hex(),
            size: sum.len(),
        })
    }

    async fn delete(
        &self,
        container: &str,
        object: &str,
        _auth_token: Option<&str>,
    ) -> Result<(), StoreError> {
        let path = self.object_path(container, object)?;
        tokio::fs::remove_file(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                StoreError::NotFound(format!("Image file {} not found", path.display()))
            }
            _ => StoreError::Io(e),
        })
    }

    fn location_for(&self, container: &str, object: &str) -> String {
        format!("file://{}", self.root.join(container).join(object).display())
    }
}
