//! In-process container/object transport.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::checksum::Checksum;
use super::traits::{Connector, ObjectClient};
use crate::error::StoreError;
use crate::stream::ChunkStream;

#[derive(Debug, Clone)]
struct Blob {
    data: Bytes,
    manifest: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    containers: HashMap<String, BTreeMap<String, Blob>>,
    fail_puts: HashSet<String>,
    deleted: Vec<String>,
}

/// Containers held in memory. Clones share state, so a test can keep one
/// handle for inspection while the store under test owns another.
///
/// Manifest objects read back as the concatenation of every object under
/// their prefix, in name order.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectClient {
    state: Arc<Mutex<State>>,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_containers<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for name in names {
            client.create_container(name);
        }
        client
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_container(&self, name: impl Into<String>) {
        self.state().containers.entry(name.into()).or_default();
    }

    /// Stores `data` directly, bypassing duplicate checks.
    pub fn insert(&self, container: &str, object: &str, data: impl Into<Bytes>) {
        self.state()
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(
                object.to_string(),
                Blob {
                    data: data.into(),
                    manifest: None,
                },
            );
    }

    /// Makes every later `put_object` of `object` fail.
    pub fn fail_put_of(&self, object: impl Into<String>) {
        self.state().fail_puts.insert(object.into());
    }

    pub fn object_names(&self, container: &str) -> Vec<String> {
        self.state()
            .containers
            .get(container)
            .map(|objs| objs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn manifest_of(&self, container: &str, object: &str) -> Option<String> {
        self.state()
            .containers
            .get(container)
            .and_then(|objs| objs.get(object))
            .and_then(|b| b.manifest.clone())
    }

    /// `container/object` names removed through `delete_object`, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    fn resolve(&self, container: &str, object: &str) -> Result<Bytes, StoreError> {
        let state = self.state();
        let objs = state
            .containers
            .get(container)
            .ok_or_else(|| StoreError::NotFound(format!("container '{container}' does not exist")))?;
        let blob = objs.get(object).ok_or_else(|| {
            StoreError::NotFound(format!("object '{object}' not found in container '{container}'"))
        })?;

        let Some(manifest) = blob.manifest.as_deref() else {
            return Ok(blob.data.clone());
        };
        let (seg_container, prefix) = manifest
            .split_once('/')
            .ok_or_else(|| StoreError::Backend(format!("malformed manifest '{manifest}'")))?;
        let segments = state.containers.get(seg_container).ok_or_else(|| {
            StoreError::NotFound(format!("container '{seg_container}' does not exist"))
        })?;
        let mut out = BytesMut::new();
        for (name, seg) in segments.range(prefix.to_string()..) {
            if !name.starts_with(prefix) {
                break;
            }
            out.extend_from_slice(&seg.data);
        }
        Ok(out.freeze())
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn head_container(&self, container: &str) -> Result<bool, StoreError> {
        Ok(self.state().containers.contains_key(container))
    }

    async fn head_object(&self, container: &str, object: &str) -> Result<Option<u64>, StoreError> {
        match self.resolve(container, object) {
            Ok(data) => Ok(Some(data.len() as u64)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_object(
        &self,
        container: &str,
        object: &str,
        chunk_size: usize,
    ) -> Result<(ChunkStream, u64), StoreError> {
        let data = self.resolve(container, object)?;
        let len = data.len() as u64;
        Ok((ChunkStream::from_bytes(data, chunk_size), len))
    }

    async fn put_object(
        &self,
        container: &str,
        object: &str,
        mut body: ChunkStream,
        content_length: Option<u64>,
        manifest: Option<&str>,
    ) -> Result<String, StoreError> {
        if !self.state().containers.contains_key(container) {
            return Err(StoreError::NotFound(format!(
                "container '{container}' does not exist"
            )));
        }
        if self.state().fail_puts.contains(object) {
            return Err(StoreError::Backend(format!("injected failure writing '{object}'")));
        }

        let data = body.read_to_end().await?;
        if let Some(expected) = content_length {
            if expected != data.len() as u64 {
                return Err(StoreError::Backend(format!(
                    "content length mismatch for '{object}': expected {expected}, got {}",
                    data.len()
                )));
            }
        }

        let etag = Checksum::of(&data);
        self.state()
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(
                object.to_string(),
                Blob {
                    data,
                    manifest: manifest.map(str::to_string),
                },
            );
        Ok(etag)
    }

    async fn delete_object(&self, container: &str, object: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        let removed = state
            .containers
            .get_mut(container)
            .and_then(|objs| objs.remove(object));
        if removed.is_none() {
            return Err(StoreError::NotFound(format!(
                "object '{object}' not found in container '{container}'"
            )));
        }
        state.deleted.push(format!("{container}/{object}"));
        Ok(())
    }
}

#[async_trait]
impl Connector for MemoryObjectClient {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self, _auth_token: Option<&str>) -> Result<Arc<dyn ObjectClient>, StoreError> {
        Ok(Arc::new(self.clone()))
    }
}
