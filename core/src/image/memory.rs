use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::model::Image;
use super::repository::ImageRepository;
use crate::error::RepoError;

const KIND: &str = "image";

#[derive(Clone, Default)]
pub struct InMemoryImageRepository {
    rows: Arc<RwLock<HashMap<String, Image>>>,
}

impl InMemoryImageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Image> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl ImageRepository for InMemoryImageRepository {
    async fn get(&self, image_id: &str) -> Result<Image, RepoError> {
        self.rows
            .read()
            .await
            .get(image_id)
            .cloned()
            .ok_or_else(|| RepoError::not_found(KIND, image_id))
    }

    async fn add(&self, image: &mut Image) -> Result<(), RepoError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&image.image_id) {
            return Err(RepoError::Duplicate {
                kind: KIND,
                id: image.image_id.clone(),
            });
        }
        rows.insert(image.image_id.clone(), image.clone());
        tracing::debug!(target: "imgtask.repo", stage = "image.add", image_id = %image.image_id);
        Ok(())
    }

    async fn save(&self, image: &mut Image) -> Result<(), RepoError> {
        let mut rows = self.rows.write().await;
        let stored = rows
            .get_mut(&image.image_id)
            .ok_or_else(|| RepoError::not_found(KIND, image.image_id.clone()))?;
        image.updated_at = Utc::now();
        *stored = image.clone();
        tracing::debug!(
            target: "imgtask.repo",
            stage = "image.save",
            image_id = %image.image_id,
            status = %image.status
        );
        Ok(())
    }
}
