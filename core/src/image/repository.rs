use async_trait::async_trait;

use super::model::Image;
use crate::error::RepoError;

#[async_trait]
pub trait ImageRepository: Send + Sync {
    async fn get(&self, image_id: &str) -> Result<Image, RepoError>;
    async fn add(&self, image: &mut Image) -> Result<(), RepoError>;
    /// Persists `image` and refreshes its `updated_at`.
    async fn save(&self, image: &mut Image) -> Result<(), RepoError>;
}
