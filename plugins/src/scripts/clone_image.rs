use async_trait::async_trait;
use imgtask_core::api::{
    require_keys, ImageStatus, NewImage, ScriptContext, ScriptError, Task, TaskScript,
};
use serde_json::{json, Value};

use super::common::{import_into_new_image, input_str, validate_image_uuid};

const REQUIRED_KEYS: &[&str] = &["image_uuid"];

/// Copies an active image, metadata and data, into a new image. An optional
/// `name` input replaces the source name.
pub struct CloneImageScript;

#[async_trait]
impl TaskScript for CloneImageScript {
    fn name(&self) -> &str {
        "clone_image"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        REQUIRED_KEYS
    }

    fn validate(&self, task: &Task) -> Result<(), ScriptError> {
        require_keys(task.input(), REQUIRED_KEYS)?;
        validate_image_uuid(task, input_str(task, "image_uuid")?)?;
        if task.input().contains_key("name") {
            input_str(task, "name")?;
        }
        Ok(())
    }

    async fn perform(&self, task: &Task, ctx: &ScriptContext) -> Result<Value, ScriptError> {
        let source_id = input_str(task, "image_uuid")?;
        let source = ctx.services.image_repo.get(source_id).await?;
        if source.status != ImageStatus::Active {
            return Err(ScriptError::invalid(format!(
                "Image {source_id} cannot be cloned while '{}'",
                source.status
            )));
        }

        let name = match task.input().get("name") {
            Some(_) => Some(input_str(task, "name")?.to_string()),
            None => source.name.clone(),
        };
        let attrs = NewImage {
            name,
            disk_format: source.disk_format.clone(),
            container_format: source.container_format.clone(),
            min_disk: source.min_disk,
            min_ram: source.min_ram,
            visibility: source.visibility,
            protected: false,
            tags: source.tags.clone(),
            extra_properties: source.extra_properties.clone(),
            owner: None,
        };

        let (data, length) = ctx
            .services
            .image_store
            .get(&ctx.services.image_container, source_id, ctx.auth_token())
            .await?;
        let image_id =
            import_into_new_image(ctx, attrs, data, source.size.unwrap_or(length)).await?;

        tracing::info!(
            target: "imgtask.script",
            stage = "clone.done",
            task_id = %task.task_id(),
            source = %source_id,
            image_id = %image_id
        );
        Ok(json!({ "image_id": image_id }))
    }
}
