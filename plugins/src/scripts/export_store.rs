use async_trait::async_trait;
use imgtask_core::api::{
    require_keys, ImageStatus, ScriptContext, ScriptError, Task, TaskScript,
};
use serde_json::{json, Value};

use super::common::{input_str, validate_container_name, validate_image_uuid};

const REQUIRED_KEYS: &[&str] = &["image_uuid", "receiving_swift_container"];

/// Copies an active image's data into a container of the remote store.
pub struct ExportToStoreScript;

#[async_trait]
impl TaskScript for ExportToStoreScript {
    fn name(&self) -> &str {
        "export_object_store"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        REQUIRED_KEYS
    }

    fn validate(&self, task: &Task) -> Result<(), ScriptError> {
        require_keys(task.input(), REQUIRED_KEYS)?;
        validate_image_uuid(task, input_str(task, "image_uuid")?)?;
        validate_container_name(task, input_str(task, "receiving_swift_container")?)?;
        Ok(())
    }

    async fn perform(&self, task: &Task, ctx: &ScriptContext) -> Result<Value, ScriptError> {
        let remote = ctx
            .services
            .remote_store
            .as_ref()
            .ok_or_else(|| ScriptError::Internal("no remote object store is configured".into()))?;
        let image_id = input_str(task, "image_uuid")?;
        let container = input_str(task, "receiving_swift_container")?;

        let image = ctx.services.image_repo.get(image_id).await?;
        if image.status != ImageStatus::Active {
            return Err(ScriptError::invalid(format!(
                "Image {image_id} has no data to export (status '{}')",
                image.status
            )));
        }

        let (data, length) = ctx
            .services
            .image_store
            .get(&ctx.services.image_container, image_id, ctx.auth_token())
            .await?;
        let size = image.size.unwrap_or(length);

        tracing::info!(
            target: "imgtask.script",
            stage = "export.store.add",
            task_id = %task.task_id(),
            image_id = %image_id,
            store = %remote.name(),
            container = %container,
            size = size
        );
        remote
            .add(
                image_id,
                data.with_cancellation(ctx.cancellation()),
                size,
                ctx.auth_token(),
                container,
            )
            .await?;

        Ok(json!({ "export_location": format!("{container}/{image_id}") }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgtask_core::api::{RequestContext, TaskFactory};

    const IMAGE: &str = "0c9b2a7e-2f8d-4a55-8d6e-4d1c2f7a9e10";

    fn export_task(image_uuid: &str, container: &str) -> Task {
        TaskFactory::default()
            .new_task(
                Some(&RequestContext::default()),
                &json!({
                    "type": "export",
                    "input": {"image_uuid": image_uuid, "receiving_swift_container": container}
                }),
            )
            .unwrap()
    }

    #[test]
    fn container_names_with_reserved_characters_are_invalid() {
        for container in ["?", "a?b", "a/b", "a.b", ""] {
            let task = export_task(IMAGE, container);
            let err = ExportToStoreScript.validate(&task).unwrap_err();
            assert!(matches!(err, ScriptError::Invalid(_)), "{container:?}: {err:?}");
            assert_eq!(
                err.to_string(),
                format!(
                    "Invalid value for receiving_swift_container for task {}. Given value is '{container}'.",
                    task.task_id()
                )
            );
        }
        assert!(ExportToStoreScript.validate(&export_task(IMAGE, "backups")).is_ok());
    }

    #[test]
    fn image_uuid_must_be_a_uuid() {
        let err = ExportToStoreScript
            .validate(&export_task("not-a-uuid", "backups"))
            .unwrap_err();
        assert!(matches!(err, ScriptError::Invalid(ref m) if m.contains("is not a uuid")));
    }
}
