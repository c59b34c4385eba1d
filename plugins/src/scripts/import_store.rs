use async_trait::async_trait;
use imgtask_core::api::{require_keys, ScriptContext, ScriptError, Task, TaskScript};
use serde_json::{json, Value};

use super::common::{
    image_attrs, import_into_new_image, input_str, is_uuid_like, validate_import_format,
};

const REQUIRED_KEYS: &[&str] = &["import_from", "import_from_format", "image_properties"];

/// Imports `<container-uuid>/<object-uuid>` from the remote object store into
/// a new image, passing the caller's token through.
pub struct ObjectStoreImportScript {
    allowed_formats: Vec<String>,
}

impl ObjectStoreImportScript {
    pub fn new(allowed_formats: Vec<String>) -> Self {
        Self { allowed_formats }
    }
}

pub fn parse_location(location: &str) -> Result<(&str, &str), ScriptError> {
    match location.split_once('/') {
        Some((container, object)) if is_uuid_like(container) && is_uuid_like(object) => {
            Ok((container, object))
        }
        _ => Err(ScriptError::BadStoreUri(location.to_string())),
    }
}

#[async_trait]
impl TaskScript for ObjectStoreImportScript {
    fn name(&self) -> &str {
        "import_object_store"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        REQUIRED_KEYS
    }

    fn validate(&self, task: &Task) -> Result<(), ScriptError> {
        require_keys(task.input(), REQUIRED_KEYS)?;
        parse_location(input_str(task, "import_from")?)?;
        validate_import_format(task, &self.allowed_formats)?;
        image_attrs(task)?;
        Ok(())
    }

    async fn perform(&self, task: &Task, ctx: &ScriptContext) -> Result<Value, ScriptError> {
        let remote = ctx
            .services
            .remote_store
            .as_ref()
            .ok_or_else(|| ScriptError::Internal("no remote object store is configured".into()))?;
        let (container, object) = parse_location(input_str(task, "import_from")?)?;

        tracing::info!(
            target: "imgtask.script",
            stage = "import.store.get",
            task_id = %task.task_id(),
            store = %remote.name(),
            container = %container,
            object = %object
        );
        let (data, size) = remote.get(container, object, ctx.auth_token()).await?;
        let image_id = import_into_new_image(ctx, image_attrs(task)?, data, size).await?;
        Ok(json!({ "image_id": image_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_is_two_uuids() {
        let c = "6f1b5b70-7a43-4bb4-9d0b-0a4b5f1fd0b1";
        let o = "0c9b2a7e-2f8d-4a55-8d6e-4d1c2f7a9e10";
        assert_eq!(parse_location(&format!("{c}/{o}")).unwrap(), (c, o));

        let bad = [
            "blah".to_string(),
            format!("{c}{o}"),
            format!("{c}/not-a-uuid"),
            format!("{c}/{o}/x"),
        ];
        for location in &bad {
            assert!(matches!(
                parse_location(location),
                Err(ScriptError::BadStoreUri(_))
            ));
        }
    }
}
