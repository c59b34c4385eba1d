use std::path::PathBuf;

use async_trait::async_trait;
use imgtask_core::api::{require_keys, ScriptContext, ScriptError, Task, TaskScript};
use serde_json::{json, Value};

use super::common::{image_attrs, import_into_new_image, input_str, validate_import_format};
use crate::store::open_local;

const REQUIRED_KEYS: &[&str] = &["import_from", "import_from_format", "image_properties"];

/// Imports a `file:///` path on the local filesystem into a new image.
pub struct FilesystemImportScript {
    allowed_formats: Vec<String>,
}

impl FilesystemImportScript {
    pub fn new(allowed_formats: Vec<String>) -> Self {
        Self { allowed_formats }
    }
}

/// `file:///tmp/x` -> `/tmp/x`.
pub fn local_path(location: &str) -> Result<PathBuf, ScriptError> {
    match location.strip_prefix("file://") {
        Some(path) if path.starts_with('/') => Ok(PathBuf::from(path)),
        _ => Err(ScriptError::BadStoreUri(location.to_string())),
    }
}

#[async_trait]
impl TaskScript for FilesystemImportScript {
    fn name(&self) -> &str {
        "import_filesystem"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        REQUIRED_KEYS
    }

    fn validate(&self, task: &Task) -> Result<(), ScriptError> {
        require_keys(task.input(), REQUIRED_KEYS)?;
        local_path(input_str(task, "import_from")?)?;
        validate_import_format(task, &self.allowed_formats)?;
        image_attrs(task)?;
        Ok(())
    }

    async fn perform(&self, task: &Task, ctx: &ScriptContext) -> Result<Value, ScriptError> {
        let path = local_path(input_str(task, "import_from")?)?;
        tracing::info!(
            target: "imgtask.script",
            stage = "import.fs.open",
            task_id = %task.task_id(),
            path = %path.display()
        );

        let (data, size) = open_local(&path).await?;
        let image_id = import_into_new_image(ctx, image_attrs(task)?, data, size).await?;
        Ok(json!({ "image_id": image_id }))
    }
}
