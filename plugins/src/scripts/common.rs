use std::sync::OnceLock;

use imgtask_core::api::{
    ChunkStream, Image, ImageLocation, NewImage, ScriptContext, ScriptError, Task,
};
use regex::Regex;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Characters a destination container name may not contain.
static CONTAINER_DISALLOWED: OnceLock<Regex> = OnceLock::new();

fn container_disallowed() -> &'static Regex {
    CONTAINER_DISALLOWED
        .get_or_init(|| Regex::new(r"[/?.]").expect("CONTAINER_DISALLOWED is valid"))
}

pub fn input_str<'a>(task: &'a Task, key: &str) -> Result<&'a str, ScriptError> {
    match task.input().get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ScriptError::invalid(format!("'{key}' must be a string"))),
        None => Err(ScriptError::invalid(format!(
            "Input does not contain '{key}' field"
        ))),
    }
}

pub fn input_object<'a>(task: &'a Task, key: &str) -> Result<&'a Map<String, Value>, ScriptError> {
    match task.input().get(key) {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(ScriptError::invalid(format!("'{key}' must be an object"))),
        None => Err(ScriptError::invalid(format!(
            "Input does not contain '{key}' field"
        ))),
    }
}

pub fn is_uuid_like(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

pub fn validate_image_uuid(task: &Task, image_id: &str) -> Result<(), ScriptError> {
    if is_uuid_like(image_id) {
        return Ok(());
    }
    Err(ScriptError::invalid(format!(
        "The specified image id {image_id} for task {} is not a uuid.",
        task.task_id()
    )))
}

pub fn validate_container_name(task: &Task, container: &str) -> Result<(), ScriptError> {
    if container.is_empty() || container_disallowed().is_match(container) {
        return Err(ScriptError::invalid(format!(
            "Invalid value for receiving_swift_container for task {}. Given value is '{container}'.",
            task.task_id()
        )));
    }
    Ok(())
}

/// Builds and registers a queued image owned by the requester.
pub async fn create_image(ctx: &ScriptContext, mut attrs: NewImage) -> Result<Image, ScriptError> {
    attrs.owner = ctx.request.owner.clone();
    let mut image = ctx.services.image_factory.new_image(attrs)?;
    ctx.services.image_repo.add(&mut image).await?;
    tracing::debug!(
        target: "imgtask.script",
        stage = "script.image.created",
        image_id = %image.image_id
    );
    Ok(image)
}

/// Streams `data` into the image store under the image's id and activates
/// the image with the resulting location, size and checksum.
pub async fn store_image_data(
    ctx: &ScriptContext,
    image: &mut Image,
    data: ChunkStream,
    size: u64,
) -> Result<(), ScriptError> {
    let services = &ctx.services;
    image.begin_upload()?;
    services.image_repo.save(image).await?;

    let stored = services
        .image_store
        .add(
            &image.image_id,
            data.with_cancellation(ctx.cancellation()),
            size,
            ctx.auth_token(),
            &services.image_container,
        )
        .await?;

    image.activate(
        ImageLocation {
            url: stored.location,
            metadata: Map::new(),
        },
        stored.size,
        stored.checksum,
    )?;
    services.image_repo.save(image).await?;
    Ok(())
}

/// Best effort: marks an image whose data never fully arrived as killed.
pub async fn mark_image_killed(ctx: &ScriptContext, image_id: &str) {
    let repo = &ctx.services.image_repo;
    let outcome = match repo.get(image_id).await {
        Ok(mut image) => match image.kill() {
            Ok(()) => repo.save(&mut image).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        },
        Err(e) => Err(e.to_string()),
    };
    if let Err(e) = outcome {
        tracing::warn!(
            target: "imgtask.script",
            stage = "script.image.kill_failed",
            image_id = %image_id,
            error = %e
        );
    }
}

/// Creates the image, fills it, and kills it again if filling fails.
pub async fn import_into_new_image(
    ctx: &ScriptContext,
    attrs: NewImage,
    data: ChunkStream,
    size: u64,
) -> Result<String, ScriptError> {
    let mut image = create_image(ctx, attrs).await?;
    let image_id = image.image_id.clone();
    if let Err(e) = store_image_data(ctx, &mut image, data, size).await {
        mark_image_killed(ctx, &image_id).await;
        return Err(e);
    }
    Ok(image_id)
}

/// Image properties from the task input, with `disk_format` defaulting to
/// the declared import format.
pub fn image_attrs(task: &Task) -> Result<NewImage, ScriptError> {
    let props = input_object(task, "image_properties")?;
    let mut attrs = NewImage::from_properties(props)?;
    if attrs.disk_format.is_none() {
        attrs.disk_format = Some(input_str(task, "import_from_format")?.to_string());
    }
    Ok(attrs)
}

pub fn validate_import_format(task: &Task, allowed: &[String]) -> Result<(), ScriptError> {
    let format = input_str(task, "import_from_format")?;
    if allowed.is_empty() || allowed.iter().any(|f| f.eq_ignore_ascii_case(format)) {
        return Ok(());
    }
    Err(ScriptError::invalid(format!(
        "Unsupported import_from_format '{format}'; expected one of: {}",
        allowed.join(", ")
    )))
}
