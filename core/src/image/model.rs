use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ImageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Queued,
    Saving,
    Active,
    Killed,
    Deleted,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Saving => "saving",
            Self::Active => "active",
            Self::Killed => "killed",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageLocation {
    pub url: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub image_id: String,
    pub name: Option<String>,
    pub status: ImageStatus,
    pub disk_format: Option<String>,
    pub container_format: Option<String>,
    pub size: Option<u64>,
    pub checksum: Option<String>,
    pub min_disk: u32,
    pub min_ram: u32,
    pub visibility: Visibility,
    pub protected: bool,
    pub tags: BTreeSet<String>,
    pub extra_properties: Map<String, Value>,
    pub locations: Vec<ImageLocation>,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Image {
    /// queued -> saving, before any bytes are written.
    pub fn begin_upload(&mut self) -> Result<(), ImageError> {
        self.move_to(ImageStatus::Saving, &[ImageStatus::Queued])
    }

    /// saving -> active, recording where the data landed.
    pub fn activate(
        &mut self,
        location: ImageLocation,
        size: u64,
        checksum: String,
    ) -> Result<(), ImageError> {
        self.move_to(ImageStatus::Active, &[ImageStatus::Saving])?;
        self.locations.push(location);
        self.size = Some(size);
        self.checksum = Some(checksum);
        Ok(())
    }

    /// Marks an image whose upload was abandoned. Active images are left alone.
    pub fn kill(&mut self) -> Result<(), ImageError> {
        self.move_to(
            ImageStatus::Killed,
            &[ImageStatus::Queued, ImageStatus::Saving, ImageStatus::Killed],
        )
    }

    fn move_to(&mut self, to: ImageStatus, allowed_from: &[ImageStatus]) -> Result<(), ImageError> {
        if !allowed_from.contains(&self.status) {
            return Err(ImageError::InvalidStatus {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Keys a caller may never set through free-form image properties.
pub const RESERVED_PROPERTIES: &[&str] = &[
    "id",
    "image_id",
    "status",
    "size",
    "checksum",
    "created_at",
    "updated_at",
    "locations",
    "owner",
    "deleted",
    "deleted_at",
];

/// Caller-controlled attributes of an image that does not exist yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewImage {
    pub name: Option<String>,
    pub disk_format: Option<String>,
    pub container_format: Option<String>,
    pub min_disk: u32,
    pub min_ram: u32,
    pub visibility: Visibility,
    pub protected: bool,
    pub tags: BTreeSet<String>,
    pub extra_properties: Map<String, Value>,
    pub owner: Option<String>,
}

impl NewImage {
    /// Splits a free-form property map into typed base attributes and
    /// `extra_properties`. Reserved keys are dropped.
    pub fn from_properties(props: &Map<String, Value>) -> Result<Self, ImageError> {
        let mut image = NewImage::default();

        for (key, value) in props {
            match key.as_str() {
                "name" => image.name = optional_string(key, value)?,
                "disk_format" => image.disk_format = optional_string(key, value)?,
                "container_format" => image.container_format = optional_string(key, value)?,
                "min_disk" => image.min_disk = as_u32(key, value)?,
                "min_ram" => image.min_ram = as_u32(key, value)?,
                "visibility" => {
                    image.visibility = serde_json::from_value(value.clone()).map_err(|_| {
                        invalid(key, "expected 'public' or 'private'")
                    })?
                }
                "protected" => {
                    image.protected = value
                        .as_bool()
                        .ok_or_else(|| invalid(key, "expected a boolean"))?
                }
                "tags" => {
                    let items = value
                        .as_array()
                        .ok_or_else(|| invalid(key, "expected a list of strings"))?;
                    image.tags = items
                        .iter()
                        .map(|t| {
                            t.as_str()
                                .map(str::to_string)
                                .ok_or_else(|| invalid(key, "expected a list of strings"))
                        })
                        .collect::<Result<_, _>>()?;
                }
                k if RESERVED_PROPERTIES.contains(&k) => {
                    tracing::debug!(target: "imgtask.image", stage = "image.props.drop", key = %k);
                }
                _ => {
                    image.extra_properties.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(image)
    }
}

fn invalid(key: &str, reason: &str) -> ImageError {
    ImageError::InvalidProperty {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn optional_string(key: &str, value: &Value) -> Result<Option<String>, ImageError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(invalid(key, "expected a string")),
    }
}

fn as_u32(key: &str, value: &Value) -> Result<u32, ImageError> {
    let n = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    n.and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| invalid(key, "expected a non-negative integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn props(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn splits_base_and_extra_properties() {
        let new = NewImage::from_properties(&props(json!({
            "name": "ubuntu",
            "disk_format": "qcow2",
            "container_format": "bare",
            "min_ram": "512",
            "min_disk": 10,
            "visibility": "public",
            "protected": true,
            "tags": ["lts", "server"],
            "os_distro": "ubuntu",
            "id": "caller-chosen",
            "size": 12,
        })))
        .unwrap();

        assert_eq!(new.name.as_deref(), Some("ubuntu"));
        assert_eq!(new.min_ram, 512);
        assert_eq!(new.min_disk, 10);
        assert_eq!(new.visibility, Visibility::Public);
        assert!(new.protected);
        assert_eq!(new.tags.len(), 2);
        assert_eq!(new.extra_properties, props(json!({"os_distro": "ubuntu"})));
    }

    #[test]
    fn rejects_mistyped_properties() {
        let err = NewImage::from_properties(&props(json!({"min_ram": -1}))).unwrap_err();
        assert!(matches!(err, ImageError::InvalidProperty { ref key, .. } if key == "min_ram"));

        let err = NewImage::from_properties(&props(json!({"visibility": "shared-ish"}))).unwrap_err();
        assert!(matches!(err, ImageError::InvalidProperty { .. }));
    }
}
