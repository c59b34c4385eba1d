use chrono::Utc;
use uuid::Uuid;

use super::model::{Image, ImageStatus, NewImage, RESERVED_PROPERTIES};
use crate::error::ImageError;

/// Builds image records. Does not persist them.
pub trait ImageFactory: Send + Sync {
    fn new_image(&self, attrs: NewImage) -> Result<Image, ImageError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultImageFactory;

impl ImageFactory for DefaultImageFactory {
    fn new_image(&self, attrs: NewImage) -> Result<Image, ImageError> {
        if let Some(key) = attrs
            .extra_properties
            .keys()
            .find(|k| RESERVED_PROPERTIES.contains(&k.as_str()))
        {
            return Err(ImageError::ReservedAttribute(key.clone()));
        }

        let now = Utc::now();
        Ok(Image {
            image_id: Uuid::new_v4().to_string(),
            name: attrs.name,
            status: ImageStatus::Queued,
            disk_format: attrs.disk_format,
            container_format: attrs.container_format,
            size: None,
            checksum: None,
            min_disk: attrs.min_disk,
            min_ram: attrs.min_ram,
            visibility: attrs.visibility,
            protected: attrs.protected,
            tags: attrs.tags,
            extra_properties: attrs.extra_properties,
            locations: Vec::new(),
            owner: attrs.owner,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageLocation;
    use serde_json::json;

    #[test]
    fn new_images_are_queued_and_empty() {
        let image = DefaultImageFactory
            .new_image(NewImage {
                name: Some("cirros".into()),
                owner: Some("tenant".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(image.status, ImageStatus::Queued);
        assert_eq!(image.size, None);
        assert!(image.locations.is_empty());
        assert!(Uuid::parse_str(&image.image_id).is_ok());
    }

    #[test]
    fn reserved_extra_property_is_rejected() {
        let mut attrs = NewImage::default();
        attrs.extra_properties.insert("status".into(), json!("active"));
        assert_eq!(
            DefaultImageFactory.new_image(attrs).unwrap_err(),
            ImageError::ReservedAttribute("status".into())
        );
    }

    #[test]
    fn status_moves_through_upload() {
        let mut image = DefaultImageFactory.new_image(NewImage::default()).unwrap();
        assert!(image
            .activate(
                ImageLocation {
                    url: "x".into(),
                    metadata: Default::default(),
                },
                1,
                "c".into(),
            )
            .is_err());
        image.begin_upload().unwrap();
        image.kill().unwrap();
        assert_eq!(image.status, ImageStatus::Killed);
        assert!(image.begin_upload().is_err());
    }
}
