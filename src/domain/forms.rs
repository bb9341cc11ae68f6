//! Submitted form data, its validation, and the typed inputs it produces.
//!
//! Raw field values stay as strings so a failed submission can be rendered
//! back exactly as the user typed it; validation either yields a typed value
//! or a [`FieldErrors`] map keyed by field name.

use std::collections::BTreeMap;

use imagesize::ImageType;
use serde::{Deserialize, Serialize};

use crate::domain::entities::GroupRecord;

pub const REQUIRED_MESSAGE: &str = "This field is required.";
pub const INVALID_CHOICE_MESSAGE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE_MESSAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

pub const TEXT_FIELD: &str = "text";
pub const GROUP_FIELD: &str = "group";
pub const IMAGE_FIELD: &str = "image";

/// Validation messages grouped by field, plus errors that belong to no field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors {
    fields: BTreeMap<String, Vec<String>>,
    non_field: Vec<String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }

    pub fn for_field(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn non_field(&self) -> &[String] {
        &self.non_field
    }

    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// Raw values of the post form (`text`, `group`), as submitted or pre-filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub group: String,
}

impl PostForm {
    pub fn prefilled(text: &str, group_id: Option<i64>) -> Self {
        Self {
            text: text.to_string(),
            group: group_id.map(|id| id.to_string()).unwrap_or_default(),
        }
    }
}

/// Raster formats accepted for post images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Gif,
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// Detect the format from the file contents. The declared content type and
    /// file name play no part; the dimensions must decode as well.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        let format = match imagesize::image_type(data).ok()? {
            ImageType::Gif => Self::Gif,
            ImageType::Png => Self::Png,
            ImageType::Jpeg => Self::Jpeg,
            ImageType::Webp => Self::Webp,
            _ => return None,
        };
        let size = imagesize::blob_size(data).ok()?;
        (size.width > 0 && size.height > 0).then_some(format)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }
}

/// What is known about an uploaded image before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMeta {
    pub file_name: String,
    pub size: usize,
    pub format: Option<ImageFormat>,
}

impl ImageMeta {
    pub fn inspect(file_name: impl Into<String>, data: &[u8]) -> Self {
        Self {
            file_name: file_name.into(),
            size: data.len(),
            format: ImageFormat::sniff(data),
        }
    }

    pub fn is_supported_image(&self) -> bool {
        self.size > 0 && self.format.is_some()
    }
}

/// Post content that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostContent {
    pub text: String,
    pub group_id: Option<i64>,
}

/// Validate a post form against the groups that may be chosen.
///
/// `text` is required. `group` may be blank; otherwise it must name one of `choices`.
/// An image is optional but must be an image when present.
pub fn validate_post(
    form: &PostForm,
    image: Option<&ImageMeta>,
    choices: &[GroupRecord],
) -> Result<PostContent, FieldErrors> {
    let mut errors = FieldErrors::new();

    if image.is_some_and(|image| !image.is_supported_image()) {
        errors.add(IMAGE_FIELD, INVALID_IMAGE_MESSAGE);
    }

    let text = form.text.trim();
    if text.is_empty() {
        errors.add(TEXT_FIELD, REQUIRED_MESSAGE);
    }

    let group = form.group.trim();
    let group_id = if group.is_empty() {
        None
    } else {
        match group.parse::<i64>() {
            Ok(id) if choices.iter().any(|choice| choice.id == id) => Some(id),
            _ => {
                errors.add(GROUP_FIELD, INVALID_CHOICE_MESSAGE);
                None
            }
        }
    };

    errors.into_result(PostContent {
        text: text.to_string(),
        group_id,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePostInput {
    pub author_id: i64,
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

/// Replacement content for an existing post. `image: None` keeps the stored image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditPostInput {
    pub post_id: i64,
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCommentInput {
    pub post_id: i64,
    pub author_id: i64,
    pub text: String,
}

pub fn validate_comment(form: &CommentForm) -> Result<String, FieldErrors> {
    let mut errors = FieldErrors::new();
    let text = form.text.trim();
    if text.is_empty() {
        errors.add(TEXT_FIELD, REQUIRED_MESSAGE);
    }
    errors.into_result(text.to_string())
}
