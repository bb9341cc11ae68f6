//! Multipart parsing for the post form.

use axum::http::StatusCode;
use axum_extra::extract::Multipart;
use bytes::Bytes;
use tracing::error;

use crate::{
    application::error::HttpError,
    domain::forms::{GROUP_FIELD, IMAGE_FIELD, ImageMeta, PostForm, TEXT_FIELD},
};

const SOURCE_BASE: &str = "infra::http::forms";

pub(super) struct UploadedImage {
    pub(super) meta: ImageMeta,
    pub(super) data: Bytes,
}

pub(super) struct PostSubmission {
    pub(super) form: PostForm,
    pub(super) image: Option<UploadedImage>,
}

impl PostSubmission {
    pub(super) fn image_meta(&self) -> Option<&ImageMeta> {
        self.image.as_ref().map(|image| &image.meta)
    }
}

#[derive(Debug)]
pub(super) enum SubmissionError {
    PayloadTooLarge,
    InvalidFormData,
    Read { detail: String },
}

impl From<SubmissionError> for HttpError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::PayloadTooLarge => HttpError::new(
                SOURCE_BASE,
                StatusCode::PAYLOAD_TOO_LARGE,
                "Upload is too large",
                "multipart body exceeded the request limit",
            ),
            SubmissionError::InvalidFormData => HttpError::new(
                SOURCE_BASE,
                StatusCode::BAD_REQUEST,
                "Form data was invalid",
                "malformed multipart body",
            ),
            SubmissionError::Read { detail } => HttpError::new(
                SOURCE_BASE,
                StatusCode::BAD_REQUEST,
                "Form data could not be read",
                detail,
            ),
        }
    }
}

/// Collect `text`, `group` and an optional `image` file. Unknown fields are ignored;
/// a file input left empty counts as no image. The image format is sniffed from its bytes.
pub(super) async fn read_post_submission(
    multipart: &mut Multipart,
) -> Result<PostSubmission, SubmissionError> {
    let mut form = PostForm::default();
    let mut image = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                let status = err.status();
                error!(
                    target = SOURCE_BASE,
                    status = status.as_u16(),
                    error = %err,
                    "failed to read multipart payload"
                );
                return Err(match status {
                    StatusCode::PAYLOAD_TOO_LARGE => SubmissionError::PayloadTooLarge,
                    StatusCode::BAD_REQUEST => SubmissionError::InvalidFormData,
                    _ => SubmissionError::Read {
                        detail: err.to_string(),
                    },
                });
            }
        };

        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(TEXT_FIELD) => {
                form.text = field
                    .text()
                    .await
                    .map_err(|_| SubmissionError::InvalidFormData)?;
            }
            Some(GROUP_FIELD) => {
                form.group = field
                    .text()
                    .await
                    .map_err(|_| SubmissionError::InvalidFormData)?;
            }
            Some(IMAGE_FIELD) => {
                let file_name = field
                    .file_name()
                    .map(|value| value.trim().to_string())
                    .unwrap_or_default();
                let data = field.bytes().await.map_err(|err| {
                    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
                        SubmissionError::PayloadTooLarge
                    } else {
                        SubmissionError::InvalidFormData
                    }
                })?;

                if file_name.is_empty() && data.is_empty() {
                    continue;
                }

                image = Some(UploadedImage {
                    meta: ImageMeta::inspect(file_name, &data),
                    data,
                });
            }
            _ => continue,
        }
    }

    Ok(PostSubmission { form, image })
}
