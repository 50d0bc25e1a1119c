use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{
        multipart::{Field, MultipartError},
        FromRef, FromRequest, Multipart, Request,
    },
    http::{header, StatusCode},
    Json,
};
use comments_shared::api::CreateCommentRequest;

use crate::attachments::{AttachmentPolicy, UploadedFile};
use crate::error::AppError;
use crate::submission::RawSubmission;

const FILE_FIELD: &str = "file";

/// `POST /comments` body, from either `multipart/form-data` or JSON.
pub struct CommentSubmission(pub RawSubmission);

#[async_trait]
impl<S> FromRequest<S> for CommentSubmission
where
    S: Send + Sync,
    AttachmentPolicy: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, AppError> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if is_multipart {
            let policy = AttachmentPolicy::from_ref(state);
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            return read_multipart(multipart, &policy).await.map(Self);
        }

        let Json(body) = Json::<CreateCommentRequest>::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        Ok(Self(body.into()))
    }
}

/// A body over the request limit can only come from an oversized file, since
/// the text fields are capped well below it.
fn multipart_error(e: MultipartError, policy: &AttachmentPolicy) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::AttachmentTooLarge {
            limit: policy.max_bytes,
        }
    } else {
        AppError::Validation(e.body_text())
    }
}

/// Reads the file part chunk by chunk and stops once it passes the size
/// ceiling. The type is still checked before the size.
async fn read_file(
    field: &mut Field<'_>,
    content_type: &str,
    policy: &AttachmentPolicy,
) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return Ok(bytes),
            Err(e) => {
                let err = multipart_error(e, policy);
                if matches!(err, AppError::AttachmentTooLarge { .. }) {
                    policy.check_type(content_type)?;
                }
                return Err(err);
            }
        };
        if let Err(err) = policy.check_size(bytes.len() + chunk.len()) {
            policy.check_type(content_type)?;
            return Err(err);
        }
        bytes.extend_from_slice(&chunk);
    }
}

async fn read_multipart(
    mut multipart: Multipart,
    policy: &AttachmentPolicy,
) -> Result<RawSubmission, AppError> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut file: Option<UploadedFile> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, policy))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == FILE_FIELD {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = read_file(&mut field, &content_type, policy).await?;

            // Browsers send an empty part for an untouched file input.
            if bytes.is_empty() && file_name.as_deref().unwrap_or_default().is_empty() {
                continue;
            }
            if file.is_some() {
                return Err(AppError::Validation(
                    "Only one file may be attached".to_string(),
                ));
            }
            file = Some(UploadedFile {
                file_name,
                content_type,
                bytes,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| multipart_error(e, policy))?;
            fields.insert(name, value);
        }
    }

    let parent_comment_id = match fields.remove("parentCommentId") {
        Some(raw) if !raw.trim().is_empty() => Some(raw.trim().parse::<i64>().map_err(|_| {
            AppError::Validation("parentCommentId must be an integer".to_string())
        })?),
        _ => None,
    };

    Ok(RawSubmission {
        user_name: fields.remove("userName").unwrap_or_default(),
        email: fields.remove("email").unwrap_or_default(),
        home_page: fields.remove("homePage"),
        text: fields.remove("text").unwrap_or_default(),
        parent_comment_id,
        captcha: fields.remove("captcha").unwrap_or_default(),
        file,
    })
}
