use std::sync::Arc;

use comments_shared::{api::CreateCommentRequest, Comment};

use crate::attachments::{AttachmentPolicy, AttachmentStorage, UploadedFile};
use crate::error::AppError;
use crate::sanitize::Sanitizer;
use crate::store::{CommentStore, NewComment};

const MAX_USER_NAME_CHARS: usize = 100;
const MAX_EMAIL_CHARS: usize = 254;
const MAX_HOME_PAGE_CHARS: usize = 2048;
const MAX_TEXT_CHARS: usize = 10_000;

/// An untrusted comment submission, straight from the request.
#[derive(Debug, Clone, Default)]
pub struct RawSubmission {
    pub user_name: String,
    pub email: String,
    pub home_page: Option<String>,
    pub text: String,
    pub parent_comment_id: Option<i64>,
    pub captcha: String,
    pub file: Option<UploadedFile>,
}

impl From<CreateCommentRequest> for RawSubmission {
    fn from(req: CreateCommentRequest) -> Self {
        Self {
            user_name: req.user_name,
            email: req.email,
            home_page: req.home_page,
            text: req.text,
            parent_comment_id: req.parent_comment_id,
            captcha: req.captcha,
            file: None,
        }
    }
}

/// Attachment that passed every check, ready to be written.
struct PreparedAttachment {
    file_name: String,
    bytes: Vec<u8>,
}

/// Turns untrusted submissions into stored comments.
pub struct SubmissionValidator {
    store: Arc<dyn CommentStore>,
    gate_token: String,
    attachments: AttachmentPolicy,
    storage: AttachmentStorage,
    sanitizer: Sanitizer,
}

impl SubmissionValidator {
    pub fn new(
        store: Arc<dyn CommentStore>,
        gate_token: impl Into<String>,
        attachments: AttachmentPolicy,
        storage: AttachmentStorage,
    ) -> Self {
        Self {
            store,
            gate_token: gate_token.into(),
            attachments,
            storage,
            sanitizer: Sanitizer::default(),
        }
    }

    pub fn attachment_policy(&self) -> &AttachmentPolicy {
        &self.attachments
    }

    /// Validates, sanitizes and stores one submission. Nothing is written
    /// unless every check passes; a stored file whose row fails to insert is
    /// removed again.
    pub async fn submit(&self, raw: RawSubmission) -> Result<Comment, AppError> {
        if raw.captcha != self.gate_token {
            return Err(AppError::GateFailure);
        }
        check_length("userName", &raw.user_name, MAX_USER_NAME_CHARS)?;
        check_length("email", &raw.email, MAX_EMAIL_CHARS)?;
        check_length("text", &raw.text, MAX_TEXT_CHARS)?;
        if let Some(home_page) = &raw.home_page {
            check_length("homePage", home_page, MAX_HOME_PAGE_CHARS)?;
        }

        let attachment = match raw.file {
            Some(file) => Some(self.prepare_attachment(file).await?),
            None => None,
        };

        let text = required("text", self.sanitizer.rich_text(&raw.text))?;
        let user_name = required("userName", self.sanitizer.plain_text(&raw.user_name))?;
        let email = required("email", self.sanitizer.plain_text(&raw.email))?;
        let home_page = raw
            .home_page
            .map(|home_page| self.sanitizer.plain_text(&home_page))
            .filter(|home_page| !home_page.is_empty());

        if let Some(parent_id) = raw.parent_comment_id {
            if self.store.get(parent_id).await?.is_none() {
                return Err(AppError::Validation("parent comment not found".to_string()));
            }
        }

        let file_name = match attachment {
            Some(PreparedAttachment { file_name, bytes }) => {
                self.storage.save(&file_name, &bytes).await?;
                Some(file_name)
            }
            None => None,
        };

        let new_comment = NewComment {
            user_name,
            email,
            home_page,
            text,
            parent_comment_id: raw.parent_comment_id,
            attachment: file_name.clone(),
        };

        match self.store.insert(new_comment).await {
            Ok(comment) => {
                tracing::info!(
                    id = comment.id,
                    parent = ?comment.parent_comment_id,
                    attachment = ?comment.attachment,
                    "comment stored"
                );
                Ok(comment)
            }
            Err(e) => {
                if let Some(file_name) = file_name {
                    if let Err(cleanup) = self.storage.remove(&file_name).await {
                        tracing::warn!("failed to remove orphaned attachment {}: {}", file_name, cleanup);
                    }
                }
                Err(e.into())
            }
        }
    }

    async fn prepare_attachment(&self, file: UploadedFile) -> Result<PreparedAttachment, AppError> {
        let kind = self.attachments.check(&file)?;
        let file_name = AttachmentStorage::file_name_for(kind, file.file_name.as_deref());
        let bytes = self.attachments.normalize(kind, file.bytes).await?;
        Ok(PreparedAttachment { file_name, bytes })
    }
}

fn check_length(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

fn required(field: &str, value: String) -> Result<String, AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(value)
}
