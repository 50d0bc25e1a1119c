use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};

use crate::attachments::{AttachmentPolicy, AttachmentStorage};
use crate::handlers::comments as comment_handlers;
use crate::store::CommentStore;
use crate::submission::SubmissionValidator;
use crate::thread::{ThreadAssembler, ThreadLimits};
use crate::Config;

/// Room for the text fields and multipart framing on top of the attachment.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub submissions: Arc<SubmissionValidator>,
    pub threads: Arc<ThreadAssembler>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn CommentStore>, config: Config) -> Self {
        let submissions = SubmissionValidator::new(
            store.clone(),
            config.captcha_code.clone(),
            AttachmentPolicy::from_config(&config),
            AttachmentStorage::new(&config.upload_dir),
        );
        let threads = ThreadAssembler::new(
            store,
            ThreadLimits {
                max_depth: config.thread_max_depth,
                timeout: config.thread_timeout,
            },
        );

        Self {
            submissions: Arc::new(submissions),
            threads: Arc::new(threads),
            config,
        }
    }
}

impl FromRef<AppState> for AttachmentPolicy {
    fn from_ref(state: &AppState) -> Self {
        state.submissions.attachment_policy().clone()
    }
}

pub fn create_router(store: Arc<dyn CommentStore>, config: Config) -> Router {
    let state = AppState::new(store, config);
    let uploads = ServeDir::new(&state.config.upload_dir);
    let body_limit = state.config.max_attachment_bytes + FORM_OVERHEAD_BYTES;

    let comment_routes = Router::new()
        .route("/comments", post(comment_handlers::create_comment))
        .route("/comments/:comment_id", get(comment_handlers::get_thread))
        .route("/top-level-comments", get(comment_handlers::list_top_level))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/health", get(health_check))
        .merge(comment_routes)
        .nest_service("/uploads", uploads)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
