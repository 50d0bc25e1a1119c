use axum::{
    extract::{Path, Query, State},
    Json,
};
use comments_shared::{
    api::{CreateCommentResponse, TopLevelParams},
    Comment, CommentNode,
};

use crate::error::AppError;
use crate::extract::CommentSubmission;
use crate::routes::AppState;

/// POST /comments
pub async fn create_comment(
    State(state): State<AppState>,
    CommentSubmission(raw): CommentSubmission,
) -> Result<Json<CreateCommentResponse>, AppError> {
    let comment = state.submissions.submit(raw).await?;

    Ok(Json(CreateCommentResponse {
        message: "Comment added successfully".to_string(),
        comment,
    }))
}

/// GET /top-level-comments?sortBy=&sortOrder=
pub async fn list_top_level(
    State(state): State<AppState>,
    Query(params): Query<TopLevelParams>,
) -> Result<Json<Vec<Comment>>, AppError> {
    let comments = state
        .threads
        .top_level(params.sort_by.as_deref(), params.sort_order.as_deref())
        .await?;

    Ok(Json(comments))
}

/// GET /comments/:comment_id
pub async fn get_thread(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
) -> Result<Json<CommentNode>, AppError> {
    let thread = state.threads.thread(comment_id).await?;
    Ok(Json(thread))
}
