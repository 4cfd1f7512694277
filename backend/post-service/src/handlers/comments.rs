/// Comment handlers - HTTP endpoints for comment operations
use crate::error::Result;
use crate::handlers::posts::PageQuery;
use crate::middleware::UserId;
use crate::services::{EngagementService, PostService};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

/// Add a comment to a post
pub async fn create_comment(
    service: web::Data<EngagementService>,
    post_id: web::Path<Uuid>,
    user: UserId,
    req: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse> {
    let comment = service.add_comment(*post_id, user.0, &req.content).await?;
    Ok(HttpResponse::Created().json(comment))
}

/// Get comments for a post
pub async fn list_comments(
    service: web::Data<PostService>,
    post_id: web::Path<Uuid>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let page = service
        .list_comments(*post_id, query.page, query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Delete one of the caller's comments
pub async fn delete_comment(
    service: web::Data<EngagementService>,
    path: web::Path<(Uuid, Uuid)>,
    user: UserId,
) -> Result<HttpResponse> {
    let (post_id, comment_id) = path.into_inner();
    let removed = service.remove_comment(post_id, comment_id, user.0).await?;
    Ok(HttpResponse::Ok().json(removed))
}
