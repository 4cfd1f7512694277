/// Like handlers
use crate::error::Result;
use crate::middleware::UserId;
use crate::services::{EngagementService, PostService};
use actix_web::{web, HttpResponse};
use uuid::Uuid;

/// Like or unlike a post
pub async fn toggle_like(
    service: web::Data<EngagementService>,
    post_id: web::Path<Uuid>,
    user: UserId,
) -> Result<HttpResponse> {
    let outcome = service.toggle_like(*post_id, user.0).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Whether the caller has liked a post
pub async fn like_status(
    service: web::Data<PostService>,
    post_id: web::Path<Uuid>,
    user: UserId,
) -> Result<HttpResponse> {
    let status = service.like_status(*post_id, user.0).await?;
    Ok(HttpResponse::Ok().json(status))
}
