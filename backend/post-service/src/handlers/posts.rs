/// Post handlers - HTTP endpoints for the post catalogue
use crate::error::{AppError, Result};
use crate::middleware::UserId;
use crate::services::{EngagementService, PostService};
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use media_store::MediaUpload;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCaptionRequest {
    pub caption: Option<String>,
}

/// Create a post from a multipart form: `caption` plus `media` or `mediaFiles`
pub async fn create_post(
    service: web::Data<PostService>,
    user: UserId,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    let limit = service.max_upload_bytes();
    let mut caption: Option<String> = None;
    let mut uploads: Vec<MediaUpload> = Vec::new();

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let content_type = field
            .content_type()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > limit {
                return Err(AppError::InvalidInput(format!(
                    "file exceeds the {} byte limit",
                    limit
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "caption" => {
                let text = String::from_utf8(bytes)
                    .map_err(|_| AppError::InvalidInput("caption must be UTF-8".to_string()))?;
                caption = Some(text);
            }
            "media" | "mediaFiles" => {
                uploads.push(MediaUpload::new(file_name, content_type, bytes));
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown multipart field");
            }
        }
    }

    let post = service
        .create_post(user.0, caption.as_deref(), uploads)
        .await?;
    Ok(HttpResponse::Created().json(post))
}

/// Get a single post
pub async fn get_post(
    service: web::Data<PostService>,
    post_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let post = service.get_post(*post_id).await?;
    Ok(HttpResponse::Ok().json(post))
}

/// Update the caption of the caller's post
pub async fn update_caption(
    service: web::Data<PostService>,
    post_id: web::Path<Uuid>,
    user: UserId,
    req: web::Json<UpdateCaptionRequest>,
) -> Result<HttpResponse> {
    let post = service
        .update_caption(*post_id, user.0, req.caption.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

/// Delete the caller's post with its comments, likes and media
pub async fn delete_post(
    service: web::Data<EngagementService>,
    post_id: web::Path<Uuid>,
    user: UserId,
) -> Result<HttpResponse> {
    let deleted = service.delete_post(*post_id, user.0).await?;
    Ok(HttpResponse::Ok().json(deleted))
}

/// List a user's posts, newest first
pub async fn list_user_posts(
    service: web::Data<PostService>,
    user_id: web::Path<Uuid>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let page = service
        .list_user_posts(*user_id, query.page, query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}
