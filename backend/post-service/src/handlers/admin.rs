/// Operator endpoints, mounted only when ADMIN_ENDPOINTS_ENABLED is set
use crate::error::Result;
use crate::middleware::{Operators, UserId};
use crate::services::EngagementService;
use actix_web::{web, HttpResponse};
use uuid::Uuid;

/// Recount a post's comments and likes and overwrite its counters
pub async fn reconcile_counters(
    service: web::Data<EngagementService>,
    operators: web::Data<Operators>,
    post_id: web::Path<Uuid>,
    user: UserId,
) -> Result<HttpResponse> {
    operators.require(user)?;
    tracing::info!(post_id = %post_id, requested_by = %user.0, "counter reconciliation requested");
    let post = service.reconcile_counters(*post_id).await?;
    Ok(HttpResponse::Ok().json(post))
}
