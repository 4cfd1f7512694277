/// HTTP handlers and route table
pub mod admin;
pub mod comments;
pub mod health;
pub mod likes;
pub mod posts;

pub use health::HealthState;

use crate::error::AppError;
use crate::middleware::Operators;
use actix_web::web;

/// Register every route under `/api/v1`.
///
/// Expects `web::Data` for [`crate::services::PostService`],
/// [`crate::services::EngagementService`] and [`HealthState`]. Operator
/// routes are mounted only when `operators` is given.
pub fn configure(cfg: &mut web::ServiceConfig, operators: Option<Operators>) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| AppError::InvalidInput(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| AppError::InvalidInput(err.to_string()).into()),
    );

    let mut api = web::scope("/api/v1")
        .route("/health", web::get().to(health::health_summary))
        .route("/health/ready", web::get().to(health::readiness_summary))
        .route("/health/live", web::get().to(health::liveness_check))
        .service(web::resource("/posts").route(web::post().to(posts::create_post)))
        .service(
            web::resource("/posts/{post_id}")
                .route(web::get().to(posts::get_post))
                .route(web::patch().to(posts::update_caption))
                .route(web::delete().to(posts::delete_post)),
        )
        .service(
            web::resource("/posts/{post_id}/comments")
                .route(web::get().to(comments::list_comments))
                .route(web::post().to(comments::create_comment)),
        )
        .service(
            web::resource("/posts/{post_id}/comments/{comment_id}")
                .route(web::delete().to(comments::delete_comment)),
        )
        .service(
            web::resource("/posts/{post_id}/like")
                .route(web::post().to(likes::toggle_like))
                .route(web::get().to(likes::like_status)),
        )
        .service(
            web::resource("/users/{user_id}/posts").route(web::get().to(posts::list_user_posts)),
        );

    if let Some(operators) = operators {
        api = api.service(
            web::resource("/admin/posts/{post_id}/reconcile")
                .app_data(web::Data::new(operators))
                .route(web::post().to(admin::reconcile_counters)),
        );
    }

    cfg.service(api)
        .route("/metrics", web::get().to(crate::metrics::serve_metrics));
}
