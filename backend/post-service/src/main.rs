use actix_web::{web, App, HttpServer};
use media_store::{BlobStore, S3BlobStore};
use post_service::handlers::{self, HealthState};
use post_service::middleware::{IdentityMiddleware, IdentityProvider, JwtIdentity, Operators};
use post_service::repository::{AggregateStore, PgAggregateStore};
use post_service::services;
use std::io;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,post_service=debug,sqlx=warn".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable ({}), waiting for Ctrl+C", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Post Service
///
/// Serves posts, comments and likes over HTTP.
///
/// # Routes
///
/// - `/api/v1/posts/*` - create, read, caption, delete posts; comments and likes
/// - `/api/v1/users/{id}/posts` - a user's posts
/// - `/api/v1/admin/posts/{id}/reconcile` - counter repair (when enabled)
/// - `/api/v1/health*`, `/metrics`
#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = match post_service::Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting post-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    config.database.log_config();
    let db_pool = db_pool::create_pool(config.database.clone())
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Failed to create database pool: {e}")))?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Migrations failed: {e}")))?;
    tracing::info!("Database migrations applied");

    let store: Arc<dyn AggregateStore> = Arc::new(PgAggregateStore::new(db_pool.clone()));
    let s3 = S3BlobStore::from_config(config.media.s3.clone()).await;
    tracing::info!(bucket = %config.media.s3.bucket, "Media bucket configured");
    let blobs: Arc<dyn BlobStore> = Arc::new(s3.clone());

    let (posts, engagement) = services::build(store.clone(), blobs, &config.media);
    let posts = web::Data::new(posts);
    let engagement = web::Data::new(engagement);
    let health = web::Data::new(HealthState::new(store, Some(s3)));
    let identity: Arc<dyn IdentityProvider> = Arc::new(JwtIdentity::new(&config.auth.jwt_secret));

    let operators = config
        .app
        .admin_endpoints_enabled
        .then(|| Operators::new(config.app.admin_user_ids.iter().copied()));
    if operators.is_some() {
        tracing::warn!(
            operators = config.app.admin_user_ids.len(),
            "Admin endpoints enabled"
        );
    }

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Starting HTTP server at {}", bind_address);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(posts.clone())
            .app_data(engagement.clone())
            .app_data(health.clone())
            .wrap(IdentityMiddleware::new(identity.clone()))
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(|cfg| handlers::configure(cfg, operators.clone()))
    })
    .bind(&bind_address)?
    .run();

    let server_handle = server.handle();
    let mut server_task = tokio::spawn(server);

    tokio::select! {
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => tracing::info!("HTTP server exited"),
                Ok(Err(e)) => {
                    tracing::error!("HTTP server failed: {}", e);
                    return Err(e);
                }
                Err(e) => tracing::error!("HTTP server task failed: {}", e),
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            server_handle.stop(true).await;
            if let Err(e) = server_task.await {
                tracing::error!("HTTP server task failed: {}", e);
            }
        }
    }

    db_pool.close().await;
    tracing::info!("post-service stopped");
    Ok(())
}
