/// Post Service Library
///
/// Posts, comments and likes for the Nova social platform. Every change to a
/// post's comments or likes updates the matching counter on the post in the
/// same transaction.
///
/// # Modules
///
/// - `domain`: Post, Comment and Like records, views and input rules
/// - `repository`: aggregate store trait with Postgres and in-memory implementations
/// - `services`: engagement protocol, post catalogue and media cleanup
/// - `handlers`: HTTP endpoints and route table
/// - `middleware`: caller identity
/// - `error`: Error types and handling
/// - `config`: Configuration management
/// - `metrics`: Prometheus collectors
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod repository;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
