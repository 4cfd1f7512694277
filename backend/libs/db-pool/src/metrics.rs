//! Pool gauges and transaction-begin latency
//!
//! Opening an aggregate transaction includes waiting for a free connection,
//! so `db_pool_begin_duration_seconds` is the first place pool exhaustion
//! shows up.

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};
use sqlx::{PgPool, Postgres, Transaction};

lazy_static::lazy_static! {
    static ref POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "db_pool_connections",
        "Connections in the pool by state",
        &["service", "state"]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref BEGIN_DURATION: HistogramVec = register_histogram_vec!(
        "db_pool_begin_duration_seconds",
        "Connection acquisition plus BEGIN",
        &["service"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref BEGIN_ERRORS: IntCounterVec = register_int_counter_vec!(
        "db_pool_begin_errors_total",
        "Failed transaction starts by cause",
        &["service", "error_type"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

pub(crate) fn update_pool_metrics(pool: &PgPool, service: &str) {
    let size = i64::from(pool.size());
    let idle = pool.num_idle() as i64;
    let max = i64::from(pool.options().get_max_connections());

    for (state, value) in [("idle", idle), ("active", size - idle), ("max", max)] {
        POOL_CONNECTIONS
            .with_label_values(&[service, state])
            .set(value);
    }
}

/// `pool.begin()` with its latency observed and failures counted by cause
pub async fn begin_with_metrics(
    pool: &PgPool,
    service: &str,
) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
    let timer = BEGIN_DURATION.with_label_values(&[service]).start_timer();
    let result = pool.begin().await;
    timer.observe_duration();

    if let Err(e) = &result {
        BEGIN_ERRORS
            .with_label_values(&[service, error_type(e)])
            .inc();
    }
    result
}

fn error_type(e: &sqlx::Error) -> &'static str {
    match e {
        sqlx::Error::PoolTimedOut => "timeout",
        sqlx::Error::PoolClosed => "closed",
        sqlx::Error::Io(_) => "io",
        sqlx::Error::Tls(_) => "tls",
        _ => "other",
    }
}
