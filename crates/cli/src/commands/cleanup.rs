//! On-demand session and security-log cleanup.
//!
//! Runs the same work as the server's periodic cleanup task, for
//! deployments that disable `AUTO_CLEANUP_SESSIONS` and schedule this
//! from cron instead.

use souk_api::config::SessionPolicy;
use souk_api::services::security::SecurityService;
use souk_api::services::sessions::{CleanupReport, cleanup_sessions, run_cleanup};

use super::{CommandError, connect};

fn log_report(report: &CleanupReport) {
    tracing::info!("Cleanup complete!");
    tracing::info!("  Sessions expired: {}", report.sessions_expired);
    tracing::info!("  Sessions deleted: {}", report.sessions_deleted);
    tracing::info!("  Blacklist entries purged: {}", report.blacklist_purged);
    tracing::info!("  Security attempts deleted: {}", report.attempts_deleted);
}

/// Expire idle sessions, delete old inactive ones, purge the blacklist.
///
/// # Errors
///
/// Returns an error if configuration or the database fails.
pub async fn sessions(days: Option<u32>) -> Result<(), CommandError> {
    let policy = SessionPolicy::from_env()?;
    let pool = connect().await?;
    log_report(&cleanup_sessions(&pool, &policy, days).await?);
    Ok(())
}

/// Delete security attempts older than `days` (default 90).
///
/// # Errors
///
/// Returns an error if the database fails.
pub async fn attempts(days: Option<u32>) -> Result<(), CommandError> {
    let pool = connect().await?;
    let deleted = SecurityService::new(&pool)
        .purge(days.unwrap_or(souk_api::services::security::ATTEMPT_RETENTION_DAYS))
        .await?;
    log_report(&CleanupReport {
        attempts_deleted: deleted,
        ..CleanupReport::default()
    });
    Ok(())
}

/// Sessions and attempts together.
///
/// # Errors
///
/// Returns an error if configuration or the database fails.
pub async fn all(days: Option<u32>) -> Result<(), CommandError> {
    let policy = SessionPolicy::from_env()?;
    let pool = connect().await?;
    log_report(&run_cleanup(&pool, &policy, days).await?);
    Ok(())
}
