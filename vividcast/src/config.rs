//! Runtime configuration loaded from environment variables.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default SQLite database URL.
const DEFAULT_DATABASE_URL: &str = "sqlite:vividcast.db?mode=rwc";

/// Default cron expression for the billing cycle runner (daily at 00:00 UTC).
const DEFAULT_BILLING_SCHEDULE: &str = "0 0 0 * * *";

/// Runtime settings for the engine.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database URL.
    pub database_url: String,
    /// API bind address.
    pub bind_address: String,
    /// API port.
    pub port: u16,
    /// Number of pipeline executors.
    pub worker_count: usize,
    /// Per-task pipeline timeout.
    pub pipeline_timeout: Duration,
    /// Cron expression driving the billing cycle runner.
    pub billing_schedule: String,
    /// Enable permissive CORS on the API.
    pub enable_cors: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_address: "0.0.0.0".to_string(),
            port: 8742,
            worker_count: 4,
            pipeline_timeout: Duration::from_secs(3600),
            billing_schedule: DEFAULT_BILLING_SCHEDULE.to_string(),
            enable_cors: true,
        }
    }
}

impl Settings {
    /// Load settings from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `DATABASE_URL`
    /// - `API_BIND_ADDRESS`, `API_PORT`
    /// - `WORKER_COUNT`, `PIPELINE_TIMEOUT_SECS`
    /// - `BILLING_SCHEDULE` (6-field cron expression)
    pub fn from_env_or_default() -> Result<Self> {
        let mut settings = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL")
            && !url.trim().is_empty()
        {
            settings.database_url = url;
        }

        if let Ok(bind_address) = std::env::var("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            settings.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("API_PORT") {
            settings.port = port
                .parse::<u16>()
                .map_err(|_| Error::config(format!("invalid API_PORT: {port}")))?;
        }

        if let Ok(count) = std::env::var("WORKER_COUNT") {
            let parsed = count
                .parse::<usize>()
                .map_err(|_| Error::config(format!("invalid WORKER_COUNT: {count}")))?;
            if parsed == 0 {
                return Err(Error::config("WORKER_COUNT must be at least 1"));
            }
            settings.worker_count = parsed;
        }

        if let Ok(secs) = std::env::var("PIPELINE_TIMEOUT_SECS") {
            let parsed = secs
                .parse::<u64>()
                .map_err(|_| Error::config(format!("invalid PIPELINE_TIMEOUT_SECS: {secs}")))?;
            settings.pipeline_timeout = Duration::from_secs(parsed);
        }

        if let Ok(schedule) = std::env::var("BILLING_SCHEDULE")
            && !schedule.trim().is_empty()
        {
            // Validate eagerly so a typo fails startup instead of the first tick.
            schedule
                .parse::<cron::Schedule>()
                .map_err(|e| Error::config(format!("invalid BILLING_SCHEDULE: {e}")))?;
            settings.billing_schedule = schedule;
        }

        Ok(settings)
    }
}
