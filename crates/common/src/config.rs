use std::time::Duration;

use serde::Deserialize;

use crate::types::RetryPolicy;

/// Global application configuration loaded from environment variables.
///
/// Loaded once by each binary and handed to constructors; nothing in the
/// notification core reads the environment on its own.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (dedup markers + job queue)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// JWT secret for API authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// HTTP port for the API server
    pub api_port: u16,

    /// SMTP relay host
    pub smtp_host: String,

    /// SMTP relay port
    pub smtp_port: u16,

    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,

    /// Use a TLS relay instead of the plaintext builder (local Mailpit etc.)
    pub smtp_use_tls: bool,

    /// Default sender address for outgoing mail
    pub mail_from_address: String,

    /// Default sender display name for outgoing mail
    pub mail_from_name: String,

    /// TextMagic REST base URL
    pub textmagic_api_url: String,

    /// TextMagic account username; SMS delivery is disabled when unset
    pub textmagic_username: Option<String>,

    /// TextMagic API key; SMS delivery is disabled when unset
    pub textmagic_api_key: Option<String>,

    /// Lifetime of a dedup marker in seconds (default: 86400)
    pub sms_dedup_ttl_seconds: u64,

    /// Maximum executions of a queued job, first attempt included (default: 3)
    pub job_max_attempts: u32,

    /// Fixed delay before a failed job is retried (default: 60)
    pub job_backoff_seconds: u64,

    /// Redis key of the ready job list
    pub job_queue_name: String,

    /// Blocking pop timeout for the worker loop
    pub worker_poll_timeout_seconds: u64,

    /// Days ahead that the daily reminder commands look for expiring trials/listings
    pub reminder_lead_days: i64,

    /// Public web app URL used for links in reminder emails
    pub app_base_url: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 20)?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: parse_var("JWT_EXPIRY_HOURS", 24)?,
            api_port: parse_var("API_PORT", 3000)?,
            smtp_host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: parse_var("SMTP_PORT", 1025)?,
            smtp_username: std::env::var("SMTP_USERNAME").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
            smtp_use_tls: std::env::var("SMTP_USE_TLS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            mail_from_address: std::env::var("MAIL_FROM_ADDRESS")
                .unwrap_or_else(|_| "noreply@hireport.local".to_string()),
            mail_from_name: std::env::var("MAIL_FROM_NAME")
                .unwrap_or_else(|_| "Hireport".to_string()),
            textmagic_api_url: std::env::var("TEXTMAGIC_API_URL")
                .unwrap_or_else(|_| "https://rest.textmagic.com".to_string()),
            textmagic_username: std::env::var("TEXTMAGIC_USERNAME").ok(),
            textmagic_api_key: std::env::var("TEXTMAGIC_API_KEY").ok(),
            sms_dedup_ttl_seconds: parse_var("SMS_DEDUP_TTL_SECONDS", 86_400)?,
            job_max_attempts: parse_var("JOB_MAX_ATTEMPTS", 3)?,
            job_backoff_seconds: parse_var("JOB_BACKOFF_SECONDS", 60)?,
            job_queue_name: std::env::var("JOB_QUEUE_NAME")
                .unwrap_or_else(|_| "hireport:jobs".to_string()),
            worker_poll_timeout_seconds: parse_var("WORKER_POLL_TIMEOUT_SECONDS", 5)?,
            reminder_lead_days: parse_var("REMINDER_LEAD_DAYS", 3)?,
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Retry policy for queued deliveries.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.job_max_attempts.max(1),
            backoff: Duration::from_secs(self.job_backoff_seconds),
        }
    }

    /// Lifetime of a dedup marker.
    pub fn marker_ttl(&self) -> Duration {
        Duration::from_secs(self.sms_dedup_ttl_seconds)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid {}", name, std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        database_url: "unused".to_string(),
        redis_url: "redis://localhost:6379".to_string(),
        db_max_connections: 5,
        jwt_secret: "test-secret".to_string(),
        jwt_expiry_hours: 24,
        api_port: 3000,
        smtp_host: "localhost".to_string(),
        smtp_port: 1025,
        smtp_username: None,
        smtp_password: None,
        smtp_use_tls: false,
        mail_from_address: "noreply@hireport.local".to_string(),
        mail_from_name: "Hireport".to_string(),
        textmagic_api_url: "http://unused".to_string(),
        textmagic_username: None,
        textmagic_api_key: None,
        sms_dedup_ttl_seconds: 86_400,
        job_max_attempts: 3,
        job_backoff_seconds: 60,
        job_queue_name: "hireport:jobs".to_string(),
        worker_poll_timeout_seconds: 5,
        reminder_lead_days: 3,
        app_base_url: "https://app.hireport.test".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_from_config() {
        let config = test_config();
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, Duration::from_secs(60));
    }

    #[test]
    fn test_retry_policy_never_zero_attempts() {
        let mut config = test_config();
        config.job_max_attempts = 0;
        assert_eq!(config.retry_policy().max_attempts, 1);
    }

    #[test]
    fn test_marker_ttl() {
        assert_eq!(test_config().marker_ttl(), Duration::from_secs(86_400));
    }
}
