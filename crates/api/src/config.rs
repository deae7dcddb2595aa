//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `JWT_SECRET` - HS256 signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `API_HOST` - Bind address (default: 127.0.0.1)
//! - `API_PORT` - Listen port (default: 8000)
//! - `API_BASE_URL` - Public URL used for payment callbacks (default: `http://localhost:8000`)
//! - `ACCESS_TOKEN_MINUTES` - Access token lifetime (default: 15)
//! - `REFRESH_TOKEN_DAYS` - Refresh token lifetime (default: 7)
//! - `MAX_SESSIONS_PER_USER` - Concurrent device sessions, 0 = unlimited (default: 5)
//! - `SESSION_EXPIRE_DAYS` - Idle days before a session expires (default: 30)
//! - `AUTO_CLEANUP_SESSIONS` - Run the periodic cleanup task (default: true)
//! - `CLEANUP_INTERVAL_HOURS` - Period of the cleanup task (default: 24)
//! - `LOG_SESSION_ACTIVITIES` - Log session lifecycle events (default: true)
//! - `FORCE_LOGOUT_ON_SUSPICIOUS` - Terminate other sessions on suspicious logins (default: false)
//! - `PAYPAL_BASE` - PayPal REST base URL (default: sandbox)
//! - `PAYPAL_CLIENT_ID` / `PAYPAL_CLIENT_SECRET` - PayPal app credentials; PayPal is disabled without them
//! - `PAYPAL_WEBHOOK_ID` - Webhook ID used for signature verification
//! - `CORS_ALLOWED_ORIGINS` - Comma-separated origins (default: any)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Default PayPal REST endpoint (sandbox).
pub const PAYPAL_SANDBOX_BASE: &str = "https://api-m.sandbox.paypal.com";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the API
    pub base_url: Url,
    /// Token signing and lifetimes
    pub jwt: JwtConfig,
    /// Device session policy
    pub sessions: SessionPolicy,
    /// PayPal credentials, `None` when PayPal is not configured
    pub paypal: Option<PayPalConfig>,
    /// Allowed CORS origins; empty allows any origin
    pub cors_allowed_origins: Vec<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// JWT signing configuration.
///
/// Implements `Debug` manually to redact the secret.
#[derive(Clone)]
pub struct JwtConfig {
    /// HS256 signing secret
    pub secret: SecretString,
    /// Access token lifetime
    pub access_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_ttl: Duration,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Multi-device session policy.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Maximum concurrent active sessions per user (0 = unlimited)
    pub max_sessions_per_user: u32,
    /// Days of inactivity after which a session expires
    pub expire_days: u32,
    /// Run the periodic cleanup task
    pub auto_cleanup: bool,
    /// Period of the cleanup task in hours
    pub cleanup_interval_hours: u64,
    /// Emit info-level logs for session lifecycle events
    pub log_activities: bool,
    /// Terminate other sessions when a login looks suspicious
    pub force_logout_on_suspicious: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_sessions_per_user: 5,
            expire_days: 30,
            auto_cleanup: true,
            cleanup_interval_hours: 24,
            log_activities: true,
            force_logout_on_suspicious: false,
        }
    }
}

impl SessionPolicy {
    /// Idle period after which a session counts as expired.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::days(i64::from(self.expire_days))
    }
}

/// PayPal REST API configuration.
///
/// Implements `Debug` manually to redact the client secret.
#[derive(Clone)]
pub struct PayPalConfig {
    /// REST base URL (sandbox or live)
    pub base_url: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: SecretString,
    /// Webhook ID used to verify webhook signatures
    pub webhook_id: Option<String>,
}

impl std::fmt::Debug for PayPalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayPalConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("webhook_id", &self.webhook_id)
            .finish()
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = SecretString::from(get_required_env("DATABASE_URL")?);
        let host = parse_env("API_HOST", "127.0.0.1")?;
        let port = parse_env("API_PORT", "8000")?;
        let base_url = parse_env::<Url>("API_BASE_URL", "http://localhost:8000")?;

        let jwt = JwtConfig::from_env()?;
        let sessions = SessionPolicy::from_env()?;
        let paypal = PayPalConfig::from_env()?;

        let cors_allowed_origins = get_optional_env("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            jwt,
            sessions,
            paypal,
            cors_allowed_origins,
            sentry_dsn,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Absolute URL for an API path such as `/api/v1/payments/paypal/success/`.
    #[must_use]
    pub fn absolute_url(&self, path: &str) -> String {
        self.base_url
            .join(path)
            .map_or_else(|_| format!("{}{path}", self.base_url), String::from)
    }
}

impl JwtConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret = get_validated_secret("JWT_SECRET")?;
        validate_jwt_secret_length(&secret, "JWT_SECRET")?;

        let access_minutes: i64 = parse_env("ACCESS_TOKEN_MINUTES", "15")?;
        let refresh_days: i64 = parse_env("REFRESH_TOKEN_DAYS", "7")?;
        if access_minutes <= 0 || refresh_days <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ACCESS_TOKEN_MINUTES/REFRESH_TOKEN_DAYS".to_string(),
                "token lifetimes must be positive".to_string(),
            ));
        }

        Ok(Self {
            secret,
            access_ttl: Duration::minutes(access_minutes),
            refresh_ttl: Duration::days(refresh_days),
        })
    }
}

impl SessionPolicy {
    /// Read the session policy alone, for tools that do not serve HTTP.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_sessions_per_user: parse_env(
                "MAX_SESSIONS_PER_USER",
                &defaults.max_sessions_per_user.to_string(),
            )?,
            expire_days: parse_env("SESSION_EXPIRE_DAYS", &defaults.expire_days.to_string())?,
            auto_cleanup: get_bool_env("AUTO_CLEANUP_SESSIONS", defaults.auto_cleanup)?,
            cleanup_interval_hours: parse_env(
                "CLEANUP_INTERVAL_HOURS",
                &defaults.cleanup_interval_hours.to_string(),
            )?,
            log_activities: get_bool_env("LOG_SESSION_ACTIVITIES", defaults.log_activities)?,
            force_logout_on_suspicious: get_bool_env(
                "FORCE_LOGOUT_ON_SUSPICIOUS",
                defaults.force_logout_on_suspicious,
            )?,
        })
    }
}

impl PayPalConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (Some(client_id), Some(client_secret)) = (
            get_optional_env("PAYPAL_CLIENT_ID"),
            get_optional_env("PAYPAL_CLIENT_SECRET"),
        ) else {
            return Ok(None);
        };

        let base_url = get_env_or_default("PAYPAL_BASE", PAYPAL_SANDBOX_BASE);
        Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("PAYPAL_BASE".to_string(), e.to_string()))?;

        Ok(Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret: SecretString::from(client_secret),
            webhook_id: get_optional_env("PAYPAL_WEBHOOK_ID"),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional, non-empty environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`).
fn get_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |raw| parse_bool(&raw).ok_or_else(|| {
        ConfigError::InvalidEnvVar(key.to_string(), format!("expected a boolean, got '{raw}'"))
    }))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Validate that the JWT secret meets minimum length requirements.
fn validate_jwt_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_config() -> ApiConfig {
        ApiConfig {
            database_url: SecretString::from("postgres://localhost/souk"),
            host: "127.0.0.1".parse().unwrap(),
            port: 8000,
            base_url: Url::parse("https://shop.example.ma").unwrap(),
            jwt: JwtConfig {
                secret: SecretString::from("k7Q!p2Zr9@Lm4#Xw8$Tn3%Vb6^Hc1&Jd"),
                access_ttl: Duration::minutes(15),
                refresh_ttl: Duration::days(7),
            },
            sessions: SessionPolicy::default(),
            paypal: None,
            cors_allowed_origins: Vec::new(),
            sentry_dsn: None,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-jwt-signing-key", "JWT_SECRET").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength(&"ab".repeat(20), "JWT_SECRET");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("k7Q!p2Zr9@Lm4#Xw8$Tn3%Vb6^Hc1&Jd", "JWT_SECRET");
        assert!(result.is_ok());
    }

    #[test]
    fn test_jwt_secret_too_short() {
        let secret = SecretString::from("Zr9@Lm4#");
        assert!(validate_jwt_secret_length(&secret, "JWT_SECRET").is_err());
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_session_policy_defaults() {
        let policy = SessionPolicy::default();
        assert_eq!(policy.max_sessions_per_user, 5);
        assert_eq!(policy.expire_days, 30);
        assert_eq!(policy.idle_timeout(), Duration::days(30));
        assert!(!policy.force_logout_on_suspicious);
    }

    #[test]
    fn test_socket_addr() {
        let addr = sample_config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn test_absolute_url() {
        let config = sample_config();
        assert_eq!(
            config.absolute_url("/api/v1/payments/paypal/success/"),
            "https://shop.example.ma/api/v1/payments/paypal/success/"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = sample_config();
        config.paypal = Some(PayPalConfig {
            base_url: PAYPAL_SANDBOX_BASE.to_string(),
            client_id: "client-id-value".to_string(),
            client_secret: SecretString::from("paypal-client-secret-value"),
            webhook_id: None,
        });

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("client-id-value"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("paypal-client-secret-value"));
        assert!(!debug_output.contains("k7Q!p2Zr9"));
    }
}
