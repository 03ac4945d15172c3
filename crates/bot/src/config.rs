//! Bot configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TELEGRAM_BOT_TOKEN` - Bot API token issued by `@BotFather`
//! - `TELEGRAM_SUPER_USER` - Numeric chat identity of the operator
//!
//! ## Optional
//! - `BOT_DATABASE_URL` - SQLite connection string (default: `sqlite://botdata.db`)
//! - `BOT_DB_MAX_CONNECTIONS` - Pool size (default: 8)
//! - `BOT_DB_BUSY_TIMEOUT_SECS` - SQLite busy handler timeout (default: 10)
//! - `BOT_HOST` - Health listener bind address (default: 127.0.0.1)
//! - `BOT_PORT` - Health listener port (default: 3002)
//! - `TELEGRAM_POLL_TIMEOUT_SECS` - Long-poll timeout for `getUpdates` (default: 60)
//! - `TOPUP_COOLDOWN_SECS` - Minimum wait between top-ups of one worker (default: 43200)
//! - `REGISTRATION_TIMEOUT_SECS` - Time allowed to answer the registration prompt (default: 300)
//! - `CONVERSATION_IDLE_SECS` - Idle expiry of multi-step conversations (default: 900)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry error sample rate (default: 1.0)
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_DATABASE_URL: &str = "sqlite://botdata.db";

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

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Bot application configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram gateway configuration
    pub telegram: TelegramConfig,
    /// Ledger store configuration
    pub database: DatabaseConfig,
    /// Business rules that are tuned per deployment
    pub ledger: LedgerConfig,
    /// IP address to bind the health listener to
    pub host: IpAddr,
    /// Port of the health listener
    pub port: u16,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Log output format
    pub log_format: LogFormat,
}

/// Telegram Bot API configuration.
///
/// Implements `Debug` manually to redact the bot token.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot API token
    pub bot_token: SecretString,
    /// Operator identity allowed to use the super-user actions
    pub super_user: i64,
    /// Long-poll timeout for `getUpdates`
    pub poll_timeout: Duration,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("super_user", &self.super_user)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// SQLite store configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection string, e.g. `sqlite://botdata.db`
    pub url: String,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// How long a connection waits on a locked database before failing
    pub busy_timeout: Duration,
}

/// Deployment-tunable ledger rules.
#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    /// Minimum seconds between two top-ups of the same worker
    pub topup_cooldown_secs: i64,
    /// Seconds a `/start` stays valid before the profile line must be resent
    pub registration_timeout_secs: i64,
    /// Idle expiry of multi-step conversations
    pub conversation_idle: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            topup_cooldown_secs: 12 * 60 * 60,
            registration_timeout_secs: 5 * 60,
            conversation_idle: Duration::from_secs(15 * 60),
        }
    }
}

impl BotConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the bot token fails validation (`<bot id>:<secret>` shape, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`BotConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let telegram = TelegramConfig {
            bot_token: env.bot_token("TELEGRAM_BOT_TOKEN")?,
            super_user: env.required_parsed("TELEGRAM_SUPER_USER")?,
            poll_timeout: Duration::from_secs(env.parsed_or("TELEGRAM_POLL_TIMEOUT_SECS", 60)?),
        };

        let database = DatabaseConfig {
            url: env.or_default("BOT_DATABASE_URL", DEFAULT_DATABASE_URL),
            max_connections: env.parsed_or("BOT_DB_MAX_CONNECTIONS", 8)?,
            busy_timeout: Duration::from_secs(env.parsed_or("BOT_DB_BUSY_TIMEOUT_SECS", 10)?),
        };
        if database.max_connections == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BOT_DB_MAX_CONNECTIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let defaults = LedgerConfig::default();
        let ledger = LedgerConfig {
            topup_cooldown_secs: env
                .parsed_or("TOPUP_COOLDOWN_SECS", defaults.topup_cooldown_secs)?,
            registration_timeout_secs: env
                .parsed_or("REGISTRATION_TIMEOUT_SECS", defaults.registration_timeout_secs)?,
            conversation_idle: Duration::from_secs(
                env.parsed_or("CONVERSATION_IDLE_SECS", defaults.conversation_idle.as_secs())?,
            ),
        };
        if ledger.topup_cooldown_secs < 0 || ledger.registration_timeout_secs < 0 {
            return Err(ConfigError::InvalidEnvVar(
                "TOPUP_COOLDOWN_SECS/REGISTRATION_TIMEOUT_SECS".to_string(),
                "must not be negative".to_string(),
            ));
        }

        let host = env.parsed_or("BOT_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = env.parsed_or("BOT_PORT", 3002_u16)?;

        let sentry_dsn = env.optional("SENTRY_DSN");
        let sentry_environment = env.optional("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = env
            .optional("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let log_format = match env.optional("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            telegram,
            database,
            ledger,
            host,
            port,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            log_format,
        })
    }

    /// Returns the socket address for the health listener.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup with the typed accessors used above.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable, treating empty values as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a required variable.
    fn required_parsed<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.required(key)?;
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    /// Parse an optional variable, falling back to `default` when unset.
    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
            None => Ok(default),
        }
    }

    /// Load and validate a bot token.
    fn bot_token(&self, key: &str) -> Result<SecretString, ConfigError> {
        let value = self.required(key)?;
        validate_bot_token(&value, key)?;
        Ok(SecretString::from(value))
    }
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
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate the `<bot id>:<secret>` shape of a bot token.
///
/// Tokens are issued at random, so no substring of the secret is meaningful;
/// only the shape and the entropy of the secret part are checked.
fn validate_bot_token(token: &str, var_name: &str) -> Result<(), ConfigError> {
    let insecure = |reason: &str| ConfigError::InsecureSecret(var_name.to_string(), reason.to_string());

    let (bot_id, secret) = token
        .split_once(':')
        .ok_or_else(|| insecure("expected <bot id>:<secret>"))?;
    if bot_id.is_empty() || !bot_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(insecure("bot id must be numeric"));
    }
    if secret.is_empty()
        || !secret
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(insecure("secret must be non-empty base64url text"));
    }

    validate_secret_strength(secret, var_name)
}

/// Validate that a secret has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TOKEN: &str = "7311842210:AAH4vQ9zKx2LmNp8RtYw3BcDfGh6JkUo1Ps";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("TELEGRAM_SUPER_USER", "424242"),
        ]))
        .unwrap();

        assert_eq!(config.telegram.super_user, 424_242);
        assert_eq!(config.telegram.poll_timeout, Duration::from_secs(60));
        assert_eq!(config.database.url, DEFAULT_DATABASE_URL);
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.database.busy_timeout, Duration::from_secs(10));
        assert_eq!(config.ledger.topup_cooldown_secs, 43_200);
        assert_eq!(config.ledger.registration_timeout_secs, 300);
        assert_eq!(config.ledger.conversation_idle, Duration::from_secs(900));
        assert_eq!(config.socket_addr().port(), 3002);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_overrides() {
        let config = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("TELEGRAM_SUPER_USER", "1"),
            ("BOT_DATABASE_URL", "sqlite::memory:"),
            ("TOPUP_COOLDOWN_SECS", "60"),
            ("BOT_PORT", "8088"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.ledger.topup_cooldown_secs, 60);
        assert_eq!(config.port, 8088);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_missing_token() {
        let err = BotConfig::from_lookup(lookup(&[("TELEGRAM_SUPER_USER", "1")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_invalid_super_user() {
        let err = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("TELEGRAM_SUPER_USER", "operator"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "TELEGRAM_SUPER_USER"));
    }

    #[test]
    fn test_placeholder_token_rejected() {
        let err = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "your-bot-token-here"),
            ("TELEGRAM_SUPER_USER", "1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_token_with_word_like_secret_accepted() {
        let token = "7311842210:AAxxxH4vQ9TODOKx2LmNpInsert8RtYwSecret3BcDf";
        let config = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", token),
            ("TELEGRAM_SUPER_USER", "1"),
        ]))
        .unwrap();
        assert_eq!(config.telegram.super_user, 1);
    }

    #[test]
    fn test_malformed_token_rejected() {
        for token in ["AAH4vQ9zKx2LmNp8RtYw3BcDfGh6JkUo1Ps", "bot:AAH4vQ9zKx2LmNp8RtYw", "7311842210:"] {
            let err = validate_bot_token(token, "TELEGRAM_BOT_TOKEN").unwrap_err();
            assert!(matches!(err, ConfigError::InsecureSecret(_, _)), "token {token}");
        }
    }

    #[test]
    fn test_zero_pool_rejected() {
        let err = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("TELEGRAM_SUPER_USER", "1"),
            ("BOT_DB_MAX_CONNECTIONS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_telegram_config_debug_redacts_token() {
        let config = TelegramConfig {
            bot_token: SecretString::from(TOKEN),
            super_user: 7,
            poll_timeout: Duration::from_secs(60),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("super_user: 7"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains(TOKEN));
    }
}
