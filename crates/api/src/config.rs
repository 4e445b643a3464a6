//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use identity::TokenConfig;

const DEV_JWT_SECRET: &str = "storefront-dev-secret";

/// Which services this process hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceMode {
    #[default]
    All,
    Identity,
    Catalog,
    Fulfillment,
}

impl ServiceMode {
    pub fn hosts_identity(&self) -> bool {
        matches!(self, ServiceMode::All | ServiceMode::Identity)
    }

    pub fn hosts_catalog(&self) -> bool {
        matches!(self, ServiceMode::All | ServiceMode::Catalog)
    }

    pub fn hosts_fulfillment(&self) -> bool {
        matches!(self, ServiceMode::All | ServiceMode::Fulfillment)
    }
}

impl FromStr for ServiceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ServiceMode::All),
            "identity" => Ok(ServiceMode::Identity),
            "catalog" => Ok(ServiceMode::Catalog),
            "fulfillment" => Ok(ServiceMode::Fulfillment),
            other => Err(format!("unknown service mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default: `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `SERVICE`: `all`, `identity`, `catalog` or `fulfillment`
/// - `DATABASE_URL`, `REDIS_URL`: backends; in-memory when unset
/// - `JWT_SECRET`, `ACCESS_TOKEN_TTL_SECS`, `REFRESH_TOKEN_TTL_SECS`,
///   `CHECK_REFRESH_REVOCATION`, `BCRYPT_COST`: token and password settings
/// - `PUBLIC_URL`: base of activation and reset links
/// - `IDENTITY_URL`, `CATALOG_URL`: peers, used when they run elsewhere
/// - `REQUEST_TIMEOUT_MS`: default request budget
/// - `OUTBOX_RETRY_SECS`: stock adjustment relay period, `0` disables it
/// - `ADMIN_EMAIL`, `ADMIN_PASSWORD`, `ADMIN_NAME`: bootstrap admin account
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub service: ServiceMode,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub check_refresh_revocation: bool,
    pub bcrypt_cost: u32,
    pub public_url: String,
    pub identity_url: String,
    pub catalog_url: String,
    pub request_timeout_ms: u64,
    pub outbox_retry_secs: u64,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_name: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parsed("LOG_FORMAT").unwrap_or(defaults.log_format),
            service: parsed("SERVICE").unwrap_or(defaults.service),
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            jwt_secret: non_empty("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            access_token_ttl_secs: parsed("ACCESS_TOKEN_TTL_SECS")
                .unwrap_or(defaults.access_token_ttl_secs),
            refresh_token_ttl_secs: parsed("REFRESH_TOKEN_TTL_SECS")
                .unwrap_or(defaults.refresh_token_ttl_secs),
            check_refresh_revocation: parsed("CHECK_REFRESH_REVOCATION")
                .unwrap_or(defaults.check_refresh_revocation),
            bcrypt_cost: parsed("BCRYPT_COST").unwrap_or(defaults.bcrypt_cost),
            public_url: non_empty("PUBLIC_URL").unwrap_or(defaults.public_url),
            identity_url: non_empty("IDENTITY_URL").unwrap_or(defaults.identity_url),
            catalog_url: non_empty("CATALOG_URL").unwrap_or(defaults.catalog_url),
            request_timeout_ms: parsed("REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout_ms),
            outbox_retry_secs: parsed("OUTBOX_RETRY_SECS").unwrap_or(defaults.outbox_retry_secs),
            admin_email: non_empty("ADMIN_EMAIL"),
            admin_password: non_empty("ADMIN_PASSWORD"),
            admin_name: non_empty("ADMIN_NAME").unwrap_or(defaults.admin_name),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Period of the stock adjustment relay, or `None` when disabled.
    pub fn outbox_retry_interval(&self) -> Option<Duration> {
        (self.outbox_retry_secs > 0).then(|| Duration::from_secs(self.outbox_retry_secs))
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig::new(self.jwt_secret.clone())
            .with_access_ttl(chrono::Duration::seconds(self.access_token_ttl_secs))
            .with_refresh_ttl(chrono::Duration::seconds(self.refresh_token_ttl_secs))
            .with_refresh_revocation(self.check_refresh_revocation)
    }

    /// Bootstrap admin credentials, when both are configured.
    pub fn admin_credentials(&self) -> Option<(&str, &str)> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            service: ServiceMode::All,
            database_url: None,
            redis_url: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 86_400,
            check_refresh_revocation: false,
            bcrypt_cost: 10,
            public_url: "http://localhost:3000".to_string(),
            identity_url: "http://127.0.0.1:3000".to_string(),
            catalog_url: "http://127.0.0.1:3000".to_string(),
            request_timeout_ms: 5000,
            outbox_retry_secs: 30,
            admin_email: None,
            admin_password: None,
            admin_name: "Administrator".to_string(),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    non_empty(key).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.service, ServiceMode::All);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert!(!config.check_refresh_revocation);
        assert!(config.uses_dev_secret());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn service_mode_parsing() {
        assert_eq!("Catalog".parse::<ServiceMode>(), Ok(ServiceMode::Catalog));
        assert!("billing".parse::<ServiceMode>().is_err());
        assert!(ServiceMode::All.hosts_identity());
        assert!(!ServiceMode::Fulfillment.hosts_catalog());
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
    }

    #[test]
    fn zero_retry_period_disables_relay() {
        let config = Config {
            outbox_retry_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.outbox_retry_interval(), None);
        assert_eq!(
            Config::default().outbox_retry_interval(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn admin_credentials_need_both_parts() {
        let mut config = Config {
            admin_email: Some("root@example.com".to_string()),
            ..Config::default()
        };
        assert_eq!(config.admin_credentials(), None);
        config.admin_password = Some("secret".to_string());
        assert_eq!(
            config.admin_credentials(),
            Some(("root@example.com", "secret"))
        );
    }
}
