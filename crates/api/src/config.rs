//! Application configuration loaded from environment variables.

/// Which payment provider implementation to wire in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentsMode {
    /// Mock provider: accepts every signature (development/testing).
    Mock,
    /// HMAC-signed gateway with real secrets.
    Gateway,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `ADMIN_TOKEN` — value of the `x-admin-token` header (default: `"change-me"`)
/// - `PAYMENTS_MODE` — `mock` or `gateway` (default: `mock`)
/// - `GATEWAY_KEY_ID`, `GATEWAY_KEY_SECRET`, `GATEWAY_WEBHOOK_SECRET` —
///   gateway credentials, required in `gateway` mode
/// - `DATABASE_URL` — optional; selects the PostgreSQL store over the
///   in-memory one
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub admin_token: String,
    pub payments_mode: PaymentsMode,
    pub gateway_key_id: String,
    pub gateway_key_secret: String,
    pub gateway_webhook_secret: String,
    pub database_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let payments_mode = match std::env::var("PAYMENTS_MODE").as_deref() {
            Ok("gateway") => PaymentsMode::Gateway,
            _ => PaymentsMode::Mock,
        };
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            admin_token: std::env::var("ADMIN_TOKEN").unwrap_or_else(|_| "change-me".to_string()),
            payments_mode,
            gateway_key_id: std::env::var("GATEWAY_KEY_ID").unwrap_or_default(),
            gateway_key_secret: std::env::var("GATEWAY_KEY_SECRET").unwrap_or_default(),
            gateway_webhook_secret: std::env::var("GATEWAY_WEBHOOK_SECRET").unwrap_or_default(),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            admin_token: "change-me".to_string(),
            payments_mode: PaymentsMode::Mock,
            gateway_key_id: String::new(),
            gateway_key_secret: String::new(),
            gateway_webhook_secret: String::new(),
            database_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.payments_mode, PaymentsMode::Mock);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
