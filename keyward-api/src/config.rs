/// Configuration management for the API server
///
/// Composes the server settings with the shared database and auth
/// configuration, all read from environment variables.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: *)
/// - `ENVIRONMENT`: `production` enables HSTS
/// - `TRUSTED_PROXIES`: Comma-separated proxy IPs whose `X-Forwarded-For` is honoured (default: none)
/// - `LOG_FORMAT`: `json` for structured logs, anything else for text
/// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`: see [`DatabaseConfig`]
/// - `JWT_SECRET` and the other auth variables: see [`AuthConfig`]
///
/// # Example
///
/// ```no_run
/// use keyward_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use keyward_shared::config::AuthConfig;
use keyward_shared::db::pool::DatabaseConfig;
use std::env;
use std::net::IpAddr;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Token and session lifecycle configuration
    pub auth: AuthConfig,

    /// Log output format
    pub log_format: LogFormat,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Production mode (HSTS on)
    pub production: bool,

    /// Peers allowed to report the client address via `X-Forwarded-For`
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            production: false,
            trusted_proxies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let defaults = ApiConfig::default();

        let host = env::var("API_HOST").unwrap_or(defaults.host);
        let port = match env::var("API_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|e| anyhow::anyhow!("Invalid value for API_PORT: {}", e))?,
            Err(_) => defaults.port,
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or(defaults.cors_origins);

        let production = env::var("ENVIRONMENT")
            .map(|env| env.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let trusted_proxies = match env::var("TRUSTED_PROXIES") {
            Ok(raw) => parse_proxies(&raw)?,
            Err(_) => defaults.trusted_proxies,
        };

        let log_format = env::var("LOG_FORMAT")
            .map(|raw| LogFormat::parse(&raw))
            .unwrap_or_default();

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
                production,
                trusted_proxies,
            },
            database: DatabaseConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            log_format,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_proxies(raw: &str) -> anyhow::Result<Vec<IpAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|proxy| !proxy.is_empty())
        .map(|proxy| {
            proxy
                .parse::<IpAddr>()
                .map_err(|e| anyhow::anyhow!("Invalid value for TRUSTED_PROXIES ({}): {}", proxy, e))
        })
        .collect()
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let config = Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                ..Default::default()
            },
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            log_format: LogFormat::Text,
        };

        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("https://a.example, https://b.example,,"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn test_parse_proxies() {
        let proxies = parse_proxies("10.0.0.1, ::1,").unwrap();
        assert_eq!(
            proxies,
            vec![
                IpAddr::from([10, 0, 0, 1]),
                "::1".parse::<IpAddr>().unwrap()
            ]
        );
        assert!(parse_proxies("10.0.0.0/8").is_err());
        assert!(ApiConfig::default().trusted_proxies.is_empty());
    }

    #[test]
    fn test_log_format() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
    }
}
