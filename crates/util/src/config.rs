use std::{env, fmt, net::SocketAddr};

use url::Url;

pub const DEFAULT_PROXY_BIND_ADDR: &str = "127.0.0.1:5174";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/";
pub const DEFAULT_PROXY_PREFIX: &str = "/api";
pub const DEFAULT_PROXY_TARGET: &str = "https://web-production-2d737.up.railway.app/";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Settings for the local development proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_addr: SocketAddr,
    /// Path prefix that is stripped before forwarding, without a trailing slash.
    pub prefix: String,
    pub target: Url,
    /// Skip TLS certificate validation towards `target`.
    pub insecure_tls: bool,
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    /// Root of the registration API, always ending in `/`.
    pub api_base_url: Url,
    pub proxy: ProxyConfig,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;

        let api_base_url = parse_base_url("API_BASE_URL", DEFAULT_API_BASE_URL)?;

        let bind_addr: SocketAddr = env::var("PROXY_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_PROXY_BIND_ADDR.to_string())
            .parse()
            .map_err(ConfigError::BindAddress)?;
        let prefix = parse_prefix(
            &env::var("PROXY_PREFIX").unwrap_or_else(|_| DEFAULT_PROXY_PREFIX.to_string()),
        )?;
        let target = parse_base_url("PROXY_TARGET", DEFAULT_PROXY_TARGET)?;
        let insecure_tls = match env::var("PROXY_INSECURE_TLS") {
            Ok(value) => parse_flag("PROXY_INSECURE_TLS", &value)?,
            Err(_) => true,
        };

        Ok(Self {
            environment,
            api_base_url,
            proxy: ProxyConfig {
                bind_addr,
                prefix,
                target,
                insecure_tls,
            },
        })
    }
}

fn parse_base_url(var: &'static str, default: &str) -> Result<Url, ConfigError> {
    let raw = env::var(var).unwrap_or_else(|_| default.to_string());
    let mut url = Url::parse(&raw).map_err(|err| ConfigError::InvalidUrl { var, source: err })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme {
            var,
            scheme: url.scheme().to_string(),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_prefix(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !trimmed.starts_with('/') || trimmed.len() < 2 {
        return Err(ConfigError::InvalidProxyPrefix(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            var,
            value: value.to_string(),
        }),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidUrl {
        var: &'static str,
        source: url::ParseError,
    },
    UnsupportedScheme {
        var: &'static str,
        scheme: String,
    },
    InvalidProxyPrefix(String),
    InvalidFlag {
        var: &'static str,
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid PROXY_BIND_ADDR value: {err}"),
            Self::InvalidUrl { var, source } => write!(f, "invalid {var} value: {source}"),
            Self::UnsupportedScheme { var, scheme } => {
                write!(f, "{var} must use http or https (got {scheme})")
            }
            Self::InvalidProxyPrefix(value) => write!(
                f,
                "PROXY_PREFIX must start with '/' and name at least one segment (got {value})"
            ),
            Self::InvalidFlag { var, value } => {
                write!(f, "{var} must be a boolean flag (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ENV_GUARD;

    const VARS: [&str; 6] = [
        "APP_ENV",
        "API_BASE_URL",
        "PROXY_BIND_ADDR",
        "PROXY_PREFIX",
        "PROXY_TARGET",
        "PROXY_INSECURE_TLS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.api_base_url.as_str(), DEFAULT_API_BASE_URL);
        assert_eq!(config.proxy.bind_addr.to_string(), DEFAULT_PROXY_BIND_ADDR);
        assert_eq!(config.proxy.prefix, "/api");
        assert_eq!(config.proxy.target.as_str(), DEFAULT_PROXY_TARGET);
        assert!(config.proxy.insecure_tls);
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "invalid");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        clear_env();
    }

    #[test]
    fn parses_production_overrides() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "production");
        env::set_var("API_BASE_URL", "https://api.example.com/v1");
        env::set_var("PROXY_BIND_ADDR", "0.0.0.0:9000");
        env::set_var("PROXY_PREFIX", "/backend/");
        env::set_var("PROXY_INSECURE_TLS", "false");

        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.api_base_url.as_str(), "https://api.example.com/v1/");
        assert_eq!(config.proxy.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.proxy.prefix, "/backend");
        assert!(!config.proxy.insecure_tls);

        clear_env();
    }

    #[test]
    fn rejects_non_http_base_url() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("API_BASE_URL", "ftp://files.example.com/");

        let err = AppConfig::from_env().expect_err("ftp should be rejected");
        assert!(matches!(
            err,
            ConfigError::UnsupportedScheme { var: "API_BASE_URL", .. }
        ));

        clear_env();
    }

    #[test]
    fn rejects_root_prefix_and_bad_flags() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("PROXY_PREFIX", "/");
        let err = AppConfig::from_env().expect_err("root prefix should be rejected");
        assert!(matches!(err, ConfigError::InvalidProxyPrefix(_)));

        clear_env();
        env::set_var("PROXY_INSECURE_TLS", "maybe");
        let err = AppConfig::from_env().expect_err("flag should be rejected");
        assert!(matches!(err, ConfigError::InvalidFlag { .. }));

        clear_env();
    }

    #[test]
    fn rejects_unparseable_bind_address() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("PROXY_BIND_ADDR", "localhost");

        let err = AppConfig::from_env().expect_err("host names are not socket addresses");
        assert!(matches!(err, ConfigError::BindAddress(_)));
        assert!(err.to_string().starts_with("invalid PROXY_BIND_ADDR value"));

        clear_env();
    }
}
