use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub vision: VisionConfig,
    pub audit: AuditConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let api_base = env::var("VISION_API_BASE")
            .unwrap_or_else(|_| VisionConfig::DEFAULT_API_BASE.to_string());
        let api_key = env::var("VISION_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let model =
            env::var("VISION_MODEL").unwrap_or_else(|_| VisionConfig::DEFAULT_MODEL.to_string());
        let timeout_secs = parse_u64("VISION_TIMEOUT_SECS", 60)
            .map_err(|_| ConfigError::InvalidNumber("VISION_TIMEOUT_SECS"))?;
        let batch_delay_ms = parse_u64("AUDIT_BATCH_DELAY_MS", 1000)
            .map_err(|_| ConfigError::InvalidNumber("AUDIT_BATCH_DELAY_MS"))?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            vision: VisionConfig {
                api_base,
                api_key,
                model,
            },
            audit: AuditConfig {
                check_timeout: Duration::from_secs(timeout_secs),
                batch_delay: Duration::from_millis(batch_delay_ms),
            },
        })
    }
}

fn parse_u64(key: &str, default: u64) -> Result<u64, std::num::ParseIntError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<u64>(),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Connection settings for the image verification model.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl VisionConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";
}

/// Timing dials for audit passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditConfig {
    /// Upper bound for a single verification call.
    pub check_timeout: Duration,
    /// Pause between claims during a batch audit.
    pub batch_delay: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(60),
            batch_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber(key) => {
                write!(f, "{key} must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber(_) => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "VISION_API_BASE",
            "VISION_API_KEY",
            "VISION_MODEL",
            "VISION_TIMEOUT_SECS",
            "AUDIT_BATCH_DELAY_MS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.vision.model, VisionConfig::DEFAULT_MODEL);
        assert!(config.vision.api_key.is_none());
        assert_eq!(config.audit, AuditConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn audit_timings_read_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("VISION_TIMEOUT_SECS", "15");
        env::set_var("AUDIT_BATCH_DELAY_MS", "250");
        env::set_var("VISION_API_KEY", "   ");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.audit.check_timeout, Duration::from_secs(15));
        assert_eq!(config.audit.batch_delay, Duration::from_millis(250));
        assert!(config.vision.api_key.is_none(), "blank keys are ignored");
        reset_env();
    }

    #[test]
    fn rejects_malformed_batch_delay() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("AUDIT_BATCH_DELAY_MS", "soon");
        match AppConfig::load() {
            Err(ConfigError::InvalidNumber(key)) => assert_eq!(key, "AUDIT_BATCH_DELAY_MS"),
            other => panic!("expected invalid number error, got {other:?}"),
        }
        reset_env();
    }
}
