use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::documents::domain::DocType;

/// Monitoring reviews open this many days before the goal period ends.
pub const DEFAULT_MONITORING_LEAD_DAYS: u32 = 14;
pub const DEFAULT_ALERT_DAYS_BEFORE: u32 = 14;
pub const DEFAULT_CYCLE_MONTHS: u32 = 6;

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

/// Top-level configuration for the engine and its HTTP surface.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub scheduling: SchedulingConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
            },
            scheduling: SchedulingConfig::from_env()?,
        })
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub ansi: bool,
}

/// Renewal policy applied when a schedule row is first created and when
/// monitoring reviews are derived from goal periods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingConfig {
    pub care_plan_cycle_months: u32,
    pub tejunsho_cycle_months: u32,
    pub monitoring_cycle_months: u32,
    pub alert_days_before: u32,
    pub monitoring_lead_days: u32,
    pub contract_alert_days: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            care_plan_cycle_months: DEFAULT_CYCLE_MONTHS,
            tejunsho_cycle_months: DEFAULT_CYCLE_MONTHS,
            monitoring_cycle_months: DEFAULT_CYCLE_MONTHS,
            alert_days_before: DEFAULT_ALERT_DAYS_BEFORE,
            monitoring_lead_days: DEFAULT_MONITORING_LEAD_DAYS,
            contract_alert_days: DEFAULT_ALERT_DAYS_BEFORE,
        }
    }
}

impl SchedulingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            care_plan_cycle_months: read_u32(
                "APP_CARE_PLAN_CYCLE_MONTHS",
                defaults.care_plan_cycle_months,
            )?,
            tejunsho_cycle_months: read_u32(
                "APP_TEJUNSHO_CYCLE_MONTHS",
                defaults.tejunsho_cycle_months,
            )?,
            monitoring_cycle_months: read_u32(
                "APP_MONITORING_CYCLE_MONTHS",
                defaults.monitoring_cycle_months,
            )?,
            alert_days_before: read_u32("APP_ALERT_DAYS_BEFORE", defaults.alert_days_before)?,
            monitoring_lead_days: read_u32(
                "APP_MONITORING_LEAD_DAYS",
                defaults.monitoring_lead_days,
            )?,
            contract_alert_days: read_u32(
                "APP_CONTRACT_ALERT_DAYS",
                defaults.contract_alert_days,
            )?,
        };

        for doc_type in DocType::ordered() {
            if config.cycle_months_for(doc_type) == 0 {
                return Err(ConfigError::ZeroCycle(doc_type));
            }
        }

        Ok(config)
    }

    pub fn cycle_months_for(&self, doc_type: DocType) -> u32 {
        match doc_type {
            DocType::CarePlan => self.care_plan_cycle_months,
            DocType::Tejunsho => self.tejunsho_cycle_months,
            DocType::Monitoring => self.monitoring_cycle_months,
        }
    }
}

fn read_u32(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    ZeroCycle(DocType),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a non-negative whole number")
            }
            ConfigError::ZeroCycle(doc_type) => write!(
                f,
                "renewal cycle for {} must be at least one month",
                doc_type.label()
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::ZeroCycle(_) => None,
        }
    }
}
