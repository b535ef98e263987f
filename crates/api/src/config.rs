//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL` — PostgreSQL URL; unset runs on in-memory stores
/// - `INVENTORY_SERVICE_URL` — remote reservation service; unset calls the
///   in-process one
/// - `SAGA_STEP_TIMEOUT_MS` (default: `10000`)
/// - `LOOKUP_TIMEOUT_MS` (default: `5000`)
/// - `RESERVATION_TTL_SECS` (default: `900`)
/// - `EXPIRY_SWEEP_INTERVAL_SECS` (default: `60`)
/// - `BUS_PARTITIONS` (default: `3`)
/// - `BUS_RETENTION` — events kept per topic (default: `10000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub inventory_service_url: Option<String>,
    pub step_timeout: Duration,
    pub lookup_timeout: Duration,
    pub reservation_ttl_secs: i64,
    pub sweep_interval: Duration,
    pub bus_partitions: usize,
    pub bus_retention: usize,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: var("DATABASE_URL"),
            inventory_service_url: var("INVENTORY_SERVICE_URL"),
            step_timeout: parsed("SAGA_STEP_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.step_timeout),
            lookup_timeout: parsed("LOOKUP_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lookup_timeout),
            reservation_ttl_secs: parsed("RESERVATION_TTL_SECS")
                .filter(|s: &i64| *s > 0)
                .unwrap_or(defaults.reservation_ttl_secs),
            sweep_interval: parsed("EXPIRY_SWEEP_INTERVAL_SECS")
                .filter(|s: &u64| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            bus_partitions: parsed("BUS_PARTITIONS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.bus_partitions),
            bus_retention: parsed("BUS_RETENTION")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.bus_retention),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reservation TTL as a chrono duration.
    pub fn reservation_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reservation_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            inventory_service_url: None,
            step_timeout: saga::DEFAULT_STEP_TIMEOUT,
            lookup_timeout: saga::DEFAULT_LOOKUP_TIMEOUT,
            reservation_ttl_secs: inventory::DEFAULT_RESERVATION_TTL_SECS,
            sweep_interval: inventory::sweeper::DEFAULT_SWEEP_INTERVAL,
            bus_partitions: event_bus::memory::DEFAULT_PARTITIONS,
            bus_retention: event_bus::memory::DEFAULT_RETENTION,
        }
    }
}
