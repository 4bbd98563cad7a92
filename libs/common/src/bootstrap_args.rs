//! Common command-line arguments for the PLC monitor binaries
//!
//! Flattened into each binary's own argument struct.

#[cfg(feature = "cli")]
use clap::Args;

use crate::logging::LogConfig;

/// Common startup arguments
///
/// Shared by `plcsrv` and `coilscan`: logging options plus the
/// configuration file location.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(Args))]
pub struct ServiceArgs {
    /// Configuration file (YAML, TOML or JSON)
    #[cfg_attr(
        feature = "cli",
        arg(short = 'c', long, default_value = "config/plcsrv.yaml", env = "PLCSRV_CONFIG")
    )]
    pub config: String,

    /// Log level or filter (trace, debug, info, warn, error, or "info,plcsrv=debug")
    #[cfg_attr(feature = "cli", arg(short = 'l', long, env = "RUST_LOG"))]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[cfg_attr(feature = "cli", arg(long))]
    pub log_json: bool,

    /// Also write logs to daily files in this directory
    #[cfg_attr(feature = "cli", arg(long, env = "PLCSRV_LOG_DIR"))]
    pub log_dir: Option<String>,

    /// Disable colored output (useful for log files)
    #[cfg_attr(feature = "cli", arg(long))]
    pub no_color: bool,
}

impl Default for ServiceArgs {
    fn default() -> Self {
        Self {
            config: "config/plcsrv.yaml".to_string(),
            log_level: None,
            log_json: false,
            log_dir: None,
            no_color: false,
        }
    }
}

impl ServiceArgs {
    /// Parse log level string to tracing::Level
    ///
    /// Full filter specs fall back to INFO for the console threshold; the
    /// filter itself is still handed to `EnvFilter` unchanged.
    pub fn parse_log_level(&self) -> tracing::Level {
        match self
            .log_level
            .as_deref()
            .unwrap_or("info")
            .to_lowercase()
            .as_str()
        {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }

    /// Build a logging configuration for `service_name`
    ///
    /// `config_level` is the level from the configuration file; the
    /// command line wins over it.
    pub fn log_config(&self, service_name: &str, config_level: Option<&str>) -> LogConfig {
        LogConfig {
            service_name: service_name.to_string(),
            filter: self
                .log_level
                .clone()
                .or_else(|| config_level.map(str::to_string)),
            log_dir: self.log_dir.as_ref().map(Into::into),
            enable_json: self.log_json,
            ansi: !self.no_color,
        }
    }
}
