//! Strongly-typed settings loaded with Figment.
//!
//! Defaults are serialized into the figment first, so a missing file or a
//! partial file is fine; every field has a value.

use crate::instrument::Channel;
use crate::sweep::SweepConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default location of the settings file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/sweep_daq.toml";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Configuration validation error: {0}")]
    Validation(String),
    #[error("Configuration render error: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationConfig,
    /// Instrument addresses and transport timeout
    pub instruments: InstrumentsConfig,
    /// Time estimation calibration
    pub timing: TimingConfig,
    /// Default sweep parameters (overridable per run)
    pub sweep: SweepDefaults,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Instrument connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentsConfig {
    /// Power supply resource (e.g. "TCPIP0::192.168.1.20::5025::SOCKET")
    pub psu_resource: String,
    /// Multimeter resource (e.g. "USB0::0x2A8D::0x8E01::CN12345678::INSTR")
    pub dmm_resource: String,
    /// Transport timeout for a single write or query, in milliseconds
    pub timeout_ms: u64,
}

/// Time estimator calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Fixed per-step communication overhead, in seconds
    pub overhead_per_step_secs: f64,
}

/// Defaults for a sweep run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepDefaults {
    pub start_voltage: f64,
    pub stop_voltage: f64,
    pub step_voltage: f64,
    pub current_limit: f64,
    pub settle_time_secs: f64,
    pub channel: Channel,
    pub high_impedance: bool,
    /// Output file; a `.csv` extension is added when missing
    pub output: PathBuf,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for InstrumentsConfig {
    fn default() -> Self {
        Self {
            psu_resource: String::new(),
            dmm_resource: String::new(),
            timeout_ms: 5000,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            overhead_per_step_secs: 0.9,
        }
    }
}

impl Default for SweepDefaults {
    fn default() -> Self {
        Self {
            start_voltage: 0.0,
            stop_voltage: 5.0,
            step_voltage: 0.5,
            current_limit: 1.0,
            settle_time_secs: 0.5,
            channel: Channel::One,
            high_impedance: true,
            output: PathBuf::from("measurements"),
        }
    }
}

impl InstrumentsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SweepDefaults {
    /// Sweep parameters from these defaults (the output path is separate).
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            start_voltage: self.start_voltage,
            stop_voltage: self.stop_voltage,
            step_voltage: self.step_voltage,
            settle_time_secs: self.settle_time_secs,
            current_limit: self.current_limit,
            channel: self.channel,
            high_impedance: self.high_impedance,
        }
    }
}

impl Settings {
    /// Load settings from `config/sweep_daq.toml` and environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a source is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load settings from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Self = Self::figment(path.as_ref())
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))?;

        settings.validate()?;
        Ok(settings)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SWEEPDAQ_").split("__"))
    }

    /// Validate settings after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Transport timeout is non-zero
    /// - Per-step overhead is finite and non-negative
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.instruments.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "instruments.timeout_ms must be > 0".to_string(),
            ));
        }

        let overhead = self.timing.overhead_per_step_secs;
        if !overhead.is_finite() || overhead < 0.0 {
            return Err(ConfigError::Validation(format!(
                "Invalid timing.overhead_per_step_secs {}. Must be >= 0",
                overhead
            )));
        }

        Ok(())
    }

    /// Render the effective settings as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.timing.overhead_per_step_secs, 0.9);
        assert_eq!(settings.sweep.step_voltage, 0.5);
        assert_eq!(settings.sweep.channel, Channel::One);
        assert_eq!(settings.instruments.timeout(), Duration::from_secs(5));
        assert!(settings.sweep.sweep_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.application.log_level = "verbose".to_string();

        let result = settings.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid log_level"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut settings = Settings::default();
        settings.instruments.timeout_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_negative_overhead_rejected() {
        let mut settings = Settings::default();
        settings.timing.overhead_per_step_secs = -0.1;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("overhead_per_step_secs"));
    }

    #[test]
    fn test_file_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bench.toml",
                r#"
                [instruments]
                psu_resource = "TCPIP0::10.0.0.2::5025::SOCKET"
                dmm_resource = "TCPIP0::10.0.0.3::5025::SOCKET"
                timeout_ms = 2000

                [sweep]
                stop_voltage = 12.0
                channel = 2
                "#,
            )?;
            jail.set_env("SWEEPDAQ_APPLICATION__LOG_LEVEL", "debug");
            jail.set_env("SWEEPDAQ_TIMING__OVERHEAD_PER_STEP_SECS", "0.25");

            let settings = Settings::load_from("bench.toml").map_err(|e| e.to_string())?;
            assert_eq!(settings.application.log_level, "debug");
            assert_eq!(settings.instruments.timeout_ms, 2000);
            assert_eq!(settings.timing.overhead_per_step_secs, 0.25);
            assert_eq!(settings.sweep.stop_voltage, 12.0);
            assert_eq!(settings.sweep.channel, Channel::Two);
            // Untouched keys keep their defaults
            assert_eq!(settings.sweep.start_voltage, 0.0);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let settings = Settings::load_from("does_not_exist.toml").map_err(|e| e.to_string())?;
            assert_eq!(settings, Settings::default());
            Ok(())
        });
    }

    #[test]
    fn test_render_toml() {
        let rendered = Settings::default().to_toml().unwrap();
        assert!(rendered.contains("[timing]"));
        assert!(rendered.contains("overhead_per_step_secs = 0.9"));
    }
}
