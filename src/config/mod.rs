//! Configuration System
//!
//! This module provides configuration management for the sweep logger using Figment.
//!
//! # Configuration Sources
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Environment variables prefixed with `SWEEPDAQ_`
//! 2. TOML configuration file (default: `config/sweep_daq.toml`)
//! 3. Built-in defaults
//!
//! # Example
//!
//! ```no_run
//! use sweep_daq::config::Settings;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load()?;
//!     println!("Log level: {}", settings.application.log_level);
//!     println!("PSU: {}", settings.instruments.psu_resource);
//!     Ok(())
//! }
//! ```
//!
//! # Environment Variables
//!
//! Nested keys are separated with a double underscore:
//!
//! ```text
//! SWEEPDAQ_APPLICATION__LOG_LEVEL=debug
//! SWEEPDAQ_INSTRUMENTS__PSU_RESOURCE="TCPIP0::192.168.1.20::5025::SOCKET"
//! SWEEPDAQ_TIMING__OVERHEAD_PER_STEP_SECS=0.7
//! ```

pub mod settings;

pub use settings::{
    ApplicationConfig, ConfigError, InstrumentsConfig, Settings, SweepDefaults, TimingConfig,
    DEFAULT_CONFIG_PATH,
};
