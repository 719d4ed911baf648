use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FlashlogError;
use crate::types::Result;

/// Default per-thread staging buffer capacity.
pub const DEFAULT_STAGING_BUFFER_SIZE: usize = 1 << 20;
/// Default capacity of each half of the output double buffer.
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 8 << 20;
/// Default bound on how long the worker sleeps when no buffer has work.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(100);
/// Default output file path.
pub const DEFAULT_LOG_FILE: &str = "./flashlog.clog";

/// Runtime configuration.
///
/// `Default` matches the compiled-in constants; deserialized configs fill
/// missing fields from the same defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capacity in bytes of each per-thread staging buffer.
    pub staging_buffer_size: usize,
    /// Capacity in bytes of each half of the worker's output double buffer.
    pub output_buffer_size: usize,
    /// Upper bound on the worker's idle wait between scans.
    pub poll_interval: Duration,
    /// Path of the compressed output file.
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            staging_buffer_size: DEFAULT_STAGING_BUFFER_SIZE,
            output_buffer_size: DEFAULT_OUTPUT_BUFFER_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl Config {
    /// Checks the size relationships the worker depends on.
    ///
    /// The output buffer must hold the worst-case encoding of a full staging
    /// buffer so the codec can always make forward progress against an empty
    /// output buffer; twice the staging capacity covers every supported codec.
    pub fn validate(&self) -> Result<()> {
        if self.staging_buffer_size < 4096 {
            return Err(FlashlogError::InvalidConfig(format!(
                "staging_buffer_size {} is below the 4096-byte minimum",
                self.staging_buffer_size
            )));
        }
        if self.output_buffer_size < self.staging_buffer_size * 2 {
            return Err(FlashlogError::InvalidConfig(format!(
                "output_buffer_size {} must be at least twice staging_buffer_size {}",
                self.output_buffer_size, self.staging_buffer_size
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(FlashlogError::InvalidConfig(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders the configuration as the text block `print_config` emits.
    pub fn describe(&self) -> String {
        format!(
            "flashlog configuration\n\
             \x20 staging buffer size : {} bytes\n\
             \x20 output buffer size  : {} bytes\n\
             \x20 poll interval       : {:?}\n\
             \x20 log file            : {}\n",
            self.staging_buffer_size,
            self.output_buffer_size,
            self.poll_interval,
            self.log_file.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_undersized_output_buffer() {
        let config = Config {
            staging_buffer_size: 1 << 20,
            output_buffer_size: 1 << 20,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FlashlogError::InvalidConfig(_))
        ));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "staging_buffer_size": 8192 }"#).unwrap();
        assert_eq!(config.staging_buffer_size, 8192);
        assert_eq!(config.output_buffer_size, DEFAULT_OUTPUT_BUFFER_SIZE);
    }
}
