//! Configuration for the MotionIO daemon
//!
//! Loads configuration from a TOML file: which engine to run, where the
//! sensor sits on the I2C bus, sampling rates, and where the shared
//! history region lives.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub transport: TransportConfig,
    pub sampling: SamplingConfig,
    pub compass: CompassConfig,
    pub history: HistoryConfig,
}

/// Motion engine selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Engine kind (`sim` for the simulated engine)
    pub kind: String,
    /// Simulator RNG seed; 0 seeds from entropy
    pub seed: u64,
}

/// I2C transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// I2C bus device node
    pub bus: String,
    /// 7-bit device address on the bus
    pub address: u16,
}

/// Sampling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SamplingConfig {
    /// Engine output rate in Hz
    pub sample_rate_hz: u16,
    /// Gyro full-scale range in deg/s (250, 500, 1000, 2000)
    pub gyro_fsr_dps: u16,
    /// FIFO output rate in Hz
    pub fifo_rate_hz: u16,
    /// Mounting orientation preset (`horizontal`, `vertical`, `edge`)
    pub orientation: String,
}

/// Magnetometer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompassConfig {
    /// Steady-state compass poll rate in Hz; 0 disables polling
    pub sample_rate_hz: u16,
    /// Run the interactive hard/soft-iron calibration pass at startup
    pub calibrate_on_start: bool,
    /// Readings to collect during a calibration pass
    pub calibration_samples: usize,
    /// Compass rate during the calibration pass in Hz
    pub calibration_rate_hz: u16,
}

/// Shared history region configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Backing file for the memory-mapped region
    pub path: String,
    /// Sample slots in the circular history
    pub capacity: u32,
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Arguments
    /// - `path`: Path to TOML configuration file
    ///
    /// # Returns
    /// Parsed configuration or error
    ///
    /// # Example
    /// ```no_run
    /// use motion_io::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("motionio.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Default configuration for an MPU-9250 class sensor
    ///
    /// Suitable for testing and development. Production deployments
    /// should use a proper TOML configuration file.
    pub fn mpu9250_defaults() -> Self {
        Self {
            engine: EngineConfig {
                kind: "sim".to_string(),
                seed: 0,
            },
            transport: TransportConfig {
                bus: "/dev/i2c-1".to_string(),
                address: 0x68,
            },
            sampling: SamplingConfig {
                sample_rate_hz: 200,
                gyro_fsr_dps: 1000,
                fifo_rate_hz: 200,
                orientation: "horizontal".to_string(),
            },
            compass: CompassConfig {
                sample_rate_hz: 5,
                calibrate_on_start: false,
                calibration_samples: 1500,
                calibration_rate_hz: 100,
            },
            history: HistoryConfig {
                path: "/dev/shm/motion_history.shm".to_string(),
                capacity: 1024,
            },
        }
    }

    /// Save configuration to TOML file
    ///
    /// # Arguments
    /// - `path`: Path to save TOML configuration file
    ///
    /// # Returns
    /// Success or error
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::mpu9250_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::mpu9250_defaults();
        assert_eq!(config.engine.kind, "sim");
        assert_eq!(config.transport.bus, "/dev/i2c-1");
        assert_eq!(config.transport.address, 0x68);
        assert_eq!(config.sampling.sample_rate_hz, 200);
        assert_eq!(config.sampling.gyro_fsr_dps, 1000);
        assert_eq!(config.compass.sample_rate_hz, 5);
        assert_eq!(config.history.capacity, 1024);
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::mpu9250_defaults();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_string.contains("[engine]"));
        assert!(toml_string.contains("[transport]"));
        assert!(toml_string.contains("[sampling]"));
        assert!(toml_string.contains("[compass]"));
        assert!(toml_string.contains("[history]"));

        // Should contain key values
        assert!(toml_string.contains("sample_rate_hz = 200"));
        assert!(toml_string.contains("bus = \"/dev/i2c-1\""));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[engine]
kind = "sim"
seed = 42

[transport]
bus = "/dev/i2c-0"
address = 104

[sampling]
sample_rate_hz = 100
gyro_fsr_dps = 2000
fifo_rate_hz = 100
orientation = "vertical"

[compass]
sample_rate_hz = 10
calibrate_on_start = true
calibration_samples = 500
calibration_rate_hz = 50

[history]
path = "/tmp/motion_history.shm"
capacity = 256
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.engine.seed, 42);
        assert_eq!(config.transport.bus, "/dev/i2c-0");
        assert_eq!(config.sampling.gyro_fsr_dps, 2000);
        assert!(config.compass.calibrate_on_start);
        assert_eq!(config.history.capacity, 256);
    }
}
