//! Error types for MotionIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// MotionIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I2C bus error
    #[error("I2C bus error: {0}")]
    I2c(#[from] i2cdev::linux::LinuxI2CError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration write error
    #[error("Configuration write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Engine not initialized
    #[error("Engine not initialized")]
    NotInitialized,

    /// Engine initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Communication timeout
    #[error("Communication timeout")]
    Timeout,

    /// Bus transfer moved fewer bytes than requested
    #[error("Short transfer: {actual}/{expected} bytes")]
    ShortTransfer {
        /// Bytes the transaction was asked to move
        expected: usize,
        /// Bytes actually moved
        actual: usize,
    },

    /// Shared history region is missing, truncated, or incompatible
    #[error("Invalid history region: {0}")]
    InvalidRegion(String),

    /// Unknown engine kind in configuration
    #[error("Unknown engine kind: {0}")]
    UnknownEngine(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation not supported
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
