//! Error types for LTC6811 daisy-chain transactions

use thiserror::Error;

/// Result type for LTC6811 driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors reported by the driver.
///
/// Bus and integrity failures are chain-wide: a single bad record fails the
/// whole register group and no partial data is handed out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Transport transmit/receive/select failure
    #[error("Bus error: {0}")]
    Bus(String),

    /// PEC mismatch on a received register group
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Configuration read back from the chain differs from what was written
    #[error("Configuration mismatch: {0}")]
    ConfigMismatch(String),

    /// Argument outside its valid range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl DriverError {
    /// Create a new Bus error
    pub fn bus(msg: impl Into<String>) -> Self {
        DriverError::Bus(msg.into())
    }

    /// Create a new Integrity error
    pub fn integrity(msg: impl Into<String>) -> Self {
        DriverError::Integrity(msg.into())
    }

    /// Create a new ConfigMismatch error
    pub fn config_mismatch(msg: impl Into<String>) -> Self {
        DriverError::ConfigMismatch(msg.into())
    }

    /// Create a new InvalidParameter error
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        DriverError::InvalidParameter(msg.into())
    }

    /// True for failures that leave the group without usable data
    pub fn is_transaction_failure(&self) -> bool {
        matches!(self, DriverError::Bus(_) | DriverError::Integrity(_))
    }
}
