//! # LTC6811 Daisy-Chain Driver
//!
//! A driver core for a chain of twelve LTC6811 battery cell monitors reached
//! over a single isoSPI bus.
//!
//! The LTC6811 measures twelve series cells, five GPIO inputs and a set of
//! internal status values. Every frame on the bus is protected by a 15-bit
//! packet error code (PEC15). This library provides:
//!
//! - PEC15 computation and command framing
//! - Register group encoding for a whole chain
//! - Wake-up sequencing and conversion timing
//! - Voltage, temperature and device status summaries
//! - Passive balancing decisions with write-and-verify
//!
//! ## Features
//!
//! - `serde`: Enable serialization/deserialization of configuration and
//!   summary types
//!
//! ## Example
//!
//! ```
//! use ltc6811_chain::{Command, Ltc6811Builder, Mode, StdDelay, Transport};
//!
//! // Fixed commands carry a precomputed PEC
//! assert_eq!(Command::RDCVA.as_bytes(), &[0x00, 0x04, 0x07, 0xC2]);
//!
//! // Any bus that can select, transmit and receive drives the chain
//! struct NullPort;
//!
//! impl Transport for NullPort {
//!     type Error = core::convert::Infallible;
//!
//!     fn select(&mut self, _active: bool) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//!
//!     fn transmit(&mut self, _bytes: &[u8]) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//!
//!     fn receive(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
//!         buffer.fill(0xFF);
//!         Ok(())
//!     }
//! }
//!
//! let driver = Ltc6811Builder::new().with_mode(Mode::Fast).build(NullPort, StdDelay);
//! assert_eq!(driver.commands().adcv.opcode(), 0x02E0);
//! ```

pub mod balance;
pub mod command;
pub mod driver;
pub mod error;
pub mod pec;
pub mod register;
pub mod status;
pub mod summary;
pub mod timing;
pub mod transport;

#[cfg(test)]
mod mock;

pub use balance::{DischargeMasks, DischargeMode};
pub use command::{
    AuxChannels, AuxGroup, CellChannels, CellGroup, Command, ConversionCommands,
    ConversionConfig, DischargePermission, Mode, StatusChannels, StatusGroup,
};
pub use driver::{Ltc6811, Ltc6811Builder};
pub use error::{DriverError, Result};
pub use register::{DeviceRegister, RegisterGroup};
pub use status::DeviceStatus;
pub use summary::{CellLocation, TempStatus, VoltageStatus};
pub use timing::StdDelay;
pub use transport::{SpiTransport, SpiTransportError, Transport};

/// Daisy-chain geometry constants
pub mod chain {
    /// Devices in the chain
    pub const DAISY_CHAIN_LENGTH: usize = 12;

    /// Series cells measured by each device
    pub const CELLS_PER_DEVICE: usize = 12;

    /// Payload bytes in one device's register record
    pub const PAYLOAD_BYTES: usize = 6;

    /// Payload plus the two PEC bytes
    pub const BYTES_PER_REGISTER: usize = PAYLOAD_BYTES + 2;

    /// Command opcode plus PEC
    pub use crate::command::COMMAND_LENGTH;
}
