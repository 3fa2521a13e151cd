//! Bus access consumed by the driver
//!
//! The driver never touches hardware directly. Anything that can drive the
//! chip-select line and clock bytes in and out implements [`Transport`]; the
//! [`SpiTransport`] adapter covers `embedded-hal` SPI buses with a GPIO
//! chip select (for example an LTC6820 isoSPI bridge).

use crate::error::DriverError;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

/// Blocking select/transmit/receive access to the chain
///
/// Every call blocks until the transfer finishes or the implementation's own
/// timeout expires; a timeout is reported as an error.
pub trait Transport {
    /// Error reported by the underlying bus
    type Error: core::fmt::Debug;

    /// Drive chip select: `true` asserts (low), `false` releases
    fn select(&mut self, active: bool) -> Result<(), Self::Error>;

    /// Clock out `bytes`
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Clock in exactly `buffer.len()` bytes
    fn receive(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn select(&mut self, active: bool) -> Result<(), Self::Error> {
        (**self).select(active)
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        (**self).transmit(bytes)
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        (**self).receive(buffer)
    }
}

pub(crate) fn bus_error<E: core::fmt::Debug>(err: E) -> DriverError {
    DriverError::bus(format!("{:?}", err))
}

/// Run `body` with chip select asserted, releasing it even when `body` fails.
pub(crate) fn with_select<P, F>(port: &mut P, body: F) -> crate::error::Result<()>
where
    P: Transport + ?Sized,
    F: FnOnce(&mut P) -> Result<(), P::Error>,
{
    port.select(true).map_err(bus_error)?;
    let outcome = body(port);
    let released = port.select(false);
    outcome.map_err(bus_error)?;
    released.map_err(bus_error)
}

/// Errors from [`SpiTransport`]
#[derive(Debug, thiserror::Error)]
pub enum SpiTransportError<S: core::fmt::Debug, P: core::fmt::Debug> {
    /// SPI transfer failed
    #[error("SPI error: {0:?}")]
    Spi(S),

    /// Chip-select pin could not be driven
    #[error("chip select error: {0:?}")]
    ChipSelect(P),
}

/// [`Transport`] over an `embedded-hal` SPI bus and chip-select pin
pub struct SpiTransport<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> SpiTransport<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    /// Wrap a bus and its chip-select pin
    pub fn new(spi: SPI, cs: CS) -> Self {
        SpiTransport { spi, cs }
    }

    /// Release the bus and pin
    pub fn free(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}

impl<SPI, CS> Transport for SpiTransport<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    type Error = SpiTransportError<SPI::Error, CS::Error>;

    fn select(&mut self, active: bool) -> Result<(), Self::Error> {
        if active {
            self.cs.set_low().map_err(SpiTransportError::ChipSelect)
        } else {
            // Finish clocking before releasing the line
            self.spi.flush().map_err(SpiTransportError::Spi)?;
            self.cs.set_high().map_err(SpiTransportError::ChipSelect)
        }
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.spi.write(bytes).map_err(SpiTransportError::Spi)
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.spi.read(buffer).map_err(SpiTransportError::Spi)
    }
}
