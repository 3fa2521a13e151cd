//! Wake-up sequencing and timing constants for the isoSPI daisy chain
//!
//! Each LTC6811 moves between three core states:
//!
//! - **Sleep**: isoSPI and core powered down; needs [`wake_from_sleep`]
//! - **Idle/Ready**: isoSPI port awake, ready to accept a command; a port
//!   left idle longer than `T_IDLE_MIN` silently drops back to Idle and must
//!   be woken again with [`wake_from_idle`]
//! - **Active**: converting or shifting data
//!
//! The driver keeps no record of these states. Every transaction re-issues
//! the idle wake-up because the device watchdog runs independently of us.

use crate::chain::DAISY_CHAIN_LENGTH;
use crate::error::Result;
use crate::transport::{bus_error, with_select, Transport};
use embedded_hal::delay::DelayNs;
use tracing::trace;

/// Maximum time for a device to leave Sleep after a wake-up pulse (µs)
pub const T_WAKE_MAX_US: u32 = 400;
/// isoSPI Idle to Ready time (µs)
pub const T_READY_US: u32 = 10;
/// Minimum time before an idle isoSPI port drops back to Idle (µs)
pub const T_IDLE_MIN_US: u32 = 4300;
/// Worst-case reference power-up time (µs)
pub const T_REFUP_MAX_US: u32 = 4400;
/// Worst-case time to measure all 12 cells in fast mode (µs)
pub const T_CYCLE_FAST_MAX_US: u32 = 1185;
/// Settle time applied after every conversion command (µs)
pub const CONVERSION_WAIT_US: u32 = T_REFUP_MAX_US + T_CYCLE_FAST_MAX_US;
/// Settle time between writing and reading back the configuration (µs)
pub const CONFIG_SETTLE_US: u32 = 500;

/// Dummy byte clocked out to bring an isoSPI port to Ready
const WAKE_BYTE: u8 = 0xFF;

/// Pulse chip select once per device so every part in the chain leaves Sleep.
///
/// The wake-up signal only propagates one device further each time, so the
/// pulse is repeated for the full chain length.
pub fn wake_from_sleep<P, D>(port: &mut P, delay: &mut D) -> Result<()>
where
    P: Transport + ?Sized,
    D: DelayNs + ?Sized,
{
    trace!("wake from sleep");

    for _ in 0..DAISY_CHAIN_LENGTH {
        port.select(true).map_err(bus_error)?;
        delay.delay_us(T_WAKE_MAX_US);
        port.select(false).map_err(bus_error)?;
        delay.delay_us(T_READY_US);
    }

    Ok(())
}

/// Clock one dummy byte per device so every isoSPI port is Ready.
pub fn wake_from_idle<P>(port: &mut P) -> Result<()>
where
    P: Transport + ?Sized,
{
    trace!("wake from idle");

    for _ in 0..DAISY_CHAIN_LENGTH {
        with_select(port, |port| port.transmit(&[WAKE_BYTE]))?;
    }

    Ok(())
}

/// Host-side [`DelayNs`] backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::mock::{BusEvent, ChainSim, RecordingDelay};

    #[test]
    fn test_conversion_wait_covers_fast_cycle() {
        assert_eq!(CONVERSION_WAIT_US, 5585);
        assert!(CONVERSION_WAIT_US < T_IDLE_MIN_US + T_REFUP_MAX_US);
    }

    #[test]
    fn test_wake_from_sleep_pulses_every_device() -> Result<()> {
        let mut chain = ChainSim::new();
        let mut delay = RecordingDelay::default();

        wake_from_sleep(&mut chain, &mut delay)?;

        let events = chain.events();
        assert_eq!(events.len(), 2 * DAISY_CHAIN_LENGTH);
        assert!(events
            .chunks(2)
            .all(|pair| pair == [BusEvent::Select, BusEvent::Release]));
        assert_eq!(
            delay.total_us(),
            u64::from(T_WAKE_MAX_US + T_READY_US) * DAISY_CHAIN_LENGTH as u64
        );
        Ok(())
    }

    #[test]
    fn test_wake_from_idle_sends_dummy_bytes() -> Result<()> {
        let mut chain = ChainSim::new();

        wake_from_idle(&mut chain)?;

        let frames = chain.frames();
        assert_eq!(frames.len(), DAISY_CHAIN_LENGTH);
        assert!(frames.iter().all(|frame| frame == &[WAKE_BYTE]));
        Ok(())
    }

    #[test]
    fn test_wake_from_idle_releases_select_on_error() {
        let mut chain = ChainSim::new();
        chain.fail_transmit_after(0);

        let result = wake_from_idle(&mut chain);

        assert!(matches!(result, Err(DriverError::Bus(_))));
        assert_eq!(chain.events().last(), Some(&BusEvent::Release));
    }
}
