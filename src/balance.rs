//! Passive balancing decisions
//!
//! Each pass turns a [`VoltageStatus`] and the latest cell voltage groups
//! into one 12-bit discharge mask per chain position. Masks replace the
//! previous pass's bits rather than accumulating on top of them.

use crate::chain::DAISY_CHAIN_LENGTH;
use crate::error::Result;
use crate::register::{ConfigRegister, RegisterGroup};
use crate::summary::{CellLocation, VoltageStatus, CHANNELS_PER_REGISTER};

/// Default balancing threshold in raw 100 µV counts (10 mV)
pub const DEFAULT_DISCHARGE_DELTA: u16 = 100;

/// Policy used to pick cells for discharge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DischargeMode {
    /// Every cell above `min + delta`
    #[default]
    GtMinPlusDelta,
    /// Only the highest cell, once the spread exceeds `delta`
    MaxOnly,
    /// Every cell above `mean + delta`
    GtMeanPlusDelta,
}

impl std::fmt::Display for DischargeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DischargeMode::GtMinPlusDelta => write!(f, "min + delta"),
            DischargeMode::MaxOnly => write!(f, "max only"),
            DischargeMode::GtMeanPlusDelta => write!(f, "mean + delta"),
        }
    }
}

/// Per-position discharge masks, cell 1 in bit 0
pub type DischargeMasks = [u16; DAISY_CHAIN_LENGTH];

/// Decide which cells to discharge.
///
/// `cells` are the cell voltage groups A-D the status was computed from.
/// Fails only when `MaxOnly` is handed a `max_id` outside the chain.
pub fn discharge_masks(
    mode: DischargeMode,
    delta: u16,
    status: &VoltageStatus,
    cells: &[RegisterGroup<u16>],
) -> Result<DischargeMasks> {
    let mut masks = [0u16; DAISY_CHAIN_LENGTH];

    match mode {
        DischargeMode::GtMinPlusDelta => {
            let threshold = u32::from(status.min) + u32::from(delta);
            mark_above(&mut masks, threshold, cells);
        }
        DischargeMode::MaxOnly => {
            if status.spread() > delta {
                let location = CellLocation::from_flat_index(status.max_id)?;
                masks[location.position] = 1 << location.cell;
            }
        }
        DischargeMode::GtMeanPlusDelta => {
            let threshold = status.mean() + u32::from(delta);
            mark_above(&mut masks, threshold, cells);
        }
    }

    Ok(masks)
}

fn mark_above(masks: &mut DischargeMasks, threshold: u32, cells: &[RegisterGroup<u16>]) {
    for (group_index, group) in cells.iter().enumerate() {
        for (position, mask) in masks.iter_mut().enumerate() {
            for (channel, voltage) in group.values(position).enumerate() {
                if u32::from(voltage) > threshold {
                    *mask |= 1 << (group_index * CHANNELS_PER_REGISTER + channel);
                }
            }
        }
    }
}

/// Write masks into the configuration group, refreshing every PEC
pub fn apply_discharge_masks(config: &mut RegisterGroup<u8>, masks: &DischargeMasks) {
    for (register, &mask) in config.registers_mut().iter_mut().zip(masks) {
        register.set_discharge_mask(mask);
    }
}
