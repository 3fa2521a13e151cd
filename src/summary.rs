//! Chain-wide reductions over cell voltage and auxiliary register groups
//!
//! Channels are numbered by a flat counter in scan order: register group,
//! then chain position, then the three channels of the record, so
//! `index = group * 36 + position * 3 + channel`.

use crate::chain::{CELLS_PER_DEVICE, DAISY_CHAIN_LENGTH};
use crate::error::{DriverError, Result};
use crate::register::RegisterGroup;

/// Channels held by one device in one register group
pub const CHANNELS_PER_REGISTER: usize = 3;

/// Channels one register group contributes across the whole chain
pub const CHANNELS_PER_GROUP: usize = CHANNELS_PER_REGISTER * DAISY_CHAIN_LENGTH;

/// Divider supply seen by the thermistors, in raw 100 µV counts (3 V)
pub const THERMISTOR_VREF: f32 = 30000.0;

/// (aux group, channel) of the second reference, which is not a thermistor
const REFERENCE_CHANNEL: (usize, usize) = (1, 2);

/// Steinhart-Hart coefficients fitted to the pack's NTC thermistors
const SH_A: f32 = 0.003354016;
const SH_B: f32 = 0.000256524;
const SH_C: f32 = 0.00000260597;
const SH_D: f32 = 0.0000000632926;

/// centikelvin to centidegree Celsius
const KELVIN_OFFSET_CENTI: f32 = 27315.0;

/// A cell addressed by chain position and its number on that device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellLocation {
    /// Chain position, 0 = closest to the host
    pub position: usize,
    /// Cell on that device, 0-based (cell 1 = 0)
    pub cell: usize,
}

impl CellLocation {
    /// Map a flat scan index from the cell voltage groups to a cell
    pub fn from_flat_index(index: usize) -> Result<Self> {
        let total = CELLS_PER_DEVICE * DAISY_CHAIN_LENGTH;
        if index >= total {
            return Err(DriverError::invalid_parameter(format!(
                "channel index {} out of range [0, {})",
                index, total
            )));
        }

        let group = index / CHANNELS_PER_GROUP;
        let within = index % CHANNELS_PER_GROUP;
        Ok(CellLocation {
            position: within / CHANNELS_PER_REGISTER,
            cell: group * CHANNELS_PER_REGISTER + within % CHANNELS_PER_REGISTER,
        })
    }

    /// Inverse of [`CellLocation::from_flat_index`]
    pub fn flat_index(&self) -> usize {
        let group = self.cell / CHANNELS_PER_REGISTER;
        group * CHANNELS_PER_GROUP
            + self.position * CHANNELS_PER_REGISTER
            + self.cell % CHANNELS_PER_REGISTER
    }
}

/// Summary of one cell voltage reading cycle (raw 100 µV units)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoltageStatus {
    pub sum: u32,
    pub min: u16,
    pub min_id: usize,
    pub max: u16,
    pub max_id: usize,
}

impl Default for VoltageStatus {
    fn default() -> Self {
        VoltageStatus {
            sum: 0,
            min: u16::MAX,
            min_id: 0,
            max: u16::MIN,
            max_id: 0,
        }
    }
}

impl VoltageStatus {
    /// Fold in one reading; equal values never displace an earlier extreme
    pub fn record(&mut self, index: usize, voltage: u16) {
        self.sum += u32::from(voltage);
        if voltage < self.min {
            self.min = voltage;
            self.min_id = index;
        }
        if voltage > self.max {
            self.max = voltage;
            self.max_id = index;
        }
    }

    /// Spread between the highest and lowest cell
    pub fn spread(&self) -> u16 {
        self.max.saturating_sub(self.min)
    }

    /// Mean cell voltage over the whole chain
    pub fn mean(&self) -> u32 {
        self.sum / (CELLS_PER_DEVICE * DAISY_CHAIN_LENGTH) as u32
    }
}

/// Summary of one temperature reading cycle (centidegrees Celsius)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TempStatus {
    pub min: i16,
    pub min_id: usize,
    pub max: i16,
    pub max_id: usize,
}

impl Default for TempStatus {
    fn default() -> Self {
        TempStatus {
            min: i16::MAX,
            min_id: 0,
            max: i16::MIN,
            max_id: 0,
        }
    }
}

impl TempStatus {
    /// Fold in one temperature; equal values never displace an earlier extreme
    pub fn record(&mut self, index: usize, temperature: i16) {
        if temperature < self.min {
            self.min = temperature;
            self.min_id = index;
        }
        if temperature > self.max {
            self.max = temperature;
            self.max_id = index;
        }
    }
}

/// Reduce cell voltage groups A-D to a [`VoltageStatus`]
pub fn summarize_voltages(groups: &[RegisterGroup<u16>]) -> VoltageStatus {
    let mut status = VoltageStatus::default();

    for (index, voltage) in groups.iter().flat_map(|g| g.iter_values()).enumerate() {
        status.record(index, voltage);
    }

    status
}

/// Reduce auxiliary groups to a [`TempStatus`].
///
/// The second reference in auxiliary group B and readings outside the
/// thermistor's valid range still consume an index but do not contribute.
pub fn summarize_temperatures(groups: &[RegisterGroup<u16>]) -> TempStatus {
    let mut status = TempStatus::default();

    for (group_index, group) in groups.iter().enumerate() {
        for position in 0..DAISY_CHAIN_LENGTH {
            for (channel, raw) in group.values(position).enumerate() {
                if (group_index, channel) == REFERENCE_CHANNEL {
                    continue;
                }
                let index = group_index * CHANNELS_PER_GROUP
                    + position * CHANNELS_PER_REGISTER
                    + channel;
                if let Some(temperature) = steinhart_hart(raw) {
                    status.record(index, temperature);
                }
            }
        }
    }

    status
}

/// Convert a raw thermistor divider reading to centidegrees Celsius.
///
/// `raw` is the GPIO voltage in 100 µV counts across a divider fed from
/// [`THERMISTOR_VREF`]. Returns `None` for 0 and for readings at or above
/// the divider supply, where the model is undefined. Results beyond the
/// `i16` range saturate.
pub fn steinhart_hart(raw: u16) -> Option<i16> {
    let voltage = f32::from(raw);
    if raw == 0 || voltage >= THERMISTOR_VREF {
        return None;
    }

    let l = -(THERMISTOR_VREF / voltage - 1.0).ln();
    let centikelvin = 100.0 / (SH_A + l * (SH_B + l * (SH_C + SH_D * l)));

    Some((centikelvin - KELVIN_OFFSET_CENTI) as i16)
}
