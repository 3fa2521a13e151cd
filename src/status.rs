//! Decoding of status register groups A and B

use crate::chain::CELLS_PER_DEVICE;
use crate::register::DeviceRegister;
use bitfield::bitfield;

bitfield! {
    /// STBR5: revision code and fault flags
    ///
    /// - Bits 7-4: REV
    /// - Bits 3-2: reserved
    /// - Bit 1: MUXFAIL
    /// - Bit 0: THSD
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct RevisionFlags(u8);
    impl Debug;
    u8;
    pub rev, _: 7, 4;
    pub muxfail, _: 1, 1;
    pub thsd, _: 0, 0;
}

/// Decoded status of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStatus {
    /// Sum of all cells in 100 µV counts (the register holds 1/20 of it)
    pub sum_of_cells: u32,
    /// Raw die temperature code
    pub internal_temp_raw: u16,
    /// Analog supply, 100 µV counts
    pub analog_supply: u16,
    /// Digital supply, 100 µV counts
    pub digital_supply: u16,
    /// Undervoltage flags, cell 1 in bit 0
    pub undervoltage: u16,
    /// Overvoltage flags, cell 1 in bit 0
    pub overvoltage: u16,
    /// Silicon revision code
    pub revision: u8,
    /// Multiplexer self test failed
    pub mux_fail: bool,
    /// Thermal shutdown has occurred
    pub thermal_shutdown: bool,
}

impl DeviceStatus {
    /// Combine one device's records from status groups A and B
    pub fn decode(group_a: &DeviceRegister, group_b: &DeviceRegister) -> Self {
        let a = &group_a.data;
        let b = &group_b.data;

        let mut undervoltage = 0u16;
        let mut overvoltage = 0u16;
        for cell in 0..CELLS_PER_DEVICE {
            let byte = b[2 + cell / 4];
            let shift = (cell % 4) * 2;
            if byte & (1 << shift) != 0 {
                undervoltage |= 1 << cell;
            }
            if byte & (1 << (shift + 1)) != 0 {
                overvoltage |= 1 << cell;
            }
        }

        let flags = RevisionFlags(b[5]);

        DeviceStatus {
            sum_of_cells: u32::from(u16::from_le_bytes([a[0], a[1]])) * 20,
            internal_temp_raw: u16::from_le_bytes([a[2], a[3]]),
            analog_supply: u16::from_le_bytes([a[4], a[5]]),
            digital_supply: u16::from_le_bytes([b[0], b[1]]),
            undervoltage,
            overvoltage,
            revision: flags.rev(),
            mux_fail: flags.muxfail() != 0,
            thermal_shutdown: flags.thsd() != 0,
        }
    }

    /// Die temperature in centidegrees Celsius (7.5 mV/K slope)
    pub fn internal_temp_centi_c(&self) -> i32 {
        i32::from(self.internal_temp_raw) * 4 / 3 - 27300
    }

    /// True when any cell is flagged under- or overvoltage
    pub fn has_voltage_fault(&self) -> bool {
        self.undervoltage != 0 || self.overvoltage != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_status_groups() {
        // SC = 21000 (42 V), ITMP = 23700 (43 C), VA = 50000, VD = 30000
        let a = DeviceRegister::new([0x08, 0x52, 0x94, 0x5C, 0x50, 0xC3]);
        // cell 1 UV, cell 6 OV, cell 12 OV, REV 3, THSD
        let b = DeviceRegister::new([0x30, 0x75, 0x01, 0x08, 0x80, 0x31]);

        let status = DeviceStatus::decode(&a, &b);

        assert_eq!(status.sum_of_cells, 420000);
        assert_eq!(status.internal_temp_raw, 23700);
        assert_eq!(status.internal_temp_centi_c(), 4300);
        assert_eq!(status.analog_supply, 50000);
        assert_eq!(status.digital_supply, 30000);
        assert_eq!(status.undervoltage, 0b0000_0000_0001);
        assert_eq!(status.overvoltage, 0b1000_0010_0000);
        assert_eq!(status.revision, 3);
        assert!(status.thermal_shutdown);
        assert!(!status.mux_fail);
        assert!(status.has_voltage_fault());
    }

    #[test]
    fn test_clean_status() {
        let a = DeviceRegister::new([0; 6]);
        let b = DeviceRegister::new([0; 6]);

        let status = DeviceStatus::decode(&a, &b);

        assert!(!status.has_voltage_fault());
        assert_eq!(status.internal_temp_centi_c(), -27300);
    }
}
