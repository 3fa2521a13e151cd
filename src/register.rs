//! Register groups shared by read and write transactions across the daisy chain

use crate::chain::{BYTES_PER_REGISTER, CELLS_PER_DEVICE, DAISY_CHAIN_LENGTH, PAYLOAD_BYTES};
use crate::command::Command;
use crate::error::{DriverError, Result};
use crate::pec::pec15;
use bitfield::bitfield;
use std::marker::PhantomData;

/// Number of bytes in one register group transaction payload
pub const GROUP_PAYLOAD_LENGTH: usize = BYTES_PER_REGISTER * DAISY_CHAIN_LENGTH;

/// Logical element stored in a register payload
///
/// Multi-byte elements are little-endian on the wire.
pub trait Element: Copy + std::fmt::Debug + 'static {
    /// Width in bytes; divides the 6-byte payload evenly
    const WIDTH: usize;

    /// Decode one element from exactly `WIDTH` bytes
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Encode into exactly `WIDTH` bytes
    fn write_le(self, out: &mut [u8]);
}

impl Element for u8 {
    const WIDTH: usize = 1;

    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn write_le(self, out: &mut [u8]) {
        out[0] = self;
    }
}

impl Element for u16 {
    const WIDTH: usize = 2;

    fn from_le_slice(bytes: &[u8]) -> Self {
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn write_le(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }
}

impl Element for i16 {
    const WIDTH: usize = 2;

    fn from_le_slice(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn write_le(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }
}

/// One device's record in a register group
///
/// Format (8 bytes):
/// - Bytes 0-5: payload
/// - Bytes 6-7: PEC15 of the payload, big-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceRegister {
    pub data: [u8; PAYLOAD_BYTES],
    pub pec: u16,
}

impl DeviceRegister {
    /// Build a record with a freshly computed PEC
    pub fn new(data: [u8; PAYLOAD_BYTES]) -> Self {
        DeviceRegister {
            data,
            pec: pec15(&data),
        }
    }

    /// Decode a record as received; the PEC is not checked here
    pub fn decode(bytes: &[u8; BYTES_PER_REGISTER]) -> Self {
        let mut data = [0u8; PAYLOAD_BYTES];
        data.copy_from_slice(&bytes[..PAYLOAD_BYTES]);
        DeviceRegister {
            data,
            pec: u16::from_be_bytes([bytes[6], bytes[7]]),
        }
    }

    /// Wire representation
    pub fn encode(&self) -> [u8; BYTES_PER_REGISTER] {
        let mut out = [0u8; BYTES_PER_REGISTER];
        out[..PAYLOAD_BYTES].copy_from_slice(&self.data);
        out[PAYLOAD_BYTES..].copy_from_slice(&self.pec.to_be_bytes());
        out
    }

    /// Recompute the PEC after the payload was edited
    pub fn refresh_pec(&mut self) {
        self.pec = pec15(&self.data);
    }

    /// Check the stored PEC against the payload
    pub fn is_valid(&self) -> bool {
        self.pec == pec15(&self.data)
    }

    /// Payload as a sequence of elements
    pub fn values<T: Element>(&self) -> impl Iterator<Item = T> + '_ {
        self.data.chunks_exact(T::WIDTH).map(T::from_le_slice)
    }

    /// Overwrite the payload from elements and refresh the PEC
    pub fn set_values<T: Element>(&mut self, values: &[T]) {
        for (chunk, value) in self.data.chunks_exact_mut(T::WIDTH).zip(values) {
            value.write_le(chunk);
        }
        self.refresh_pec();
    }
}

/// One register group: the command that addresses it and one record per chain position
///
/// Index 0 is the device closest to the host. Reads arrive in index order;
/// writes are shifted through the chain, so the record for the farthest
/// device goes out first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterGroup<T: Element> {
    command: Command,
    registers: [DeviceRegister; DAISY_CHAIN_LENGTH],
    _element: PhantomData<T>,
}

impl<T: Element> RegisterGroup<T> {
    /// Create a zeroed group addressed by `command`
    pub fn new(command: Command) -> Self {
        RegisterGroup {
            command,
            registers: [DeviceRegister::default(); DAISY_CHAIN_LENGTH],
            _element: PhantomData,
        }
    }

    /// Create a group where every position holds `data`
    pub fn filled(command: Command, data: [u8; PAYLOAD_BYTES]) -> Self {
        RegisterGroup {
            command,
            registers: [DeviceRegister::new(data); DAISY_CHAIN_LENGTH],
            _element: PhantomData,
        }
    }

    /// The command addressing this group
    pub fn command(&self) -> Command {
        self.command
    }

    /// All records in chain order
    pub fn registers(&self) -> &[DeviceRegister; DAISY_CHAIN_LENGTH] {
        &self.registers
    }

    /// Mutable access to all records
    pub fn registers_mut(&mut self) -> &mut [DeviceRegister; DAISY_CHAIN_LENGTH] {
        &mut self.registers
    }

    /// Elements held by the device at `position`
    pub fn values(&self, position: usize) -> impl Iterator<Item = T> + '_ {
        self.registers[position].values::<T>()
    }

    /// Every element of the group in scan order (position, then channel)
    pub fn iter_values(&self) -> impl Iterator<Item = T> + '_ {
        self.registers.iter().flat_map(|r| r.values::<T>())
    }

    /// Serialize for a write transaction: farthest device first
    pub fn encode_for_write(&self) -> [u8; GROUP_PAYLOAD_LENGTH] {
        let mut out = [0u8; GROUP_PAYLOAD_LENGTH];
        for (chunk, register) in out
            .chunks_exact_mut(BYTES_PER_REGISTER)
            .zip(self.registers.iter().rev())
        {
            chunk.copy_from_slice(&register.encode());
        }
        out
    }

    /// Replace the records with a received payload, closest device first.
    ///
    /// Fails if any record's PEC does not match its payload, in which case
    /// no record is replaced.
    pub fn decode_from_read(&mut self, payload: &[u8; GROUP_PAYLOAD_LENGTH]) -> Result<()> {
        let mut received = [DeviceRegister::default(); DAISY_CHAIN_LENGTH];

        for (position, (register, chunk)) in received
            .iter_mut()
            .zip(payload.chunks_exact(BYTES_PER_REGISTER))
            .enumerate()
        {
            let mut record = [0u8; BYTES_PER_REGISTER];
            record.copy_from_slice(chunk);
            *register = DeviceRegister::decode(&record);

            if !register.is_valid() {
                return Err(DriverError::integrity(format!(
                    "{} PEC mismatch at chain position {}",
                    self.command, position
                )));
            }
        }

        self.registers = received;
        Ok(())
    }
}

bitfield! {
    /// CFGR0: GPIO pull-down control and reference/ADC options
    ///
    /// - Bits 7-3: GPIO5..GPIO1 (1 = pull-down off)
    /// - Bit 2: REFON
    /// - Bit 1: DTEN (read only)
    /// - Bit 0: ADCOPT
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct ConfigFlags(u8);
    impl Debug;
    u8;
    pub gpio, set_gpio: 7, 3;
    pub refon, set_refon: 2, 2;
    pub dten, set_dten: 1, 1;
    pub adcopt, set_adcopt: 0, 0;
}

impl ConfigFlags {
    /// Pull-downs off, reference on, discharge timer enabled
    pub const POWER_ON: ConfigFlags = ConfigFlags(0xFE);

    /// Raw byte value
    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl Default for ConfigFlags {
    fn default() -> Self {
        ConfigFlags::POWER_ON
    }
}

/// Default configuration payload written to every device
pub const DEFAULT_CONFIG_PAYLOAD: [u8; PAYLOAD_BYTES] = [0xFE, 0, 0, 0, 0, 0];

/// Mask covering the 12 discharge-control bits of one device
pub const DISCHARGE_MASK: u16 = (1 << CELLS_PER_DEVICE) - 1;

/// Configuration payload view of a [`DeviceRegister`]
///
/// DCC1..DCC8 live in CFGR4; DCC9..DCC12 in the low nibble of CFGR5 (the
/// high nibble holds the discharge timeout and is left untouched).
pub trait ConfigRegister {
    /// CFGR0 flags
    fn flags(&self) -> ConfigFlags;

    /// The 12 discharge-enable bits, cell 1 in bit 0
    fn discharge_mask(&self) -> u16;

    /// Replace the discharge bits and refresh the PEC
    fn set_discharge_mask(&mut self, mask: u16);
}

impl ConfigRegister for DeviceRegister {
    fn flags(&self) -> ConfigFlags {
        ConfigFlags(self.data[0])
    }

    fn discharge_mask(&self) -> u16 {
        u16::from(self.data[4]) | (u16::from(self.data[5] & 0x0F) << 8)
    }

    fn set_discharge_mask(&mut self, mask: u16) {
        let mask = mask & DISCHARGE_MASK;
        self.data[4] = (mask & 0xFF) as u8;
        self.data[5] = (self.data[5] & 0xF0) | ((mask >> 8) as u8 & 0x0F);
        self.refresh_pec();
    }
}
