//! Command encoding for the LTC6811 opcode map

use crate::error::{DriverError, Result};
use crate::pec::{pec15, pec15_bytes};
use bitfield::bitfield;

/// Length of every command frame: 2 opcode bytes followed by 2 PEC bytes
pub const COMMAND_LENGTH: usize = 4;

/// A framed LTC6811 command
///
/// Format:
/// - Bytes 0-1: 11-bit opcode, big-endian
/// - Bytes 2-3: PEC15 of bytes 0-1, big-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command([u8; COMMAND_LENGTH]);

impl Command {
    /// Write configuration register group A
    pub const WRCFGA: Command = Command::new(0x0001);
    /// Read configuration register group A
    pub const RDCFGA: Command = Command::new(0x0002);
    /// Read cell voltage register group A
    pub const RDCVA: Command = Command::new(0x0004);
    /// Read cell voltage register group B
    pub const RDCVB: Command = Command::new(0x0006);
    /// Read cell voltage register group C
    pub const RDCVC: Command = Command::new(0x0008);
    /// Read cell voltage register group D
    pub const RDCVD: Command = Command::new(0x000A);
    /// Read auxiliary register group A
    pub const RDAUXA: Command = Command::new(0x000C);
    /// Read auxiliary register group B
    pub const RDAUXB: Command = Command::new(0x000E);
    /// Read status register group A
    pub const RDSTATA: Command = Command::new(0x0010);
    /// Read status register group B
    pub const RDSTATB: Command = Command::new(0x0012);
    /// Clear cell voltage registers
    pub const CLRCELL: Command = Command::new(0x0711);
    /// Clear auxiliary registers
    pub const CLRAUX: Command = Command::new(0x0712);
    /// Clear status registers
    pub const CLRSTAT: Command = Command::new(0x0713);

    /// Frame an opcode, appending its PEC
    pub const fn new(opcode: u16) -> Self {
        let op = opcode.to_be_bytes();
        let pec = pec15_bytes(&op);
        Command([op[0], op[1], pec[0], pec[1]])
    }

    /// Parse a received frame, rejecting a bad PEC
    pub fn from_bytes(bytes: [u8; COMMAND_LENGTH]) -> Result<Self> {
        let received = u16::from_be_bytes([bytes[2], bytes[3]]);
        let expected = pec15(&bytes[..2]);
        if received != expected {
            return Err(DriverError::integrity(format!(
                "command PEC 0x{:04X}, expected 0x{:04X}",
                received, expected
            )));
        }
        Ok(Command(bytes))
    }

    /// The 11-bit opcode
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }

    /// The PEC carried in bytes 2-3
    pub fn pec(&self) -> u16 {
        u16::from_be_bytes([self.0[2], self.0[3]])
    }

    /// Wire representation
    pub fn as_bytes(&self) -> &[u8; COMMAND_LENGTH] {
        &self.0
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Command(0x{:04X}, pec=0x{:04X})", self.opcode(), self.pec())
    }
}

/// Cell voltage register groups, three cells each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellGroup {
    A,
    B,
    C,
    D,
}

impl CellGroup {
    /// Groups in scan order
    pub const ALL: [CellGroup; 4] = [CellGroup::A, CellGroup::B, CellGroup::C, CellGroup::D];

    /// Read command for this group
    pub fn read_command(&self) -> Command {
        match self {
            CellGroup::A => Command::RDCVA,
            CellGroup::B => Command::RDCVB,
            CellGroup::C => Command::RDCVC,
            CellGroup::D => Command::RDCVD,
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

/// Auxiliary register groups: GPIO1-3, then GPIO4-5 and REF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuxGroup {
    A,
    B,
}

impl AuxGroup {
    /// Groups in scan order
    pub const ALL: [AuxGroup; 2] = [AuxGroup::A, AuxGroup::B];

    /// Read command for this group
    pub fn read_command(&self) -> Command {
        match self {
            AuxGroup::A => Command::RDAUXA,
            AuxGroup::B => Command::RDAUXB,
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

/// Status register groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusGroup {
    A,
    B,
}

impl StatusGroup {
    /// Groups in scan order
    pub const ALL: [StatusGroup; 2] = [StatusGroup::A, StatusGroup::B];

    /// Read command for this group
    pub fn read_command(&self) -> Command {
        match self {
            StatusGroup::A => Command::RDSTATA,
            StatusGroup::B => Command::RDSTATB,
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

/// ADC conversion mode (with ADCOPT = 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// 27 kHz
    Fast = 1,
    /// 7 kHz
    #[default]
    Normal = 2,
    /// 26 Hz
    Filtered = 3,
}

impl Mode {
    /// The two MD bits placed in bits 8-7 of a conversion opcode
    pub fn md_bits(&self) -> u8 {
        *self as u8
    }
}

/// Whether discharge transistors stay enabled during cell conversions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DischargePermission {
    /// Discharge is interrupted while measuring
    #[default]
    Disabled = 0,
    /// Discharge stays on while measuring
    Enabled = 1,
}

/// Cell selection for ADCV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellChannels {
    #[default]
    All = 0,
    OneAndSeven,
    TwoAndEight,
    ThreeAndNine,
    FourAndTen,
    FiveAndEleven,
    SixAndTwelve,
}

/// GPIO selection for ADAX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AuxChannels {
    #[default]
    All = 0,
    Gpio1,
    Gpio2,
    Gpio3,
    Gpio4,
    Gpio5,
    Vref2,
}

/// Status selection for ADSTAT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatusChannels {
    #[default]
    All = 0,
    /// Sum of cells
    Soc,
    /// Internal die temperature
    Itmp,
    /// Analog supply
    Va,
    /// Digital supply
    Vd,
}

bitfield! {
    /// Opcode layout shared by ADCV, ADAX and ADSTAT
    ///
    /// - Bits 10-9: command family (01 = ADCV, 10 = ADAX/ADSTAT)
    /// - Bits 8-7: MD
    /// - Bits 6-5: always 11
    /// - Bit 4: DCP (ADCV only)
    /// - Bit 3: set for ADSTAT
    /// - Bits 2-0: channel selection
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct ConversionOpcode(u16);
    impl Debug;
    u8;
    pub md, set_md: 8, 7;
    pub dcp, set_dcp: 4, 4;
    pub ch, set_ch: 2, 0;
}

impl ConversionOpcode {
    const ADCV_BASE: u16 = 0x0260;
    const ADAX_BASE: u16 = 0x0460;
    const ADSTAT_BASE: u16 = 0x0468;

    /// Start cell voltage conversion
    pub fn adcv(mode: Mode, dcp: DischargePermission, cells: CellChannels) -> Self {
        let mut op = ConversionOpcode(Self::ADCV_BASE);
        op.set_md(mode.md_bits());
        op.set_dcp(dcp as u8);
        op.set_ch(cells as u8);
        op
    }

    /// Start GPIO/reference conversion
    pub fn adax(mode: Mode, aux: AuxChannels) -> Self {
        let mut op = ConversionOpcode(Self::ADAX_BASE);
        op.set_md(mode.md_bits());
        op.set_ch(aux as u8);
        op
    }

    /// Start status group conversion
    pub fn adstat(mode: Mode, status: StatusChannels) -> Self {
        let mut op = ConversionOpcode(Self::ADSTAT_BASE);
        op.set_md(mode.md_bits());
        op.set_ch(status as u8);
        op
    }

    /// Frame the opcode as a command
    pub fn command(&self) -> Command {
        Command::new(self.0)
    }
}

/// Options fixing the three conversion commands for the lifetime of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConversionConfig {
    pub mode: Mode,
    pub discharge_permission: DischargePermission,
    pub cell_channels: CellChannels,
    pub aux_channels: AuxChannels,
    pub status_channels: StatusChannels,
}

/// The conversion commands built from a [`ConversionConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionCommands {
    /// Cell voltage conversion
    pub adcv: Command,
    /// Auxiliary conversion
    pub adax: Command,
    /// Status conversion
    pub adstat: Command,
}

impl ConversionCommands {
    /// Encode all three conversion commands
    pub fn new(config: &ConversionConfig) -> Self {
        ConversionCommands {
            adcv: ConversionOpcode::adcv(
                config.mode,
                config.discharge_permission,
                config.cell_channels,
            )
            .command(),
            adax: ConversionOpcode::adax(config.mode, config.aux_channels).command(),
            adstat: ConversionOpcode::adstat(config.mode, config.status_channels).command(),
        }
    }
}

impl From<&ConversionConfig> for ConversionCommands {
    fn from(config: &ConversionConfig) -> Self {
        ConversionCommands::new(config)
    }
}
