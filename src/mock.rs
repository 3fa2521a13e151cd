//! Simulated daisy chain used by the unit tests

use crate::chain::{
    BYTES_PER_REGISTER, CELLS_PER_DEVICE, DAISY_CHAIN_LENGTH, PAYLOAD_BYTES,
};
use crate::command::{Command, COMMAND_LENGTH};
use crate::register::{DeviceRegister, DEFAULT_CONFIG_PAYLOAD};
use crate::transport::Transport;
use embedded_hal::delay::DelayNs;

/// Auxiliary inputs per device: GPIO1-5 and the second reference
pub const AUX_PER_DEVICE: usize = 6;
/// Status register bytes per device across groups A and B
pub const STATUS_BYTES_PER_DEVICE: usize = 12;

/// Value the device reports for a cleared register
const CLEARED: u16 = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Select,
    Release,
    Transmit(Vec<u8>),
    Receive(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    Transmit,
    Receive,
}

/// Twelve LTC6811s behind one chip select
///
/// Analog inputs are latched into the result registers only when the
/// matching conversion command arrives, so reading before converting
/// returns cleared registers.
pub struct ChainSim {
    pub cell_inputs: [[u16; CELLS_PER_DEVICE]; DAISY_CHAIN_LENGTH],
    pub aux_inputs: [[u16; AUX_PER_DEVICE]; DAISY_CHAIN_LENGTH],
    pub status_inputs: [[u8; STATUS_BYTES_PER_DEVICE]; DAISY_CHAIN_LENGTH],
    pub config: [[u8; PAYLOAD_BYTES]; DAISY_CHAIN_LENGTH],
    cell_registers: [[u16; CELLS_PER_DEVICE]; DAISY_CHAIN_LENGTH],
    aux_registers: [[u16; AUX_PER_DEVICE]; DAISY_CHAIN_LENGTH],
    status_registers: [[u8; STATUS_BYTES_PER_DEVICE]; DAISY_CHAIN_LENGTH],
    events: Vec<BusEvent>,
    frames: Vec<Vec<u8>>,
    frame: Vec<u8>,
    transmits_before_failure: Option<usize>,
    fail_receive: bool,
    corrupt_next_read: Option<usize>,
    ignore_writes: bool,
    pub conversions: Vec<Command>,
}

impl ChainSim {
    pub fn new() -> Self {
        ChainSim {
            cell_inputs: [[0; CELLS_PER_DEVICE]; DAISY_CHAIN_LENGTH],
            aux_inputs: [[0; AUX_PER_DEVICE]; DAISY_CHAIN_LENGTH],
            status_inputs: [[0; STATUS_BYTES_PER_DEVICE]; DAISY_CHAIN_LENGTH],
            config: [DEFAULT_CONFIG_PAYLOAD; DAISY_CHAIN_LENGTH],
            cell_registers: [[CLEARED; CELLS_PER_DEVICE]; DAISY_CHAIN_LENGTH],
            aux_registers: [[CLEARED; AUX_PER_DEVICE]; DAISY_CHAIN_LENGTH],
            status_registers: [[0xFF; STATUS_BYTES_PER_DEVICE]; DAISY_CHAIN_LENGTH],
            events: Vec::new(),
            frames: Vec::new(),
            frame: Vec::new(),
            transmits_before_failure: None,
            fail_receive: false,
            corrupt_next_read: None,
            ignore_writes: false,
            conversions: Vec::new(),
        }
    }

    /// Chain whose cell inputs are all distinct: 30000 + flat scan index
    pub fn with_distinct_cells() -> Self {
        let mut sim = ChainSim::new();
        for position in 0..DAISY_CHAIN_LENGTH {
            for cell in 0..CELLS_PER_DEVICE {
                let index = (cell / 3) * 36 + position * 3 + cell % 3;
                sim.cell_inputs[position][cell] = 30000 + index as u16;
            }
        }
        sim
    }

    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }

    /// Bytes transmitted under each completed select
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Completed frames that carried a command, wake-up bytes excluded
    pub fn commands(&self) -> Vec<Command> {
        self.frames
            .iter()
            .filter(|frame| frame.len() >= COMMAND_LENGTH)
            .filter_map(|frame| parse_command(frame))
            .collect()
    }

    pub fn fail_transmit_after(&mut self, transmits: usize) {
        self.transmits_before_failure = Some(transmits);
    }

    pub fn fail_receive(&mut self) {
        self.fail_receive = true;
    }

    /// Flip one bit of the next read response at `byte`
    pub fn corrupt_next_read(&mut self, byte: usize) {
        self.corrupt_next_read = Some(byte);
    }

    /// Accept but discard configuration writes
    pub fn ignore_writes(&mut self) {
        self.ignore_writes = true;
    }

    fn read_response(&self, command: Command) -> Vec<u8> {
        let opcode = command.opcode();
        let mut out = Vec::with_capacity(BYTES_PER_REGISTER * DAISY_CHAIN_LENGTH);

        for position in 0..DAISY_CHAIN_LENGTH {
            let data = match opcode {
                0x0002 => self.config[position],
                0x0004..=0x000A => {
                    let group = usize::from(opcode - 0x0004) / 2;
                    words(&self.cell_registers[position][group * 3..group * 3 + 3])
                }
                0x000C | 0x000E => {
                    let group = usize::from(opcode - 0x000C) / 2;
                    words(&self.aux_registers[position][group * 3..group * 3 + 3])
                }
                0x0010 | 0x0012 => {
                    let group = usize::from(opcode - 0x0010) / 2;
                    let mut data = [0u8; PAYLOAD_BYTES];
                    data.copy_from_slice(
                        &self.status_registers[position][group * 6..group * 6 + 6],
                    );
                    data
                }
                _ => return vec![0xFF; BYTES_PER_REGISTER * DAISY_CHAIN_LENGTH],
            };
            out.extend_from_slice(&DeviceRegister::new(data).encode());
        }

        out
    }

    fn execute(&mut self, frame: &[u8]) {
        let Some(command) = parse_command(frame) else {
            return;
        };
        let opcode = command.opcode();

        match opcode {
            0x0001 => self.write_config(&frame[COMMAND_LENGTH..]),
            0x0711 => self.cell_registers = [[CLEARED; CELLS_PER_DEVICE]; DAISY_CHAIN_LENGTH],
            0x0712 => self.aux_registers = [[CLEARED; AUX_PER_DEVICE]; DAISY_CHAIN_LENGTH],
            0x0713 => {
                self.status_registers = [[0xFF; STATUS_BYTES_PER_DEVICE]; DAISY_CHAIN_LENGTH]
            }
            op if op & 0x0668 == 0x0260 => {
                self.cell_registers = self.cell_inputs;
                self.conversions.push(command);
            }
            op if op & 0x0678 == 0x0460 => {
                self.aux_registers = self.aux_inputs;
                self.conversions.push(command);
            }
            op if op & 0x0678 == 0x0468 => {
                self.status_registers = self.status_inputs;
                self.conversions.push(command);
            }
            _ => {}
        }
    }

    fn write_config(&mut self, payload: &[u8]) {
        if self.ignore_writes || payload.len() != BYTES_PER_REGISTER * DAISY_CHAIN_LENGTH {
            return;
        }

        // First record shifts all the way to the far end of the chain
        for (k, chunk) in payload.chunks_exact(BYTES_PER_REGISTER).enumerate() {
            let mut record = [0u8; BYTES_PER_REGISTER];
            record.copy_from_slice(chunk);
            let register = DeviceRegister::decode(&record);
            if register.is_valid() {
                self.config[DAISY_CHAIN_LENGTH - 1 - k] = register.data;
            }
        }
    }
}

fn parse_command(frame: &[u8]) -> Option<Command> {
    let bytes: [u8; COMMAND_LENGTH] = frame.get(..COMMAND_LENGTH)?.try_into().ok()?;
    Command::from_bytes(bytes).ok()
}

fn words(values: &[u16]) -> [u8; PAYLOAD_BYTES] {
    let mut data = [0u8; PAYLOAD_BYTES];
    for (chunk, value) in data.chunks_exact_mut(2).zip(values) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    data
}

impl Transport for ChainSim {
    type Error = SimError;

    fn select(&mut self, active: bool) -> Result<(), SimError> {
        if active {
            self.events.push(BusEvent::Select);
            self.frame.clear();
        } else {
            self.events.push(BusEvent::Release);
            let frame = std::mem::take(&mut self.frame);
            self.execute(&frame);
            self.frames.push(frame);
        }
        Ok(())
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<(), SimError> {
        match self.transmits_before_failure {
            Some(0) => return Err(SimError::Transmit),
            Some(ref mut remaining) => *remaining -= 1,
            None => {}
        }
        self.events.push(BusEvent::Transmit(bytes.to_vec()));
        self.frame.extend_from_slice(bytes);
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<(), SimError> {
        if self.fail_receive {
            return Err(SimError::Receive);
        }
        self.events.push(BusEvent::Receive(buffer.len()));

        let mut response = match parse_command(&self.frame) {
            Some(command) => self.read_response(command),
            None => vec![0xFF; buffer.len()],
        };
        if let Some(byte) = self.corrupt_next_read.take() {
            response[byte] ^= 0x01;
        }
        buffer.copy_from_slice(&response[..buffer.len()]);
        Ok(())
    }
}

/// [`DelayNs`] that only adds up the requested time
#[derive(Debug, Default)]
pub struct RecordingDelay {
    total_ns: u64,
}

impl RecordingDelay {
    pub fn total_us(&self) -> u64 {
        self.total_ns / 1000
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}
