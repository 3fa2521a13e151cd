//! The LTC6811 daisy-chain driver
//!
//! One [`Ltc6811`] owns every register group for the chain, sized once at
//! construction. All bus traffic is blocking and strictly sequential; the
//! caller serializes access to the driver.

use crate::balance::{
    apply_discharge_masks, discharge_masks, DischargeMasks, DischargeMode,
    DEFAULT_DISCHARGE_DELTA,
};
use crate::chain::DAISY_CHAIN_LENGTH;
use crate::command::{
    AuxChannels, AuxGroup, CellChannels, CellGroup, Command, ConversionCommands,
    ConversionConfig, DischargePermission, Mode, StatusChannels, StatusGroup, COMMAND_LENGTH,
};
use crate::error::{DriverError, Result};
use crate::register::{
    ConfigRegister, Element, RegisterGroup, DEFAULT_CONFIG_PAYLOAD, GROUP_PAYLOAD_LENGTH,
};
use crate::status::DeviceStatus;
use crate::summary::{summarize_temperatures, summarize_voltages, TempStatus, VoltageStatus};
use crate::timing::{self, CONFIG_SETTLE_US, CONVERSION_WAIT_US};
use crate::transport::{with_select, Transport};
use embedded_hal::delay::DelayNs;
use tracing::{debug, trace, warn};

/// Driver for a chain of [`DAISY_CHAIN_LENGTH`] LTC6811 monitors
pub struct Ltc6811<P, D> {
    port: P,
    delay: D,
    commands: ConversionCommands,
    discharge_mode: DischargeMode,
    discharge_delta: u16,
    config_tx: RegisterGroup<u8>,
    config_rx: RegisterGroup<u8>,
    cell_data: [RegisterGroup<u16>; 4],
    aux_data: [RegisterGroup<u16>; 2],
    status_data: [RegisterGroup<u8>; 2],
}

impl<P, D> Ltc6811<P, D>
where
    P: Transport,
    D: DelayNs,
{
    /// Create a driver; no bus traffic happens until the first call.
    ///
    /// The conversion commands are fixed here. Changing mode or channel
    /// selection means building a new driver.
    pub fn new(port: P, delay: D, config: ConversionConfig) -> Self {
        let commands = ConversionCommands::new(&config);
        debug!(
            adcv = %commands.adcv,
            adax = %commands.adax,
            adstat = %commands.adstat,
            "LTC6811 chain driver created"
        );

        Ltc6811 {
            port,
            delay,
            commands,
            discharge_mode: DischargeMode::default(),
            discharge_delta: DEFAULT_DISCHARGE_DELTA,
            config_tx: RegisterGroup::filled(Command::WRCFGA, DEFAULT_CONFIG_PAYLOAD),
            config_rx: RegisterGroup::new(Command::RDCFGA),
            cell_data: CellGroup::ALL.map(|g| RegisterGroup::new(g.read_command())),
            aux_data: AuxGroup::ALL.map(|g| RegisterGroup::new(g.read_command())),
            status_data: StatusGroup::ALL.map(|g| RegisterGroup::new(g.read_command())),
        }
    }

    /// Bring every device out of Sleep
    pub fn wake_from_sleep(&mut self) -> Result<()> {
        timing::wake_from_sleep(&mut self.port, &mut self.delay)
    }

    /// Bring every isoSPI port to Ready
    pub fn wake_from_idle(&mut self) -> Result<()> {
        timing::wake_from_idle(&mut self.port)
    }

    /// Read one cell voltage register group from the whole chain
    pub fn read_voltage_group(&mut self, group: CellGroup) -> Result<()> {
        read_register_group(&mut self.port, &mut self.cell_data[group.index()])
    }

    /// Read one auxiliary register group from the whole chain
    pub fn read_aux_group(&mut self, group: AuxGroup) -> Result<()> {
        read_register_group(&mut self.port, &mut self.aux_data[group.index()])
    }

    /// Read one status register group from the whole chain
    pub fn read_status_group(&mut self, group: StatusGroup) -> Result<()> {
        read_register_group(&mut self.port, &mut self.status_data[group.index()])
    }

    /// Read the configuration register group back from the chain
    pub fn read_config_group(&mut self) -> Result<()> {
        read_register_group(&mut self.port, &mut self.config_rx)
    }

    /// Write the pending configuration to the chain
    pub fn write_config_group(&mut self) -> Result<()> {
        write_register_group(&mut self.port, &self.config_tx)
    }

    /// Reset all cell voltage registers to 0xFFFF
    pub fn clear_voltage_registers(&mut self) -> Result<()> {
        send_command(&mut self.port, Command::CLRCELL)
    }

    /// Reset all auxiliary registers to 0xFFFF
    pub fn clear_aux_registers(&mut self) -> Result<()> {
        send_command(&mut self.port, Command::CLRAUX)
    }

    /// Reset all status registers
    pub fn clear_status_registers(&mut self) -> Result<()> {
        send_command(&mut self.port, Command::CLRSTAT)
    }

    /// Convert and read every cell, then reduce to a chain-wide summary.
    ///
    /// Any failed group read fails the whole summary.
    pub fn get_voltage_status(&mut self) -> Result<VoltageStatus> {
        self.start_conversion(self.commands.adcv)?;
        for group in CellGroup::ALL {
            self.read_voltage_group(group)?;
        }

        let status = summarize_voltages(&self.cell_data);
        debug!(
            min = status.min,
            min_id = status.min_id,
            max = status.max,
            max_id = status.max_id,
            "voltage status"
        );
        Ok(status)
    }

    /// Convert and read the auxiliary inputs, then reduce to temperatures.
    pub fn get_temperature_status(&mut self) -> Result<TempStatus> {
        self.start_conversion(self.commands.adax)?;
        for group in AuxGroup::ALL {
            self.read_aux_group(group)?;
        }

        let status = summarize_temperatures(&self.aux_data);
        debug!(
            min = status.min,
            min_id = status.min_id,
            max = status.max,
            max_id = status.max_id,
            "temperature status"
        );
        Ok(status)
    }

    /// Convert and read both status groups, decoded per chain position
    pub fn get_device_status(&mut self) -> Result<[DeviceStatus; DAISY_CHAIN_LENGTH]> {
        self.start_conversion(self.commands.adstat)?;
        for group in StatusGroup::ALL {
            self.read_status_group(group)?;
        }

        let [group_a, group_b] = &self.status_data;
        Ok(std::array::from_fn(|position| {
            DeviceStatus::decode(&group_a.registers()[position], &group_b.registers()[position])
        }))
    }

    /// Balance using the configured [`DischargeMode`]
    pub fn build_discharge_config(&mut self, status: &VoltageStatus) -> Result<DischargeMasks> {
        self.build_discharge_config_with(self.discharge_mode, status)
    }

    /// Decide discharge bits from `status` and the last cell readings,
    /// write them to the chain and confirm them by reading back.
    pub fn build_discharge_config_with(
        &mut self,
        mode: DischargeMode,
        status: &VoltageStatus,
    ) -> Result<DischargeMasks> {
        let masks = discharge_masks(mode, self.discharge_delta, status, &self.cell_data)?;
        debug!(
            %mode,
            delta = self.discharge_delta,
            cells = masks.iter().map(|m| m.count_ones()).sum::<u32>(),
            "discharge decision"
        );

        apply_discharge_masks(&mut self.config_tx, &masks);
        self.write_config_group()?;
        self.delay.delay_us(CONFIG_SETTLE_US);
        self.read_config_group()?;
        self.verify_discharge_config()?;

        Ok(masks)
    }

    fn verify_discharge_config(&self) -> Result<()> {
        let written = self.config_tx.registers().iter();
        let read = self.config_rx.registers().iter();

        for (position, (tx, rx)) in written.zip(read).enumerate() {
            if tx.discharge_mask() != rx.discharge_mask() {
                warn!(
                    position,
                    written = tx.discharge_mask(),
                    read = rx.discharge_mask(),
                    "discharge configuration not applied"
                );
                return Err(DriverError::config_mismatch(format!(
                    "chain position {} reports DCC 0x{:03X}, wrote 0x{:03X}",
                    position,
                    rx.discharge_mask(),
                    tx.discharge_mask()
                )));
            }
        }

        Ok(())
    }

    /// Select the balancing policy used by [`Ltc6811::build_discharge_config`]
    pub fn set_discharge_mode(&mut self, mode: DischargeMode) {
        self.discharge_mode = mode;
    }

    /// Current balancing policy
    pub fn discharge_mode(&self) -> DischargeMode {
        self.discharge_mode
    }

    /// Balancing threshold in raw 100 µV counts
    pub fn discharge_delta(&self) -> u16 {
        self.discharge_delta
    }

    /// Raw cell voltage groups A-D from the last read
    pub fn cell_data(&self) -> &[RegisterGroup<u16>; 4] {
        &self.cell_data
    }

    /// Raw auxiliary groups A-B from the last read
    pub fn aux_data(&self) -> &[RegisterGroup<u16>; 2] {
        &self.aux_data
    }

    /// Raw status groups A-B from the last read
    pub fn status_data(&self) -> &[RegisterGroup<u8>; 2] {
        &self.status_data
    }

    /// Configuration that the next write sends
    pub fn config(&self) -> &RegisterGroup<u8> {
        &self.config_tx
    }

    /// Configuration as last read back from the chain
    pub fn config_readback(&self) -> &RegisterGroup<u8> {
        &self.config_rx
    }

    /// The conversion commands fixed at construction
    pub fn commands(&self) -> &ConversionCommands {
        &self.commands
    }

    /// The underlying transport
    pub fn transport(&self) -> &P {
        &self.port
    }

    /// Consume the driver, returning the transport and delay
    pub fn free(self) -> (P, D) {
        (self.port, self.delay)
    }

    /// Start a conversion and wait out the worst-case conversion time.
    ///
    /// Completion is not polled; the wait is sized for reference power-up
    /// plus a full fast-mode cycle and is applied for every mode.
    fn start_conversion(&mut self, command: Command) -> Result<()> {
        send_command(&mut self.port, command)?;
        self.delay.delay_us(CONVERSION_WAIT_US);
        Ok(())
    }
}

/// Wake the chain and send a command with no payload
fn send_command<P: Transport>(port: &mut P, command: Command) -> Result<()> {
    timing::wake_from_idle(port)?;
    trace!(%command, "send");

    with_select(port, |port| port.transmit(command.as_bytes())).map_err(|err| {
        warn!(%command, error = %err, "command failed");
        err
    })
}

/// Send a group's command followed by every device's record
fn write_register_group<P, T>(port: &mut P, group: &RegisterGroup<T>) -> Result<()>
where
    P: Transport,
    T: Element,
{
    timing::wake_from_idle(port)?;

    let command = group.command();
    let payload = group.encode_for_write();
    trace!(%command, len = COMMAND_LENGTH + payload.len(), "write group");

    with_select(port, |port| {
        port.transmit(command.as_bytes())?;
        port.transmit(&payload)
    })
    .map_err(|err| {
        warn!(%command, error = %err, "register group write failed");
        err
    })
}

/// Send a group's read command and check every returned record's PEC
fn read_register_group<P, T>(port: &mut P, group: &mut RegisterGroup<T>) -> Result<()>
where
    P: Transport,
    T: Element,
{
    timing::wake_from_idle(port)?;

    let command = group.command();
    let mut payload = [0u8; GROUP_PAYLOAD_LENGTH];
    trace!(%command, "read group");

    with_select(port, |port| {
        port.transmit(command.as_bytes())?;
        port.receive(&mut payload)
    })
    .and_then(|()| group.decode_from_read(&payload))
    .map_err(|err| {
        warn!(%command, error = %err, "register group read failed");
        err
    })
}

/// Builder for [`Ltc6811`]
#[derive(Debug, Clone, Default)]
pub struct Ltc6811Builder {
    config: ConversionConfig,
    discharge_mode: DischargeMode,
    discharge_delta: Option<u16>,
}

impl Ltc6811Builder {
    /// Start from Normal mode, discharge disabled during conversion and
    /// all channels selected
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn with_config(mut self, config: ConversionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the ADC mode
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Keep discharge running during cell conversions
    pub fn with_discharge_permission(mut self, dcp: DischargePermission) -> Self {
        self.config.discharge_permission = dcp;
        self
    }

    /// Cells measured by ADCV
    pub fn with_cell_channels(mut self, cells: CellChannels) -> Self {
        self.config.cell_channels = cells;
        self
    }

    /// GPIOs measured by ADAX
    pub fn with_aux_channels(mut self, aux: AuxChannels) -> Self {
        self.config.aux_channels = aux;
        self
    }

    /// Status values measured by ADSTAT
    pub fn with_status_channels(mut self, status: StatusChannels) -> Self {
        self.config.status_channels = status;
        self
    }

    /// Initial balancing policy
    pub fn with_discharge_mode(mut self, mode: DischargeMode) -> Self {
        self.discharge_mode = mode;
        self
    }

    /// Balancing threshold in raw 100 µV counts
    pub fn with_discharge_delta(mut self, delta: u16) -> Self {
        self.discharge_delta = Some(delta);
        self
    }

    /// Build the driver around `port` and `delay`
    pub fn build<P: Transport, D: DelayNs>(self, port: P, delay: D) -> Ltc6811<P, D> {
        let mut driver = Ltc6811::new(port, delay, self.config);
        driver.discharge_mode = self.discharge_mode;
        driver.discharge_delta = self.discharge_delta.unwrap_or(DEFAULT_DISCHARGE_DELTA);
        driver
    }
}
