//! Register-level model of the panel's bus: a PCF8574, an AP3216C and an
//! SSD1306 answering at their configured addresses.
//!
//! Used by the host binary in place of real hardware, and by tests to
//! observe every transaction and to inject bus faults.

use crate::bus::BusTransport;
use crate::devices::{ap3216c, pcf8574, ssd1306};
use crate::error::BusError;
use crate::reading::SensorReading;
use heapless::{HistoryBuffer, Vec as BoundedVec};
use tracing::trace;

const SENSOR_REGISTERS: usize = 0x20;

/// Transactions kept in the log; older ones are overwritten.
pub const TRANSACTION_LOG_DEPTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Write { register: u8, len: usize },
    Read { register: u8, len: usize },
    Receive { len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub address: u8,
    pub kind: TransactionKind,
    pub ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addresses {
    pub expander: u8,
    pub sensor: u8,
    pub display: u8,
}

impl Default for Addresses {
    fn default() -> Self {
        Self {
            expander: pcf8574::DEFAULT_ADDRESS,
            sensor: ap3216c::DEFAULT_ADDRESS,
            display: ssd1306::DEFAULT_ADDRESS,
        }
    }
}

/// What the simulated sensor sees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightSource {
    Fixed(SensorReading),
    /// Slowly drifting light, advanced once per conversion.
    Drifting { tick: u16 },
}

impl LightSource {
    fn sample(&mut self) -> SensorReading {
        match self {
            LightSource::Fixed(reading) => *reading,
            LightSource::Drifting { tick } => {
                *tick = tick.wrapping_add(1);
                let t = f32::from(*tick);
                let ir = 140.0 + 120.0 * (t * 0.21).sin();
                let als = 1800.0 + 1650.0 * (t * 0.05).sin();
                let ps = 320.0 + 300.0 * (t * 0.13).sin().abs();
                SensorReading::new(ir as u16, als as u16, ps as u16)
            }
        }
    }
}

/// Inverse of the AP3216C channel decoding, clamped to each channel's width.
pub fn encode_sensor_data(reading: SensorReading) -> [u8; 6] {
    let ir = reading.ir.min(ap3216c::IR_MAX);
    let ps = reading.ps.min(ap3216c::PS_MAX);
    let [als_lo, als_hi] = reading.als.to_le_bytes();
    [
        (ir & 0x03) as u8,
        (ir >> 2) as u8,
        als_lo,
        als_hi,
        (ps & 0x0F) as u8,
        ((ps >> 4) & 0x3F) as u8,
    ]
}

#[derive(Debug)]
struct DisplayModel {
    ram: [u8; ssd1306::RAM_SIZE],
    on: bool,
    col_start: usize,
    col_end: usize,
    page_start: usize,
    page_end: usize,
    col: usize,
    page: usize,
    pending: Option<u8>,
    args: BoundedVec<u8, 2>,
}

impl DisplayModel {
    fn new() -> Self {
        Self {
            ram: [0; ssd1306::RAM_SIZE],
            on: false,
            col_start: 0,
            col_end: ssd1306::WIDTH - 1,
            page_start: 0,
            page_end: ssd1306::PAGES - 1,
            col: 0,
            page: 0,
            pending: None,
            args: BoundedVec::new(),
        }
    }

    fn arg_count(command: u8) -> usize {
        match command {
            ssd1306::CMD_COLUMN_ADDRESS | ssd1306::CMD_PAGE_ADDRESS => 2,
            ssd1306::CMD_MEMORY_MODE
            | ssd1306::CMD_SET_CONTRAST
            | ssd1306::CMD_CHARGE_PUMP
            | ssd1306::CMD_MULTIPLEX
            | ssd1306::CMD_DISPLAY_OFFSET
            | ssd1306::CMD_CLOCK_DIV
            | ssd1306::CMD_PRECHARGE
            | ssd1306::CMD_COM_PINS
            | ssd1306::CMD_VCOM_DETECT => 1,
            _ => 0,
        }
    }

    fn command_byte(&mut self, byte: u8) {
        let Some(command) = self.pending else {
            if Self::arg_count(byte) == 0 {
                self.apply(byte, &[]);
            } else {
                self.pending = Some(byte);
                self.args.clear();
            }
            return;
        };

        // Capacity is the largest argument count.
        let _ = self.args.push(byte);
        if self.args.len() == Self::arg_count(command) {
            let args = self.args.clone();
            self.pending = None;
            self.apply(command, &args);
        }
    }

    fn apply(&mut self, command: u8, args: &[u8]) {
        match (command, args) {
            (ssd1306::CMD_DISPLAY_OFF, _) => self.on = false,
            (ssd1306::CMD_DISPLAY_ON, _) => self.on = true,
            (ssd1306::CMD_COLUMN_ADDRESS, &[start, end]) => {
                self.col_start = usize::from(start) % ssd1306::WIDTH;
                self.col_end = usize::from(end) % ssd1306::WIDTH;
                self.col = self.col_start;
            }
            (ssd1306::CMD_PAGE_ADDRESS, &[start, end]) => {
                self.page_start = usize::from(start) % ssd1306::PAGES;
                self.page_end = usize::from(end) % ssd1306::PAGES;
                self.page = self.page_start;
            }
            _ => {}
        }
    }

    fn data_byte(&mut self, byte: u8) {
        self.ram[self.page * ssd1306::WIDTH + self.col] = byte;
        if self.col >= self.col_end {
            self.col = self.col_start;
            self.page = if self.page >= self.page_end {
                self.page_start
            } else {
                self.page + 1
            };
        } else {
            self.col += 1;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ReadFault {
    address: u8,
    remaining: u32,
}

#[derive(Debug, Clone, Copy)]
struct PeriodicFault {
    address: u8,
    every: u32,
    seen: u32,
}

#[derive(Debug)]
pub struct SimulatedBus {
    addresses: Addresses,
    expander_latch: u8,
    expander_inputs: u8,
    sensor_registers: [u8; SENSOR_REGISTERS],
    light: LightSource,
    display: DisplayModel,
    log: HistoryBuffer<Transaction, TRANSACTION_LOG_DEPTH>,
    total_transactions: u64,
    nacked: Vec<u8>,
    read_faults: Vec<ReadFault>,
    periodic_fault: Option<PeriodicFault>,
    busy_polls: u32,
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::with_addresses(Addresses::default())
    }

    pub fn with_addresses(addresses: Addresses) -> Self {
        Self {
            addresses,
            expander_latch: 0xFF,
            expander_inputs: 0xFF,
            sensor_registers: [0; SENSOR_REGISTERS],
            light: LightSource::Fixed(SensorReading::default()),
            display: DisplayModel::new(),
            log: HistoryBuffer::new(),
            total_transactions: 0,
            nacked: Vec::new(),
            read_faults: Vec::new(),
            periodic_fault: None,
            busy_polls: 0,
        }
    }

    pub fn addresses(&self) -> Addresses {
        self.addresses
    }

    pub fn set_light(&mut self, reading: SensorReading) {
        self.light = LightSource::Fixed(reading);
    }

    pub fn set_light_source(&mut self, source: LightSource) {
        self.light = source;
    }

    pub fn set_expander_inputs(&mut self, levels: u8) {
        self.expander_inputs = levels;
    }

    pub fn expander_latch(&self) -> u8 {
        self.expander_latch
    }

    pub fn sensor_register(&self, register: u8) -> u8 {
        self.sensor_registers[usize::from(register) % SENSOR_REGISTERS]
    }

    pub fn display_ram(&self) -> &[u8; ssd1306::RAM_SIZE] {
        &self.display.ram
    }

    pub fn display_pixel(&self, x: usize, y: usize) -> bool {
        x < ssd1306::WIDTH
            && y < ssd1306::HEIGHT
            && self.display.ram[(y / 8) * ssd1306::WIDTH + x] & (1 << (y % 8)) != 0
    }

    pub fn display_on(&self) -> bool {
        self.display.on
    }

    /// The most recent transactions, oldest first, at most
    /// [`TRANSACTION_LOG_DEPTH`] of them.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.log.oldest_ordered().copied().collect()
    }

    /// Transactions seen since creation, including those no longer logged.
    pub fn total_transactions(&self) -> u64 {
        self.total_transactions
    }

    pub fn clear_transactions(&mut self) {
        self.log.clear();
    }

    /// Make `address` stop (or resume) acknowledging.
    pub fn set_nack(&mut self, address: u8, nack: bool) {
        self.nacked.retain(|&a| a != address);
        if nack {
            self.nacked.push(address);
        }
    }

    /// Fail the next `count` register reads from `address`.
    pub fn fail_reads(&mut self, address: u8, count: u32) {
        self.read_faults.push(ReadFault {
            address,
            remaining: count,
        });
    }

    /// Fail every `every`-th register read from `address`; 0 disables.
    pub fn fail_every_nth_read(&mut self, address: u8, every: u32) {
        self.periodic_fault = (every > 0).then_some(PeriodicFault {
            address,
            every,
            seen: 0,
        });
    }

    /// Report busy for the next `polls` ready polls.
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_polls = polls;
    }

    fn record(&mut self, address: u8, kind: TransactionKind, ok: bool) {
        trace!(address, ?kind, ok, "simulated transaction");
        self.log.write(Transaction { address, kind, ok });
        self.total_transactions += 1;
    }

    fn check_ack(&self, address: u8) -> Result<(), BusError> {
        let known = address == self.addresses.expander
            || address == self.addresses.sensor
            || address == self.addresses.display;
        if !known || self.nacked.contains(&address) {
            return Err(BusError::NoAcknowledge { address });
        }
        Ok(())
    }

    fn take_read_fault(&mut self, address: u8) -> bool {
        let mut fail = false;
        if let Some(fault) = self
            .read_faults
            .iter_mut()
            .find(|f| f.address == address && f.remaining > 0)
        {
            fault.remaining -= 1;
            fail = true;
        }
        self.read_faults.retain(|f| f.remaining > 0);

        if let Some(fault) = self.periodic_fault.as_mut().filter(|f| f.address == address) {
            fault.seen += 1;
            if fault.seen % fault.every == 0 {
                fail = true;
            }
        }
        fail
    }

    fn sensor_write(&mut self, register: u8, data: &[u8]) {
        if register == ap3216c::REG_SYSTEM_CONFIG && data.first() == Some(&ap3216c::MODE_SW_RESET) {
            self.sensor_registers = [0; SENSOR_REGISTERS];
            return;
        }
        for (offset, &byte) in data.iter().enumerate() {
            let index = (usize::from(register) + offset) % SENSOR_REGISTERS;
            self.sensor_registers[index] = byte;
        }
    }

    fn sensor_read(&mut self, register: u8, buf: &mut [u8]) {
        if register == ap3216c::REG_IR_DATA_LOW {
            let mode = self.sensor_registers[usize::from(ap3216c::REG_SYSTEM_CONFIG)] & 0x03;
            if mode != 0 {
                let sample = encode_sensor_data(self.light.sample());
                let base = usize::from(ap3216c::REG_IR_DATA_LOW);
                // ALS is bit 0, PS+IR is bit 1.
                if mode & 0x02 != 0 {
                    self.sensor_registers[base..base + 2].copy_from_slice(&sample[0..2]);
                    self.sensor_registers[base + 4..base + 6].copy_from_slice(&sample[4..6]);
                }
                if mode & 0x01 != 0 {
                    self.sensor_registers[base + 2..base + 4].copy_from_slice(&sample[2..4]);
                }
            }
        }
        for (offset, byte) in buf.iter_mut().enumerate() {
            *byte = self.sensor_registers[(usize::from(register) + offset) % SENSOR_REGISTERS];
        }
    }

    fn display_write(&mut self, control: u8, data: &[u8]) {
        if control & ssd1306::CONTROL_DATA != 0 {
            for &byte in data {
                self.display.data_byte(byte);
            }
        } else {
            for &byte in data {
                self.display.command_byte(byte);
            }
        }
    }
}

impl BusTransport for SimulatedBus {
    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), BusError> {
        let kind = TransactionKind::Write {
            register,
            len: data.len(),
        };
        if let Err(e) = self.check_ack(address) {
            self.record(address, kind, false);
            return Err(e);
        }

        if address == self.addresses.expander {
            // The last byte on the wire wins the latch.
            self.expander_latch = data.last().copied().unwrap_or(register);
        } else if address == self.addresses.sensor {
            self.sensor_write(register, data);
        } else {
            self.display_write(register, data);
        }
        self.record(address, kind, true);
        Ok(())
    }

    fn read(&mut self, address: u8, register: u8, buf: &mut [u8]) -> Result<(), BusError> {
        let kind = TransactionKind::Read {
            register,
            len: buf.len(),
        };
        if let Err(e) = self.check_ack(address) {
            self.record(address, kind, false);
            return Err(e);
        }
        if self.take_read_fault(address) {
            self.record(address, kind, false);
            return Err(BusError::NoAcknowledge { address });
        }

        if address == self.addresses.expander {
            self.expander_latch = register;
            buf.fill(self.expander_latch & self.expander_inputs);
        } else if address == self.addresses.sensor {
            self.sensor_read(register, buf);
        } else {
            buf.fill(0);
        }
        self.record(address, kind, true);
        Ok(())
    }

    fn receive(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        let kind = TransactionKind::Receive { len: buf.len() };
        if let Err(e) = self.check_ack(address) {
            self.record(address, kind, false);
            return Err(e);
        }

        let value = if address == self.addresses.expander {
            self.expander_latch & self.expander_inputs
        } else {
            0
        };
        buf.fill(value);
        self.record(address, kind, true);
        Ok(())
    }

    fn poll_idle(&mut self) -> nb::Result<(), BusError> {
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            return Err(nb::Error::WouldBlock);
        }
        Ok(())
    }
}
