use super::{DeviceKind, IoExpander};
use crate::bus::BusTransport;
use crate::error::{DeviceError, DeviceInitError, MisuseError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_ADDRESS: u8 = 0x20;
pub const PIN_COUNT: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Pcf8574Config {
    pub address: u8,
    /// Latch value written at init. A high bit is a weak pull-up, which also
    /// makes the line usable as an input.
    pub initial_port: u8,
}

impl Default for Pcf8574Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            initial_port: 0xFF,
        }
    }
}

/// PCF8574 8-bit quasi-bidirectional port expander.
///
/// The chip has no register file: every byte written lands in the output
/// latch, so the latch value travels in the transport's register slot.
#[derive(Debug)]
pub struct Pcf8574<B> {
    bus: B,
    config: Pcf8574Config,
    latch: u8,
    initialized: bool,
}

impl<B: BusTransport> Pcf8574<B> {
    pub fn new(bus: B, config: Pcf8574Config) -> Self {
        Self {
            bus,
            latch: config.initial_port,
            config,
            initialized: false,
        }
    }

    pub fn config(&self) -> &Pcf8574Config {
        &self.config
    }

    /// Last value written to the output latch.
    pub fn latch(&self) -> u8 {
        self.latch
    }

    fn ensure_initialized(&self) -> Result<(), MisuseError> {
        if self.initialized {
            Ok(())
        } else {
            Err(MisuseError::NotInitialized(DeviceKind::Expander))
        }
    }

    pub fn write_port(&mut self, value: u8) -> Result<(), DeviceError> {
        self.ensure_initialized()?;
        self.bus.write(self.config.address, value, &[])?;
        self.latch = value;
        Ok(())
    }

    /// Sample the pin levels. Only pins whose latch bit is high read as inputs.
    pub fn read_port(&mut self) -> Result<u8, DeviceError> {
        self.ensure_initialized()?;
        let mut buf = [0u8; 1];
        self.bus.receive(self.config.address, &mut buf)?;
        Ok(buf[0])
    }

    pub fn set_pin(&mut self, pin: u8, high: bool) -> Result<(), DeviceError> {
        if pin >= PIN_COUNT {
            return Err(MisuseError::PinOutOfRange {
                pin,
                pins: PIN_COUNT,
            }
            .into());
        }
        let mask = 1u8 << pin;
        let value = if high { self.latch | mask } else { self.latch & !mask };
        self.write_port(value)
    }

    pub fn release(self) -> B {
        self.bus
    }
}

impl<B: BusTransport> IoExpander for Pcf8574<B> {
    fn init(&mut self) -> Result<(), DeviceInitError> {
        self.initialized = false;
        self.bus
            .write(self.config.address, self.config.initial_port, &[])
            .map_err(|e| DeviceInitError::new(DeviceKind::Expander, e))?;
        self.latch = self.config.initial_port;
        self.initialized = true;

        debug!(latch = self.latch, "expander latch set");
        info!(address = self.config.address, "PCF8574 ready");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatedBus;

    #[test]
    fn test_init_writes_initial_latch() {
        let mut sim = SimulatedBus::new();
        let mut expander = Pcf8574::new(
            &mut sim,
            Pcf8574Config {
                initial_port: 0xF0,
                ..Default::default()
            },
        );
        expander.init().unwrap();
        assert!(expander.is_initialized());
        drop(expander);

        assert_eq!(sim.expander_latch(), 0xF0);
    }

    #[test]
    fn test_port_access_requires_init() {
        let mut sim = SimulatedBus::new();
        let mut expander = Pcf8574::new(&mut sim, Pcf8574Config::default());

        assert_eq!(
            expander.write_port(0x00),
            Err(DeviceError::Misuse(MisuseError::NotInitialized(DeviceKind::Expander)))
        );
        assert!(expander.read_port().is_err());
    }

    #[test]
    fn test_set_pin_updates_shadow_latch() {
        let mut sim = SimulatedBus::new();
        let mut expander = Pcf8574::new(&mut sim, Pcf8574Config::default());
        expander.init().unwrap();

        expander.set_pin(3, false).unwrap();
        assert_eq!(expander.latch(), 0xF7);
        expander.set_pin(3, true).unwrap();
        assert_eq!(expander.latch(), 0xFF);
        expander.set_pin(0, false).unwrap();
        drop(expander);

        assert_eq!(sim.expander_latch(), 0xFE);
    }

    #[test]
    fn test_set_pin_rejects_missing_pin() {
        let mut sim = SimulatedBus::new();
        let mut expander = Pcf8574::new(&mut sim, Pcf8574Config::default());
        expander.init().unwrap();

        assert_eq!(
            expander.set_pin(9, false),
            Err(DeviceError::Misuse(MisuseError::PinOutOfRange { pin: 9, pins: 8 }))
        );
        assert_eq!(expander.latch(), 0xFF);
        drop(expander);

        assert_eq!(sim.expander_latch(), 0xFF);
    }

    #[test]
    fn test_read_port_reflects_inputs() {
        let mut sim = SimulatedBus::new();
        sim.set_expander_inputs(0b1010_0101);
        let mut expander = Pcf8574::new(&mut sim, Pcf8574Config::default());
        expander.init().unwrap();

        assert_eq!(expander.read_port().unwrap(), 0b1010_0101);

        // Pins driven low read low regardless of the external level.
        expander.write_port(0x0F).unwrap();
        assert_eq!(expander.read_port().unwrap(), 0b0000_0101);
    }

    #[test]
    fn test_init_failure_is_reported() {
        let mut sim = SimulatedBus::new();
        sim.set_nack(DEFAULT_ADDRESS, true);
        let mut expander = Pcf8574::new(&mut sim, Pcf8574Config::default());

        let err = expander.init().unwrap_err();
        assert_eq!(err.device, DeviceKind::Expander);
        assert_eq!(err.source, crate::error::BusError::NoAcknowledge { address: DEFAULT_ADDRESS });
        assert!(!expander.is_initialized());
    }
}
