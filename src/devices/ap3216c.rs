//! AP3216C combined ambient light, proximity and infrared sensor.
//!
//! The six data registers are read in one burst so a reading is never
//! stitched together from two conversions. Channel byte order differs per
//! channel and stays inside this module:
//!
//! | channel | low register          | high register          | width  |
//! |---------|-----------------------|------------------------|--------|
//! | IR      | `0x0A` bits 1:0 → 1:0 | `0x0B` bits 7:0 → 9:2  | 10 bit |
//! | ALS     | `0x0C` bits 7:0 → 7:0 | `0x0D` bits 7:0 → 15:8 | 16 bit |
//! | PS      | `0x0E` bits 3:0 → 3:0 | `0x0F` bits 5:0 → 9:4  | 10 bit |

use super::{DeviceKind, LightSensor};
use crate::bus::BusTransport;
use crate::error::{DeviceInitError, MisuseError, SensorReadError};
use crate::reading::SensorReading;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ADDRESS: u8 = 0x1E;

pub const REG_SYSTEM_CONFIG: u8 = 0x00;
pub const REG_IR_DATA_LOW: u8 = 0x0A;
pub const REG_ALS_CONFIG: u8 = 0x10;

pub const MODE_ALS_PS_IR: u8 = 0x03;
pub const MODE_SW_RESET: u8 = 0x04;

const DATA_LEN: usize = 6;
const IR_OVERFLOW: u8 = 0x80;

pub const IR_MAX: u16 = 0x03FF;
pub const PS_MAX: u16 = 0x03FF;

/// ALS full-scale range, written to bits 5:4 of `ALS_CONFIG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlsRange {
    Lux20661,
    Lux5162,
    Lux1291,
    Lux323,
}

impl AlsRange {
    pub const fn register_bits(self) -> u8 {
        let code = match self {
            AlsRange::Lux20661 => 0,
            AlsRange::Lux5162 => 1,
            AlsRange::Lux1291 => 2,
            AlsRange::Lux323 => 3,
        };
        code << 4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Ap3216cConfig {
    pub address: u8,
    pub als_range: AlsRange,
    /// Wait after the software reset before reconfiguring.
    pub reset_settle_ms: u64,
}

impl Default for Ap3216cConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            als_range: AlsRange::Lux20661,
            reset_settle_ms: 50,
        }
    }
}

#[derive(Debug)]
pub struct Ap3216c<B> {
    bus: B,
    config: Ap3216cConfig,
    initialized: bool,
}

impl<B: BusTransport> Ap3216c<B> {
    pub fn new(bus: B, config: Ap3216cConfig) -> Self {
        Self {
            bus,
            config,
            initialized: false,
        }
    }

    pub fn config(&self) -> &Ap3216cConfig {
        &self.config
    }

    pub fn release(self) -> B {
        self.bus
    }
}

/// Reassemble the three channels from the raw `0x0A..=0x0F` burst.
pub fn decode(raw: &[u8; DATA_LEN]) -> SensorReading {
    let [ir_lo, ir_hi, als_lo, als_hi, ps_lo, ps_hi] = *raw;

    // An overflowed IR conversion also invalidates the proximity result.
    if ir_lo & IR_OVERFLOW != 0 {
        return SensorReading::new(0, u16::from_le_bytes([als_lo, als_hi]), 0);
    }

    let ir = (u16::from(ir_hi) << 2) | u16::from(ir_lo & 0x03);
    let als = u16::from_le_bytes([als_lo, als_hi]);
    let ps = (u16::from(ps_hi & 0x3F) << 4) | u16::from(ps_lo & 0x0F);
    SensorReading::new(ir, als, ps)
}

impl<B: BusTransport> LightSensor for Ap3216c<B> {
    fn reset(&mut self) -> Result<Duration, DeviceInitError> {
        self.initialized = false;
        self.bus
            .write(self.config.address, REG_SYSTEM_CONFIG, &[MODE_SW_RESET])
            .map_err(|e| DeviceInitError::new(DeviceKind::Sensor, e))?;
        Ok(Duration::from_millis(self.config.reset_settle_ms))
    }

    fn configure(&mut self) -> Result<(), DeviceInitError> {
        let address = self.config.address;
        let range = self.config.als_range.register_bits();
        self.bus
            .write(address, REG_ALS_CONFIG, &[range])
            .and_then(|()| self.bus.write(address, REG_SYSTEM_CONFIG, &[MODE_ALS_PS_IR]))
            .map_err(|e| DeviceInitError::new(DeviceKind::Sensor, e))?;
        self.initialized = true;

        info!(
            address = self.config.address,
            range = ?self.config.als_range,
            "AP3216C sampling ALS, PS and IR"
        );
        Ok(())
    }

    fn read_data(&mut self) -> Result<SensorReading, SensorReadError> {
        if !self.initialized {
            return Err(MisuseError::NotInitialized(DeviceKind::Sensor).into());
        }

        let mut raw = [0u8; DATA_LEN];
        self.bus
            .read(self.config.address, REG_IR_DATA_LOW, &mut raw)
            .map_err(|e| {
                warn!(error = %e, "AP3216C data read failed");
                SensorReadError::Bus(e)
            })?;

        if raw[0] & IR_OVERFLOW != 0 {
            debug!("IR conversion overflowed; IR and PS reported as 0");
        }
        Ok(decode(&raw))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;
    use crate::simulator::SimulatedBus;

    fn quick_config() -> Ap3216cConfig {
        Ap3216cConfig {
            reset_settle_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_channel_byte_order() {
        // IR = 0x2D << 2 | 0b10, ALS = 0x1234 little endian, PS = 0x15 << 4 | 0x7
        let reading = decode(&[0x02, 0x2D, 0x34, 0x12, 0x07, 0x15]);
        assert_eq!(reading.ir, (0x2D << 2) | 0x02);
        assert_eq!(reading.als, 0x1234);
        assert_eq!(reading.ps, (0x15 << 4) | 0x07);
    }

    #[test]
    fn test_decode_masks_flag_bits() {
        // PS low register carries the object/overflow flags in its upper nibble.
        let reading = decode(&[0x03, 0xFF, 0xFF, 0xFF, 0x4F, 0xFF]);
        assert_eq!(reading.ir, IR_MAX);
        assert_eq!(reading.als, u16::MAX);
        assert_eq!(reading.ps, PS_MAX);
    }

    #[test]
    fn test_decode_ir_overflow_invalidates_ir_and_ps() {
        let reading = decode(&[0x80 | 0x03, 0x10, 0x38, 0x00, 0x05, 0x01]);
        assert_eq!(reading, SensorReading::new(0, 56, 0));
    }

    #[test]
    fn test_init_sequence() {
        let mut sim = SimulatedBus::new();
        let mut sensor = Ap3216c::new(
            &mut sim,
            Ap3216cConfig {
                als_range: AlsRange::Lux1291,
                ..quick_config()
            },
        );
        sensor.init().unwrap();
        drop(sensor);

        assert_eq!(sim.sensor_register(REG_SYSTEM_CONFIG), MODE_ALS_PS_IR);
        assert_eq!(sim.sensor_register(REG_ALS_CONFIG), 0x20);
    }

    #[test]
    fn test_reset_reports_settle_time() {
        let mut sim = SimulatedBus::new();
        let mut sensor = Ap3216c::new(&mut sim, Ap3216cConfig::default());

        assert_eq!(sensor.reset().unwrap(), Duration::from_millis(50));
        assert!(!sensor.is_initialized());
        sensor.configure().unwrap();
        assert!(sensor.is_initialized());
        drop(sensor);

        assert_eq!(sim.sensor_register(REG_SYSTEM_CONFIG), MODE_ALS_PS_IR);
    }

    #[test]
    fn test_read_before_init_is_misuse() {
        let mut sim = SimulatedBus::new();
        let mut sensor = Ap3216c::new(&mut sim, quick_config());
        assert_eq!(
            sensor.read_data(),
            Err(SensorReadError::Misuse(MisuseError::NotInitialized(DeviceKind::Sensor)))
        );
    }

    #[test]
    fn test_read_returns_simulated_light() {
        let mut sim = SimulatedBus::new();
        sim.set_light(SensorReading::new(700, 56, 7));
        let mut sensor = Ap3216c::new(&mut sim, quick_config());
        sensor.init().unwrap();

        assert_eq!(sensor.read_data().unwrap(), SensorReading::new(700, 56, 7));
    }

    #[test]
    fn test_read_failure_is_all_or_nothing() {
        let mut sim = SimulatedBus::new();
        sim.set_light(SensorReading::new(10, 20, 30));
        sim.fail_reads(DEFAULT_ADDRESS, 1);
        let mut sensor = Ap3216c::new(&mut sim, quick_config());
        sensor.init().unwrap();

        assert_eq!(
            sensor.read_data(),
            Err(SensorReadError::Bus(BusError::NoAcknowledge { address: DEFAULT_ADDRESS }))
        );
        // The next poll is unaffected.
        assert_eq!(sensor.read_data().unwrap(), SensorReading::new(10, 20, 30));
    }
}
