pub mod ap3216c;
pub mod pcf8574;
pub mod ssd1306;

pub use ap3216c::{Ap3216c, Ap3216cConfig, AlsRange};
pub use pcf8574::{Pcf8574, Pcf8574Config};
pub use ssd1306::{Ssd1306, Ssd1306Config};

use crate::error::{DeviceError, DeviceInitError, SensorReadError};
use crate::reading::SensorReading;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Expander,
    Sensor,
    Display,
}

impl core::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DeviceKind::Expander => write!(f, "I/O expander"),
            DeviceKind::Sensor => write!(f, "light sensor"),
            DeviceKind::Display => write!(f, "display"),
        }
    }
}

/// Character cell geometry used by [`TextDisplay::draw_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSize {
    /// 6x8 pixel cells.
    Small,
    /// 8x16 pixel cells.
    Large,
}

impl TextSize {
    pub const fn cell_width(self) -> u8 {
        match self {
            TextSize::Small => 6,
            TextSize::Large => 8,
        }
    }

    pub const fn cell_height(self) -> u8 {
        match self {
            TextSize::Small => 8,
            TextSize::Large => 16,
        }
    }
}

pub trait IoExpander {
    fn init(&mut self) -> Result<(), DeviceInitError>;
    fn is_initialized(&self) -> bool;
}

/// Sensor bring-up is split around a settle delay so async callers can
/// wait on their own clock; [`LightSensor::init`] blocks the thread instead.
pub trait LightSensor {
    /// Start the reset and return how long the sensor needs before
    /// [`LightSensor::configure`].
    fn reset(&mut self) -> Result<Duration, DeviceInitError>;

    fn configure(&mut self) -> Result<(), DeviceInitError>;

    fn init(&mut self) -> Result<(), DeviceInitError> {
        let settle = self.reset()?;
        if !settle.is_zero() {
            std::thread::sleep(settle);
        }
        self.configure()
    }

    /// Poll all three channels. All-or-nothing: on error no reading exists.
    fn read_data(&mut self) -> Result<SensorReading, SensorReadError>;

    fn is_initialized(&self) -> bool;
}

pub trait TextDisplay {
    fn init(&mut self) -> Result<(), DeviceInitError>;

    fn clear(&mut self) -> Result<(), DeviceError>;

    /// Draw `text` starting at the given cell. Never wraps or truncates;
    /// text that does not fit the row is rejected.
    fn draw_text(
        &mut self,
        column: u8,
        row: u8,
        text: &str,
        size: TextSize,
    ) -> Result<(), DeviceError>;

    /// Cells per row at `size`.
    fn columns(&self, size: TextSize) -> u8;

    /// Rows on the surface at `size`.
    fn rows(&self, size: TextSize) -> u8;

    fn is_initialized(&self) -> bool;
}
