use crate::bus::DEFAULT_BUSY_POLLS;
use crate::devices::{ssd1306, Ap3216cConfig, Pcf8574Config, Ssd1306Config};
use crate::display_line::LINE_CAPACITY;
use crate::error::ConfigError;
use crate::task::{LayoutConfig, TaskDescriptor};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// Ready polls before a transaction is abandoned as busy.
    pub max_busy_polls: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_busy_polls: DEFAULT_BUSY_POLLS,
        }
    }
}

/// Startup configuration for the whole panel. Read once, never reloaded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PanelConfig {
    pub task: TaskDescriptor,
    pub bus: BusConfig,
    pub expander: Pcf8574Config,
    pub sensor: Ap3216cConfig,
    pub display: Ssd1306Config,
    pub layout: LayoutConfig,
}

impl PanelConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task.period_ms == 0 {
            return Err(ConfigError::Invalid("task.period_ms must be positive".into()));
        }
        if self.task.name.is_empty() {
            return Err(ConfigError::Invalid("task.name must not be empty".into()));
        }

        let addresses = [self.expander.address, self.sensor.address, self.display.address];
        if addresses.iter().any(|&a| a > 0x7F) {
            return Err(ConfigError::Invalid("device addresses are 7-bit".into()));
        }
        let [expander, sensor, display] = addresses;
        if expander == sensor || expander == display || sensor == display {
            return Err(ConfigError::Invalid(format!(
                "device addresses must be distinct, got {addresses:02x?}"
            )));
        }

        let size = self.layout.text_size;
        let columns = ssd1306::WIDTH / usize::from(size.cell_width());
        let rows = ssd1306::HEIGHT / usize::from(size.cell_height());

        let title_len = self.layout.title.chars().count();
        if title_len > LINE_CAPACITY || usize::from(self.layout.column) + title_len > columns {
            return Err(ConfigError::Invalid(format!(
                "title of {title_len} characters does not fit a {columns}-cell row"
            )));
        }
        // Title plus three channel rows.
        if usize::from(self.layout.title_row) + 3 >= rows {
            return Err(ConfigError::Invalid(format!(
                "title row {} leaves no room for three channel rows out of {rows}",
                self.layout.title_row
            )));
        }
        if usize::from(self.layout.column) + crate::display_line::MAX_CHANNEL_LINE_LEN > columns {
            return Err(ConfigError::Invalid(format!(
                "channel rows starting at column {} overflow a {columns}-cell row",
                self.layout.column
            )));
        }
        Ok(())
    }
}
