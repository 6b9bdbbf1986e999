use serde::{Deserialize, Serialize};

/// One poll of the light sensor. Channels are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorReading {
    /// Infrared intensity.
    pub ir: u16,
    /// Ambient light level.
    pub als: u16,
    /// Proximity level.
    pub ps: u16,
}

impl SensorReading {
    pub const fn new(ir: u16, als: u16, ps: u16) -> Self {
        Self { ir, als, ps }
    }

    pub const fn channel(&self, channel: Channel) -> u16 {
        match channel {
            Channel::Infrared => self.ir,
            Channel::AmbientLight => self.als,
            Channel::Proximity => self.ps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Infrared,
    AmbientLight,
    Proximity,
}

pub const LABEL_IR: &str = "IR";
pub const LABEL_ALS: &str = "ALS";
pub const LABEL_PS: &str = "PS";

impl Channel {
    /// Render order, top to bottom.
    pub const ALL: [Channel; 3] = [Channel::Infrared, Channel::AmbientLight, Channel::Proximity];

    pub const fn label(self) -> &'static str {
        match self {
            Channel::Infrared => LABEL_IR,
            Channel::AmbientLight => LABEL_ALS,
            Channel::Proximity => LABEL_PS,
        }
    }

    /// Rows below the title row.
    pub const fn row_offset(self) -> u8 {
        match self {
            Channel::Infrared => 1,
            Channel::AmbientLight => 2,
            Channel::Proximity => 3,
        }
    }
}
