use crate::devices::DeviceKind;
use thiserror::Error;

/// A bus transaction that did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("device 0x{address:02x} did not acknowledge")]
    NoAcknowledge { address: u8 },
    #[error("bus busy")]
    Busy,
    #[error("arbitration lost")]
    ArbitrationLost,
    #[error("transaction to device 0x{address:02x} timed out")]
    Timeout { address: u8 },
    #[error("bus fault")]
    Fault,
    #[error("bus lock poisoned by a panicked user")]
    Poisoned,
}

/// A driver's initialization sequence failed on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{device} initialization failed: {source}")]
pub struct DeviceInitError {
    pub device: DeviceKind,
    pub source: BusError,
}

impl DeviceInitError {
    pub fn new(device: DeviceKind, source: BusError) -> Self {
        Self { device, source }
    }
}

/// Contract violations by the caller of a driver.
///
/// The acquisition task never triggers these; they exist so that misuse is
/// rejected before it reaches the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MisuseError {
    #[error("{0} used before init")]
    NotInitialized(DeviceKind),
    #[error("{len} cells from column {column} overflow a {capacity}-cell row")]
    RowOverflow { column: u8, len: usize, capacity: u8 },
    #[error("row {row} is outside the {rows}-row surface")]
    RowOutOfRange { row: u8, rows: u8 },
    #[error("pin {pin} does not exist on a {pins}-pin port")]
    PinOutOfRange { pin: u8, pins: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SensorReadError {
    #[error("sensor read failed: {0}")]
    Bus(#[from] BusError),
    #[error(transparent)]
    Misuse(#[from] MisuseError),
}

/// Failure of a post-init display or expander operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device bus failure: {0}")]
    Bus(#[from] BusError),
    #[error(transparent)]
    Misuse(#[from] MisuseError),
}

/// Why the acquisition task never reached its running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartupError {
    #[error(transparent)]
    Init(#[from] DeviceInitError),
    #[error("initial screen render failed: {0}")]
    Render(#[from] DeviceError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("acquisition thread panicked")]
    Panicked,
    #[error("cannot build task runtime: {0}")]
    Runtime(String),
}
