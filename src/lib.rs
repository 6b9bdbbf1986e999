//! # Sensor Panel
//!
//! Periodic light and proximity acquisition from an AP3216C, rendered as
//! text on an SSD1306 OLED, with a PCF8574 port expander on the same I2C bus.
//!
//! ## Features
//!
//! - **Shared bus**: one physical bus handed to several drivers, each
//!   transaction atomic with respect to the others
//! - **Device drivers**: PCF8574, AP3216C and SSD1306 over any [`bus::BusTransport`]
//! - **Acquisition task**: ordered bring-up, fixed-period sampling, in-place redraw
//! - **Bounded formatting**: fixed-capacity display lines, no heap per frame
//! - **Simulation**: register-level bus model with fault injection for host runs
//!
//! ## Quick Start
//!
//! ```rust
//! use sensorpanel::{PanelConfig, SharedBus, SimulatedBus};
//!
//! let bus = SharedBus::new(SimulatedBus::new());
//! let mut config = PanelConfig::default();
//! config.task.period_ms = 10;
//! config.sensor.reset_settle_ms = 0;
//!
//! if let Some(handle) = sensorpanel::entry::launch(&config, &bus) {
//!     let stats = handle.shutdown().unwrap();
//!     assert!(stats.iterations >= 1);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`bus`] - Transaction trait, shared bus handle and `embedded-hal` adapter
//! - [`devices`] - Expander, sensor and display drivers
//! - [`display_line`] - Fixed-capacity text lines
//! - [`task`] - The acquisition state machine and its loop
//! - [`entry`] - Thread creation and pipeline wiring
//! - [`config`] - JSON startup configuration
//! - [`simulator`] - Simulated bus with all three devices

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod bus;
pub mod config;
pub mod devices;
pub mod display_line;
pub mod entry;
pub mod error;
pub mod reading;
pub mod simulator;
pub mod task;

pub use bus::{BusTransport, HalBus, SharedBus};
pub use config::PanelConfig;
pub use display_line::DisplayLine;
pub use entry::PipelineHandle;
pub use reading::SensorReading;
pub use simulator::SimulatedBus;
pub use task::{AcquisitionTask, TaskStats};
