//! The acquisition task: brings the three devices up in order, then polls
//! the sensor once per period and redraws the three channel rows.

use crate::devices::{DeviceKind, IoExpander, LightSensor, TextDisplay, TextSize};
use crate::display_line::DisplayLine;
use crate::error::StartupError;
use crate::reading::{Channel, SensorReading};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub const DEFAULT_TASK_NAME: &str = "SensorDisplayTask";
pub const DEFAULT_PERIOD_MS: u64 = 1000;
pub const DEFAULT_STACK_SIZE: usize = 1024;
pub const DEFAULT_TITLE: &str = " AP3216C Sensor ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    Realtime,
}

/// Execution context requested for the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskDescriptor {
    /// Diagnostic name, also used as the thread name.
    pub name: String,
    pub period_ms: u64,
    pub priority: Priority,
    /// Stack budget in bytes.
    pub stack_size: usize,
}

impl Default for TaskDescriptor {
    fn default() -> Self {
        Self {
            name: DEFAULT_TASK_NAME.to_string(),
            period_ms: DEFAULT_PERIOD_MS,
            priority: Priority::Normal,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl TaskDescriptor {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Where the title and channel rows go on the display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub title: String,
    pub title_row: u8,
    pub column: u8,
    pub text_size: TextSize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            title_row: 0,
            column: 0,
            text_size: TextSize::Large,
        }
    }
}

impl LayoutConfig {
    /// Saturates instead of wrapping, so an out-of-range row is rejected by
    /// the display rather than landing on top of the title.
    pub fn channel_row(&self, channel: Channel) -> u8 {
        self.title_row.saturating_add(channel.row_offset())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Uninitialized,
    Initializing,
    Running,
}

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    Rendered(SensorReading),
    /// The sensor read failed and the screen was left as is.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub iterations: u64,
    pub rendered: u64,
    pub read_failures: u64,
    pub draw_failures: u64,
}

/// Requests the task loop to stop. Clones share one signal.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observed by the task once per iteration, after the period wait.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

impl StopHandle {
    pub fn stop(&self) {
        // Only fails once every signal is gone, and then nobody is listening.
        let _ = self.tx.send(true);
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }
}

pub struct AcquisitionTask<E, S, D> {
    descriptor: TaskDescriptor,
    layout: LayoutConfig,
    expander: E,
    sensor: S,
    display: D,
    state: TaskState,
    stats: TaskStats,
    lines: [DisplayLine; 3],
}

impl<E, S, D> AcquisitionTask<E, S, D>
where
    E: IoExpander,
    S: LightSensor,
    D: TextDisplay,
{
    pub fn new(
        descriptor: TaskDescriptor,
        layout: LayoutConfig,
        expander: E,
        sensor: S,
        display: D,
    ) -> Self {
        let lines = Channel::ALL
            .map(|channel| DisplayLine::new(layout.column, layout.channel_row(channel)));
        Self {
            descriptor,
            layout,
            expander,
            sensor,
            display,
            state: TaskState::Uninitialized,
            stats: TaskStats::default(),
            lines,
        }
    }

    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn stats(&self) -> &TaskStats {
        &self.stats
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn expander(&self) -> &E {
        &self.expander
    }

    /// Init the expander, sensor and display in that order, then draw the
    /// static screen. On error the task stays out of `Running`.
    ///
    /// Blocks the calling thread for the sensor's settle time.
    pub fn start(&mut self) -> Result<(), StartupError> {
        self.begin_start();
        let result = self.reset_phase().and_then(|settle| {
            if !settle.is_zero() {
                std::thread::sleep(settle);
            }
            self.configure_phase()
        });
        self.finish_start(result)
    }

    /// [`AcquisitionTask::start`] with the settle wait on the tokio clock.
    pub async fn start_async(&mut self) -> Result<(), StartupError> {
        self.begin_start();
        let result = match self.reset_phase() {
            Ok(settle) => {
                tokio::time::sleep(settle).await;
                self.configure_phase()
            }
            Err(e) => Err(e),
        };
        self.finish_start(result)
    }

    fn begin_start(&mut self) {
        self.state = TaskState::Initializing;
        info!(task = %self.descriptor.name, "initializing devices");
    }

    fn finish_start(&mut self, result: Result<(), StartupError>) -> Result<(), StartupError> {
        match result {
            Ok(()) => {
                self.state = TaskState::Running;
                info!(task = %self.descriptor.name, "pipeline running");
            }
            Err(ref e) => {
                self.state = TaskState::Uninitialized;
                error!(task = %self.descriptor.name, error = %e, "pipeline startup failed");
            }
        }
        result
    }

    fn reset_phase(&mut self) -> Result<Duration, StartupError> {
        self.expander.init()?;
        debug!(device = %DeviceKind::Expander, "initialized");
        Ok(self.sensor.reset()?)
    }

    fn configure_phase(&mut self) -> Result<(), StartupError> {
        self.sensor.configure()?;
        debug!(device = %DeviceKind::Sensor, "initialized");
        self.display.init()?;
        debug!(device = %DeviceKind::Display, "initialized");

        self.display.clear()?;
        self.display.draw_text(
            self.layout.column,
            self.layout.title_row,
            &self.layout.title,
            self.layout.text_size,
        )?;
        Ok(())
    }

    /// One steady-state cycle without the wait.
    pub fn run_iteration(&mut self) -> Iteration {
        debug_assert_eq!(self.state, TaskState::Running, "iteration before start");
        self.stats.iterations += 1;

        let reading = match self.sensor.read_data() {
            Ok(reading) => reading,
            Err(e) => {
                self.stats.read_failures += 1;
                warn!(error = %e, "sensor read failed, display update skipped");
                return Iteration::Skipped;
            }
        };

        for (line, channel) in self.lines.iter_mut().zip(Channel::ALL) {
            line.format_channel(channel, reading.channel(channel));
            if let Err(e) = self.display.draw_text(
                line.column(),
                line.row(),
                line.as_str(),
                self.layout.text_size,
            ) {
                self.stats.draw_failures += 1;
                warn!(?channel, error = %e, "row draw failed");
            }
        }

        self.stats.rendered += 1;
        debug!(ir = reading.ir, als = reading.als, ps = reading.ps, "rendered");
        Iteration::Rendered(reading)
    }

    /// Start up, then loop until `stop` is raised.
    pub async fn run(mut self, stop: StopSignal) -> Result<TaskStats, StartupError> {
        self.start_async().await?;
        let period = self.descriptor.period();

        loop {
            self.run_iteration();
            tokio::time::sleep(period).await;
            if stop.is_stopped() {
                break;
            }
        }

        info!(
            task = %self.descriptor.name,
            iterations = self.stats.iterations,
            read_failures = self.stats.read_failures,
            "pipeline stopped"
        );
        Ok(self.stats)
    }
}
