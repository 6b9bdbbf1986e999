//! Pipeline entry: wires the drivers onto one bus and starts the
//! acquisition task in its own named thread.

use crate::bus::{BusTransport, SharedBus};
use crate::config::PanelConfig;
use crate::devices::{Ap3216c, IoExpander, LightSensor, Pcf8574, Ssd1306, TextDisplay};
use crate::error::PipelineError;
use crate::task::{stop_channel, AcquisitionTask, StopHandle, TaskStats};
use std::thread::{self, JoinHandle};
use tracing::{error, info};

/// Smallest stack handed to the task thread. Descriptors sized for a
/// microcontroller are far below what a host thread needs.
pub const MIN_HOST_STACK: usize = 256 * 1024;

/// The acquisition task with all three drivers on clones of one bus.
pub type PanelTask<B> =
    AcquisitionTask<Pcf8574<SharedBus<B>>, Ap3216c<SharedBus<B>>, Ssd1306<SharedBus<B>>>;

pub struct PipelineHandle {
    name: String,
    thread: JoinHandle<Result<TaskStats, PipelineError>>,
    stop: StopHandle,
}

impl PipelineHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the task to stop after its current period.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// True once the task thread has exited, e.g. after a startup failure.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> Result<TaskStats, PipelineError> {
        self.thread.join().map_err(|_| PipelineError::Panicked)?
    }

    /// Stop the task and wait for it.
    pub fn shutdown(self) -> Result<TaskStats, PipelineError> {
        self.stop();
        self.join()
    }
}

/// Build the task described by `config` with every driver on `bus`.
pub fn build_task<B: BusTransport>(config: &PanelConfig, bus: &SharedBus<B>) -> PanelTask<B> {
    let bus = bus.clone().with_busy_polls(config.bus.max_busy_polls);
    AcquisitionTask::new(
        config.task.clone(),
        config.layout.clone(),
        Pcf8574::new(bus.clone(), config.expander),
        Ap3216c::new(bus.clone(), config.sensor),
        Ssd1306::new(bus, config.display),
    )
}

/// Start the panel pipeline on `bus`. Returns `None` for a configuration
/// that fails [`PanelConfig::validate`] or when the thread cannot be created.
pub fn launch<B>(config: &PanelConfig, bus: &SharedBus<B>) -> Option<PipelineHandle>
where
    B: BusTransport + Send + 'static,
{
    if let Err(e) = config.validate() {
        error!(error = %e, "pipeline not started");
        return None;
    }
    info!(
        expander = config.expander.address,
        sensor = config.sensor.address,
        display = config.display.address,
        "pipeline started"
    );
    spawn(build_task(config, bus))
}

/// Run `task` on a new thread named after its descriptor.
///
/// Returns `None` if the thread could not be created. Startup failures
/// inside the task are reported through [`PipelineHandle::join`].
pub fn spawn<E, S, D>(task: AcquisitionTask<E, S, D>) -> Option<PipelineHandle>
where
    E: IoExpander + Send + 'static,
    S: LightSensor + Send + 'static,
    D: TextDisplay + Send + 'static,
{
    let descriptor = task.descriptor().clone();
    let stack_size = descriptor.stack_size.max(MIN_HOST_STACK);
    let (stop, signal) = stop_channel();

    let spawned = thread::Builder::new()
        .name(descriptor.name.clone())
        .stack_size(stack_size)
        .spawn(move || -> Result<TaskStats, PipelineError> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .map_err(|e| PipelineError::Runtime(e.to_string()))?;
            Ok(runtime.block_on(task.run(signal))?)
        });

    match spawned {
        Ok(thread) => {
            info!(
                task = %descriptor.name,
                priority = ?descriptor.priority,
                period_ms = descriptor.period_ms,
                stack_size,
                "task created"
            );
            Some(PipelineHandle {
                name: descriptor.name,
                thread,
                stop,
            })
        }
        Err(e) => {
            error!(task = %descriptor.name, error = %e, "task creation failed");
            None
        }
    }
}
