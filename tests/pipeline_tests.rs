use sensorpanel::bus::{BusTransport, SharedBus};
use sensorpanel::devices::{
    ap3216c, pcf8574, ssd1306, Ssd1306, Ssd1306Config, TextDisplay, TextSize,
};
use sensorpanel::entry::build_task;
use sensorpanel::error::BusError;
use sensorpanel::simulator::{SimulatedBus, TransactionKind, TRANSACTION_LOG_DEPTH};
use sensorpanel::task::{stop_channel, Iteration, TaskState};
use sensorpanel::{PanelConfig, SensorReading};
use std::time::Duration;
use tokio::time::Instant;

fn quick_config() -> PanelConfig {
    let mut config = PanelConfig::default();
    config.sensor.reset_settle_ms = 0;
    config
}

/// Display RAM after drawing `rows` directly on a fresh panel.
fn reference_ram(rows: &[(u8, &str)]) -> [u8; ssd1306::RAM_SIZE] {
    let mut sim = SimulatedBus::new();
    let mut display = Ssd1306::new(&mut sim, Ssd1306Config::default());
    display.init().unwrap();
    for &(row, text) in rows {
        display.draw_text(0, row, text, TextSize::Large).unwrap();
    }
    drop(display);
    *sim.display_ram()
}

#[test]
fn test_bus_level_init_order() {
    let bus = SharedBus::new(SimulatedBus::new());
    let mut task = build_task(&quick_config(), &bus);
    task.start().unwrap();

    let order: Vec<u8> = bus
        .inspect(|sim| sim.transactions().iter().map(|t| t.address).collect())
        .unwrap();
    let first = |addr: u8| order.iter().position(|&a| a == addr).unwrap();
    let last = |addr: u8| order.iter().rposition(|&a| a == addr).unwrap();

    assert_eq!(first(pcf8574::DEFAULT_ADDRESS), 0);
    assert!(last(pcf8574::DEFAULT_ADDRESS) < first(ap3216c::DEFAULT_ADDRESS));
    assert!(last(ap3216c::DEFAULT_ADDRESS) < first(ssd1306::DEFAULT_ADDRESS));
}

#[test]
fn test_end_to_end_rendering() {
    let bus = SharedBus::new(SimulatedBus::new());
    bus.inspect_mut(|sim| sim.set_light(SensorReading::new(1023, 56, 7)))
        .unwrap();

    let mut task = build_task(&quick_config(), &bus);
    task.start().unwrap();
    assert_eq!(task.state(), TaskState::Running);
    assert_eq!(
        task.run_iteration(),
        Iteration::Rendered(SensorReading::new(1023, 56, 7))
    );

    let expected = reference_ram(&[
        (0, " AP3216C Sensor "),
        (1, " IR: 1023  "),
        (2, " ALS: 56   "),
        (3, " PS: 7     "),
    ]);
    let actual = bus.inspect(|sim| *sim.display_ram()).unwrap();
    assert_eq!(actual, expected);
}

#[test]
fn test_shorter_value_fully_overwrites_longer() {
    let bus = SharedBus::new(SimulatedBus::new());
    bus.inspect_mut(|sim| sim.set_light(SensorReading::new(1000, 65535, 1000)))
        .unwrap();

    let mut task = build_task(&quick_config(), &bus);
    task.start().unwrap();
    task.run_iteration();
    bus.inspect_mut(|sim| sim.set_light(SensorReading::new(3, 3, 3)))
        .unwrap();
    task.run_iteration();

    let expected = reference_ram(&[
        (0, " AP3216C Sensor "),
        (1, " IR: 3     "),
        (2, " ALS: 3     "),
        (3, " PS: 3     "),
    ]);
    assert_eq!(bus.inspect(|sim| *sim.display_ram()).unwrap(), expected);
}

#[test]
fn test_failed_read_leaves_screen_untouched() {
    let bus = SharedBus::new(SimulatedBus::new());
    bus.inspect_mut(|sim| {
        sim.set_light(SensorReading::new(1, 2, 3));
        sim.fail_reads(ap3216c::DEFAULT_ADDRESS, 1);
    })
    .unwrap();

    let mut task = build_task(&quick_config(), &bus);
    task.start().unwrap();
    let before = bus.inspect(|sim| *sim.display_ram()).unwrap();

    assert_eq!(task.run_iteration(), Iteration::Skipped);
    assert_eq!(bus.inspect(|sim| *sim.display_ram()).unwrap(), before);
    assert_eq!(before, reference_ram(&[(0, " AP3216C Sensor ")]));

    assert_eq!(
        task.run_iteration(),
        Iteration::Rendered(SensorReading::new(1, 2, 3))
    );
    assert_eq!(task.stats().read_failures, 1);
    assert_eq!(task.stats().rendered, 1);
}

#[test]
fn test_display_init_failure_prevents_running() {
    let bus = SharedBus::new(SimulatedBus::new());
    bus.inspect_mut(|sim| sim.set_nack(ssd1306::DEFAULT_ADDRESS, true))
        .unwrap();

    let mut task = build_task(&quick_config(), &bus);
    assert!(task.start().is_err());
    assert_ne!(task.state(), TaskState::Running);

    let sensor_reads = bus
        .inspect(|sim| {
            sim.transactions()
                .iter()
                .filter(|t| matches!(t.kind, TransactionKind::Read { .. }))
                .count()
        })
        .unwrap();
    assert_eq!(sensor_reads, 0);
}

#[test]
fn test_long_run_keeps_transaction_log_bounded() {
    let bus = SharedBus::new(SimulatedBus::new());
    let mut task = build_task(&quick_config(), &bus);
    task.start().unwrap();
    let after_start = bus.inspect(SimulatedBus::total_transactions).unwrap();

    for _ in 0..2_000 {
        task.run_iteration();
    }

    let (logged, total) = bus
        .inspect(|sim| (sim.transactions().len(), sim.total_transactions()))
        .unwrap();
    assert_eq!(logged, TRANSACTION_LOG_DEPTH);
    assert!(total > after_start + TRANSACTION_LOG_DEPTH as u64);
}

/// Stamps every sensor data read with the (paused) tokio clock.
struct TimedBus {
    inner: SimulatedBus,
    reads: Vec<Instant>,
}

impl BusTransport for TimedBus {
    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), BusError> {
        self.inner.write(address, register, data)
    }

    fn read(&mut self, address: u8, register: u8, buf: &mut [u8]) -> Result<(), BusError> {
        if address == ap3216c::DEFAULT_ADDRESS {
            self.reads.push(Instant::now());
        }
        self.inner.read(address, register, buf)
    }

    fn receive(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.inner.receive(address, buf)
    }
}

#[tokio::test(start_paused = true)]
async fn test_next_read_one_period_after_failure() {
    let mut inner = SimulatedBus::new();
    inner.set_light(SensorReading::new(10, 20, 30));
    inner.fail_reads(ap3216c::DEFAULT_ADDRESS, 1);
    let bus = SharedBus::new(TimedBus {
        inner,
        reads: Vec::new(),
    });

    let mut config = quick_config();
    config.task.period_ms = 250;
    let period = config.task.period();
    let task = build_task(&config, &bus);

    let (stop, signal) = stop_channel();
    let running = tokio::spawn(task.run(signal));

    tokio::time::sleep(period * 2 + period / 2).await;
    stop.stop();
    let stats = running.await.unwrap().unwrap();

    assert_eq!(stats.iterations, 3);
    assert_eq!(stats.read_failures, 1);
    assert_eq!(stats.rendered, 2);

    let reads = bus.inspect(|b| b.reads.clone()).unwrap();
    assert_eq!(reads.len(), 3);
    assert_eq!(reads[1] - reads[0], period);
    assert_eq!(reads[2] - reads[1], period);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_observed_after_the_wait() {
    let bus = SharedBus::new(SimulatedBus::new());
    let task = build_task(&quick_config(), &bus);
    let (stop, signal) = stop_channel();

    // Raised before the first iteration: one full cycle still runs.
    stop.stop();
    let started = Instant::now();
    let stats = task.run(signal).await.unwrap();

    assert_eq!(stats.iterations, 1);
    assert_eq!(started.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_sensor_settle_waits_on_the_runtime_clock() {
    let bus = SharedBus::new(SimulatedBus::new());
    let mut config = quick_config();
    config.sensor.reset_settle_ms = 50;
    let task = build_task(&config, &bus);
    let (stop, signal) = stop_channel();

    stop.stop();
    let started = Instant::now();
    let stats = task.run(signal).await.unwrap();

    // A thread sleep would leave the paused clock at one period.
    assert_eq!(stats.iterations, 1);
    assert_eq!(started.elapsed(), Duration::from_millis(1050));
}
