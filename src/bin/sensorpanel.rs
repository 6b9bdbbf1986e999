use clap::{App, Arg};
use colored::*;
use sensorpanel::devices::ssd1306;
use sensorpanel::simulator::{Addresses, LightSource, SimulatedBus};
use sensorpanel::{entry, PanelConfig, SharedBus};
use std::time::Duration;
use tokio::time;
use tracing::{info, warn, Level};

fn parse_u64(value: String) -> Result<(), String> {
    value
        .parse::<u64>()
        .map(|_| ())
        .map_err(|_| format!("'{value}' is not a non-negative integer"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("sensorpanel")
        .version("0.1.0")
        .about("AP3216C light/proximity readings on an SSD1306 panel, against a simulated I2C bus")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON panel configuration")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("period-ms")
                .short("p")
                .long("period-ms")
                .value_name("MS")
                .help("Override the sampling period")
                .takes_value(true)
                .validator(parse_u64),
        )
        .arg(
            Arg::with_name("duration")
                .short("d")
                .long("duration")
                .value_name("SECONDS")
                .help("Stop after this many seconds instead of waiting for Ctrl+C")
                .takes_value(true)
                .validator(parse_u64),
        )
        .arg(
            Arg::with_name("show-display")
                .short("s")
                .long("show-display")
                .help("Draw the simulated OLED contents in the terminal every period"),
        )
        .arg(
            Arg::with_name("fail-every")
                .long("fail-every")
                .value_name("N")
                .help("Fail every Nth sensor read on the simulated bus")
                .takes_value(true)
                .validator(parse_u64),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .multiple(true)
                .help("More log output (-v debug, -vv trace)"),
        )
        .get_matches();

    let level = match matches.occurrences_of("verbose") {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = match matches.value_of("config") {
        Some(path) => PanelConfig::load(path)?,
        None => PanelConfig::default(),
    };
    if let Some(period) = matches.value_of("period-ms") {
        config.task.period_ms = period.parse()?;
    }
    config.validate()?;

    let mut sim = SimulatedBus::with_addresses(Addresses {
        expander: config.expander.address,
        sensor: config.sensor.address,
        display: config.display.address,
    });
    sim.set_light_source(LightSource::Drifting { tick: 0 });
    if let Some(every) = matches.value_of("fail-every") {
        sim.fail_every_nth_read(config.sensor.address, every.parse()?);
    }
    let bus = SharedBus::new(sim);

    println!("{}", "Sensor Panel".bright_blue().bold());
    println!(
        "{} {} every {} ms",
        "Task".dimmed(),
        config.task.name.bright_cyan(),
        config.task.period_ms
    );

    let Some(handle) = entry::launch(&config, &bus) else {
        println!("{} {}", "✗".red(), "could not create the acquisition task".bright_red());
        return Err("task creation failed".into());
    };

    let show_display = matches.is_present("show-display");
    let deadline = matches
        .value_of("duration")
        .map(str::parse::<u64>)
        .transpose()?
        .map(|secs| time::Instant::now() + Duration::from_secs(secs));

    let mut refresh = time::interval(config.task.period());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupt received");
                break;
            }
            _ = refresh.tick() => {
                if handle.is_finished() {
                    warn!("acquisition task exited on its own");
                    break;
                }
                if deadline.is_some_and(|d| time::Instant::now() >= d) {
                    break;
                }
                if show_display {
                    let frame = bus.inspect(render_frame)?;
                    // Home the cursor so frames overwrite each other.
                    print!("\x1b[H\x1b[2J{frame}");
                }
            }
        }
    }

    let outcome = tokio::task::spawn_blocking(move || handle.shutdown()).await?;
    match outcome {
        Ok(stats) => {
            println!("{} {}", "✓".green(), "pipeline stopped".bright_green());
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e.to_string().bright_red());
            Err(e.into())
        }
    }
}

/// Two pixel rows per terminal line.
fn render_frame(sim: &SimulatedBus) -> String {
    let mut out = String::with_capacity((ssd1306::WIDTH + 3) * (ssd1306::HEIGHT / 2 + 2) * 3);
    let border = "─".repeat(ssd1306::WIDTH);
    out.push('┌');
    out.push_str(&border);
    out.push_str("┐\n");
    for y in (0..ssd1306::HEIGHT).step_by(2) {
        out.push('│');
        for x in 0..ssd1306::WIDTH {
            out.push(match (sim.display_pixel(x, y), sim.display_pixel(x, y + 1)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push_str("│\n");
    }
    out.push('└');
    out.push_str(&border);
    out.push_str("┘\n");
    if !sim.display_on() {
        out.push_str("(panel off)\n");
    }
    out
}
