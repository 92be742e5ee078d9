use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use hidscript::config::Config;
use hidscript::console::Console;
use hidscript::device::Device;
use hidscript::display::{Monitor, PlainMonitor, TermMonitor};
use hidscript::flash::SimulatedFlash;
use hidscript::host::Host;
use hidscript::input::{Input, PipeInput, TermInput};
use hidscript::store::ScriptStore;

/// Scriptable keyboard/mouse emulator, simulated on the host
#[derive(Parser)]
#[command(name = "hidscript")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// flash image file; overrides flash.image from the config
    #[arg(long)]
    image: Option<PathBuf>,

    /// read commands from stdin and print replies, no terminal UI
    #[arg(long)]
    headless: bool,

    /// stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,

    /// log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// write logs here instead of stderr (stderr logging is off under the terminal UI)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = |default: &str| {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };
    match &cli.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter(&cli.log_level))
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            // the terminal UI owns the screen
            let level = if cli.headless { cli.log_level.as_str() } else { "off" };
            tracing_subscriber::fmt()
                .with_env_filter(filter(level))
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    // initialise
    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    config.validate()?;
    let f = &config.flash;
    let mut flash = SimulatedFlash::new(config.medium_base(), f.page_size, f.pages)?;
    if let Some(path) = cli.image.as_ref().or(f.image.as_ref()) {
        flash = flash
            .with_image(path)
            .with_context(|| format!("opening flash image {}", path.display()))?;
    }
    let store = ScriptStore::new(flash, f.base_address, config.region_capacity());
    let device = Device::new(store, &config);
    let console = Console::from_config(&config.console);
    let interval = Duration::from_micros(config.engine.tick_interval_us);

    let (mut input, mut monitor): (Box<dyn Input>, Box<dyn Monitor>) = if cli.headless {
        (
            Box::new(PipeInput::stdin(cli.ticks.is_none())),
            Box::new(PlainMonitor::new()),
        )
    } else {
        (Box::new(TermInput::new()?), Box::new(TermMonitor::new()?))
    };

    let mut host = Host::new(device, console, input.as_mut(), monitor.as_mut(), interval);
    let ticks = host.run(cli.ticks)?;
    drop(host);
    drop(monitor);
    drop(input);

    // leave the shell prompt on a clean line
    println!();
    tracing::info!(ticks, "done");
    Ok(())
}
