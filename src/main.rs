pub mod broker;
pub mod config;
pub mod console;
pub mod device;
pub mod message;
pub mod orchestrator;
pub mod telemetry;
pub mod unit;

use crate::config::Config;
use crate::orchestrator::Orchestrator;
use color_eyre::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const CONSOLE_CAPACITY: usize = 32;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = config::config_path();
    let loaded = Config::load_from(&config_path).await?;
    let from_file = loaded.is_some();
    let config = loaded.unwrap_or_default();

    setup_logging(config.log.max_level());
    if from_file {
        info!("Loaded config from {}", config_path.display());
    } else {
        info!("No config at {}, using defaults", config_path.display());
    }
    info!("Starting fleet simulator with config: {:?}", config);

    let (lines, _console_task) = console::spawn_stdin_reader(CONSOLE_CAPACITY);
    Orchestrator::new(config).run(lines).await;

    println!("\nexit");
    // stdin may still be held by a blocking read; leave without draining units
    std::process::exit(0);
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}
