//! One-shot sender that goes through the same serialized queue as the bridge.
//!
//! Usage:
//!   cargo run --bin rf-send -- "Living Room Lamp" on
//!   cargo run --bin rf-send -- --config ./config.json 5330371:5330380 off

use clap::{Parser, ValueEnum};
use log::{error, info};
use rf_switch_bridge::Bridge;
use rf_switch_bridge::config::{self, Config};
use rf_switch_bridge::instance_lock::InstanceLock;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Clone, Copy, ValueEnum)]
enum Power {
    On,
    Off,
}

#[derive(Parser)]
#[command(name = "rf-send")]
#[command(about = "Switch one configured RF device on or off")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, short, env = "RF_SWITCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log the code instead of keying the transmitter
    #[arg(long)]
    dry_run: bool,

    /// Device name or serial (`<on_code>:<off_code>`)
    device: String,

    power: Power,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> rf_switch_bridge::Result<()> {
    let path = cli.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load(&path)?;
    config.transmitter.dry_run |= cli.dry_run;

    // Fails if the bridge itself is running on this pin.
    let _lock = InstanceLock::acquire(config.gpio)?;

    let bridge = Bridge::start(&config)?;
    let on = matches!(cli.power, Power::On);
    let result = bridge.registry().set_power(&cli.device, on).await;
    bridge.shutdown().await;
    result?;

    info!(
        "{} switched {}",
        cli.device,
        if on { "on" } else { "off" }
    );
    Ok(())
}
