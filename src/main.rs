use clap::Parser;
use log::{error, info};
use rf_switch_bridge::Bridge;
use rf_switch_bridge::config::{self, Config};
use rf_switch_bridge::input::mqtt::MqttIntegration;
use rf_switch_bridge::instance_lock::InstanceLock;
use std::path::PathBuf;
use tokio::signal;

#[derive(Parser)]
#[command(name = "rf-switch-bridge")]
#[command(about = "Expose RF-controlled switches to smart-home controllers")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, short, env = "RF_SWITCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log codes instead of keying the transmitter
    #[arg(long)]
    dry_run: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Before the runtime starts: load_dotenv mutates the process environment.
    config::load_dotenv();
    init_logger();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(cli)) {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> rf_switch_bridge::Result<()> {
    info!("Starting RF Switch Bridge");

    let path = cli.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load(&path)?;
    if cli.dry_run {
        config.transmitter.dry_run = true;
    }
    info!("Configuration loaded from {:?}:", path);
    info!("  GPIO pin: {}", config.gpio);
    info!("  Devices: {}", config.devices.len());
    info!("  Transmitter: {}", config.transmitter.program);

    let _lock = InstanceLock::acquire(config.gpio)?;

    let bridge = Bridge::start(&config)?;
    let mqtt = MqttIntegration::new(config.mqtt.clone(), bridge.registry().clone())
        .start(bridge.cancellation());

    info!("RF Switch Bridge is running");
    info!("  - {} accessory(ies) ready", bridge.registry().len());
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    bridge.shutdown().await;
    if let Err(e) = mqtt.await {
        error!("MQTT task failed: {}", e);
    }

    info!("RF Switch Bridge stopped");
    Ok(())
}
