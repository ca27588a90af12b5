// firebot - operator console for the FireBot rover
// Reads commands from stdin, prints telemetry and connection changes

use clap::{Parser, ValueEnum};
use firebot_link::transport::GattCentral;
use firebot_link::{Command, ConnectTarget, ConnectivityBridge, LinkConfig, TransportKind};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Ble,
    Relay,
    Direct,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Ble => TransportKind::Ble,
            TransportArg::Relay => TransportKind::Relay,
            TransportArg::Direct => TransportKind::Direct,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "firebot", version, about = "Drive the FireBot rover over BLE, the local relay or its Wi-Fi")]
struct Args {
    /// Transport to use (overrides the config file)
    #[arg(short, long, value_enum)]
    transport: Option<TransportArg>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Relay or rover base URL, e.g. http://192.168.4.1
    #[arg(short, long)]
    address: Option<String>,

    /// Status poll period for the direct transport
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// BLE scan window before picking a rover
    #[arg(long)]
    scan_secs: Option<u32>,

    /// Also echo commands over the relay push channel
    #[arg(long)]
    mirror_commands: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(args: &Args) -> Result<LinkConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => LinkConfig::load(path)?,
        None => LinkConfig::default(),
    };

    if let Some(kind) = args.transport {
        config.transport = kind.into();
    }
    if let Some(ms) = args.poll_interval_ms {
        config.direct = config.direct.with_poll_interval_ms(ms);
    }
    if let Some(secs) = args.scan_secs {
        config.ble = config.ble.with_scan_duration_secs(secs);
    }
    if args.mirror_commands {
        config.relay = config.relay.with_mirror_commands(true);
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "btleplug")]
fn gatt_central(config: &LinkConfig) -> Arc<dyn GattCentral> {
    let scan = std::time::Duration::from_secs(u64::from(config.ble.scan_duration_secs));
    Arc::new(firebot_link::transport::BtleplugCentral::new(scan))
}

#[cfg(not(feature = "btleplug"))]
fn gatt_central(_config: &LinkConfig) -> Arc<dyn GattCentral> {
    Arc::new(firebot_link::transport::UnavailableCentral)
}

fn print_help() {
    println!("commands:");
    for command in Command::ALL {
        println!("  {:<22} (wire {})", command.name(), command.wire_token());
    }
    println!("  status                 show connection and last sensor reading");
    println!("  quit                   disconnect and exit");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(&args)?;

    let transport = config.build_transport(gatt_central(&config))?;
    let bridge = ConnectivityBridge::new(transport);

    bridge.on_sensor_data(|state| {
        println!(
            "telemetry: fire={} pump={}",
            if state.fire_detected { "DETECTED" } else { "clear" },
            if state.pump_active { "on" } else { "off" }
        );
    });
    bridge.on_connection_change(|connected| {
        println!("link {}", if connected { "up" } else { "down" });
    });

    let target = match &args.address {
        Some(address) => ConnectTarget::address(address),
        None => ConnectTarget::Default,
    };

    info!(transport = %config.transport, "starting");
    if let Err(e) = bridge.connect(target).await {
        if e.should_alert() {
            error!(error = %e, "could not connect");
        }
        return Err(e.into());
    }

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => continue,
            "quit" | "exit" => break,
            "help" => print_help(),
            "status" => println!(
                "state={} last={:?} error={:?}",
                bridge.state(),
                bridge.latest_sensor_state(),
                bridge.last_error()
            ),
            token => {
                if let Err(e) = bridge.send_token(token).await {
                    println!("rejected: {}", e);
                }
            }
        }
    }

    bridge.disconnect().await;
    Ok(())
}
