//! Command line front end for the smart switch harness.
//!
//! Usage:
//!   smartswitch-harness list
//!   smartswitch-harness run [SCENARIO]... [--endpoint 2 --endpoint 3]
//!   smartswitch-harness monitor [--seconds 30]
//!   smartswitch-harness bind genLevelCtrl --endpoint 2

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use smartswitch_harness::config::{self, HarnessConfig};
use smartswitch_harness::device::{SerialDevice, SmartSwitch};
use smartswitch_harness::input::mqtt::{BindRequest, Cluster, EndpointPath, ZigbeeBridge};
use smartswitch_harness::input::serial::{SerialLink, SerialWatcher};
use smartswitch_harness::instance_lock::InstanceLock;
use smartswitch_harness::scenarios::Scenario;
use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;
use strum::IntoEnumIterator;

/// Poll slice used by the monitor so the exit deadline is checked regularly.
const MONITOR_SLICE: Duration = Duration::from_secs(1);

/// Grace period for the event loop to flush a fire-and-forget request.
const PUBLISH_FLUSH: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "smartswitch-harness")]
#[command(about = "Hardware-in-the-loop tests for a Zigbee smart switch")]
struct Cli {
    /// Serial port the switch is attached to
    #[arg(long, env = "SERIAL_PORT")]
    port: Option<String>,

    /// zigbee2mqtt friendly name of the switch
    #[arg(long, env = "DEVICE_NAME")]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available scenarios
    List,
    /// Run scenarios against the device (all of them if none are given)
    Run {
        scenarios: Vec<Scenario>,

        /// Switch endpoint(s) to test
        #[arg(long = "endpoint", default_values_t = [2u8, 3u8])]
        endpoints: Vec<u8>,

        /// Continue with the next scenario after a failure
        #[arg(long)]
        keep_going: bool,
    },
    /// Print serial lines and state reports as they arrive
    Monitor {
        /// Stop after this many seconds (default: until Ctrl+C)
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Bind a cluster of an endpoint to the coordinator
    Bind {
        cluster: Cluster,
        #[arg(long, default_value_t = 2)]
        endpoint: u8,
    },
    /// Remove a binding created with `bind`
    Unbind {
        cluster: Cluster,
        #[arg(long, default_value_t = 2)]
        endpoint: u8,
    },
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

struct Session {
    _lock: InstanceLock,
    device: SerialDevice,
    bridge: ZigbeeBridge,
}

async fn open_session(config: &HarnessConfig) -> Result<Session, Box<dyn Error>> {
    let lock = InstanceLock::acquire(&config.serial.port)?;

    let (link, lines) = SerialLink::open(&config.serial)?;
    let device = SerialDevice::new(
        Box::new(link),
        SerialWatcher::new(lines),
        config.timeouts.serial(),
    );

    let bridge = ZigbeeBridge::connect(
        &config.mqtt,
        config.device.name.clone(),
        config.timeouts.mqtt(),
    )
    .await?;

    Ok(Session {
        _lock: lock,
        device,
        bridge,
    })
}

async fn run_scenarios(
    config: &HarnessConfig,
    scenarios: Vec<Scenario>,
    endpoints: Vec<u8>,
    keep_going: bool,
) -> Result<ExitCode, Box<dyn Error>> {
    let scenarios = if scenarios.is_empty() {
        Scenario::iter().collect()
    } else {
        scenarios
    };

    let session = open_session(config).await?;
    let _lock = session._lock;
    let mut parts = (session.device, session.bridge);
    let mut passed = 0usize;
    let mut failed = Vec::new();

    'endpoints: for ep in endpoints {
        let (device, bridge) = parts;
        let mut switch = SmartSwitch::new(
            device,
            bridge,
            ep,
            SmartSwitch::default_z2m_name(ep),
            config.device.coordinator.clone(),
        )
        .await?;

        for scenario in &scenarios {
            match scenario.run_prepared(&mut switch).await {
                Ok(()) => {
                    info!("PASS {} [{}]", scenario, switch.z2m_name());
                    passed += 1;
                }
                Err(e) => {
                    error!("FAIL {} [{}]: {}", scenario, switch.z2m_name(), e);
                    failed.push(format!("{} [{}]", scenario, switch.z2m_name()));
                    if e.is_fatal() {
                        error!("Aborting session");
                        parts = switch.into_parts();
                        break 'endpoints;
                    }
                    if !keep_going {
                        parts = switch.into_parts();
                        break 'endpoints;
                    }
                }
            }
        }

        parts = switch.into_parts();
    }
    drop(parts);

    info!("{} passed, {} failed", passed, failed.len());
    for name in &failed {
        warn!("  failed: {}", name);
    }

    Ok(if failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn monitor(config: &HarnessConfig, seconds: Option<u64>) -> Result<ExitCode, Box<dyn Error>> {
    let mut session = open_session(config).await?;
    session.bridge.subscribe().await?;

    let deadline = seconds.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));
    info!("Monitoring {} and {}", config.serial.port, session.bridge.observer().topic());

    loop {
        if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
            break;
        }

        tokio::select! {
            found = session.device.watcher().wait_for_line("", MONITOR_SLICE) => match found {
                Ok(found) => info!("[SERIAL] {}", found.line.text),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(_) => {}
            },
            msg = session.bridge.observer().wait_next_message(MONITOR_SLICE) => match msg {
                Ok(msg) => info!("[MQTT] {}", serde_json::Value::Object(msg.payload)),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(_) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn binding(
    config: &HarnessConfig,
    cluster: Cluster,
    endpoint: u8,
    bind: bool,
) -> Result<ExitCode, Box<dyn Error>> {
    let bridge = ZigbeeBridge::connect(
        &config.mqtt,
        config.device.name.clone(),
        config.timeouts.mqtt(),
    )
    .await?;

    let request = BindRequest::new(
        cluster,
        EndpointPath::new(config.device.name.clone(), endpoint),
        config.device.coordinator.clone(),
    );
    if bind {
        bridge.bind(&request).await?;
    } else {
        bridge.unbind(&request).await?;
    }

    // Give the event loop a moment to send the request
    tokio::time::sleep(PUBLISH_FLUSH).await;
    Ok(ExitCode::SUCCESS)
}

async fn run(cli: Cli, mut config: HarnessConfig) -> Result<ExitCode, Box<dyn Error>> {
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if let Some(device) = cli.device {
        config.device.name = device;
    }

    match cli.command {
        Commands::List => {
            for scenario in Scenario::iter() {
                println!("{:<28} {}", scenario.to_string(), scenario.description());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            scenarios,
            endpoints,
            keep_going,
        } => run_scenarios(&config, scenarios, endpoints, keep_going).await,
        Commands::Monitor { seconds } => monitor(&config, seconds).await,
        Commands::Bind { cluster, endpoint } => binding(&config, cluster, endpoint, true).await,
        Commands::Unbind { cluster, endpoint } => binding(&config, cluster, endpoint, false).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file before anything else
    config::load_dotenv();
    init_logger();

    let cli = Cli::parse();
    let config = HarnessConfig::from_env();

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
