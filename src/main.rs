use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use treebot_link::domain::settings::SettingsService;
use treebot_link::infrastructure::logging::init_logger;
use treebot_link::presentation::console::{self, Console, ConsoleCommand};
use treebot_link::{default_transport, ConnectionManager, KeepAlive, LinkConfig};

/// Console for the TreeBot harvesting controller link.
#[derive(Parser, Debug)]
#[command(name = "treebot-link", version, about)]
struct Args {
    /// Device address to connect to at start-up (e.g. AA:BB:CC:DD:EE:FF)
    #[arg(short, long)]
    address: Option<String>,

    /// Do not reconnect automatically after a dropped link
    #[arg(long)]
    no_auto_reconnect: bool,

    /// Settings file to use instead of the one in the config directory
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings_service = match args.settings {
        Some(path) => SettingsService::load_from(path),
        None => SettingsService::new()?,
    };

    let _logging_guard = init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting TreeBot link console");

    let mut config = LinkConfig::from(settings_service.get());
    if args.no_auto_reconnect {
        config.auto_reconnect = false;
    }
    let keepalive_interval = settings_service.get().keepalive_interval();
    let keepalive_command = settings_service.get().keepalive_command.clone();
    let startup_address = args
        .address
        .or_else(|| settings_service.get().last_connected_address.clone());
    let settings = Arc::new(Mutex::new(settings_service));

    let manager = ConnectionManager::new(default_transport(), config);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    manager.register_event_sink(Arc::new(events_tx));
    let printer = tokio::spawn(console::print_events(
        events_rx,
        manager.clone(),
        settings.clone(),
    ));

    let keepalive = keepalive_interval
        .map(|interval| KeepAlive::spawn(manager.clone(), interval, keepalive_command));

    if let Some(address) = startup_address {
        manager.connect(&address).await;
    }

    println!("{}", console::HELP);
    let mut console = Console::new(manager.clone(), settings);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ConsoleCommand>() {
            Ok(command) => {
                if !console.execute(command).await {
                    break;
                }
            }
            Err(e) => {
                warn!("Rejected console input: {}", line.trim());
                println!("{}", e);
            }
        }
    }

    if let Some(keepalive) = keepalive {
        keepalive.stop().await;
    }
    manager.cleanup().await;
    let _ = printer.await;

    info!("TreeBot link console stopped");
    Ok(())
}
