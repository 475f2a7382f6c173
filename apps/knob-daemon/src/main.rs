//! Knob Daemon - headless host for the knob bridge synchronization engine.
//!
//! Runs the same engine as the firmware without a display. UI events are
//! written to the log instead of being rendered, and stdin line commands
//! stand in for the rotary encoder and touch surface.

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use knob_core::{
    CacheDelta, JsonFileConfigStore, KnobServices, ManualPowerMonitor, PowerEvent, ScreenKind,
    StatusEvent, SyncEvent, UiEvent, ZoneEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::commands::{Command, HELP};
use crate::config::DaemonConfig;

/// Knob Daemon - mirrors a music zone from the bridge, driven from stdin.
#[derive(Parser, Debug)]
#[command(name = "knob-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "KNOB_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bridge base URL (overrides config file and stored address).
    #[arg(short, long, env = "KNOB_BRIDGE")]
    bridge: Option<String>,

    /// Zone id to control (overrides config file and stored zone).
    #[arg(short, long, env = "KNOB_ZONE")]
    zone: Option<String>,

    /// File holding the persisted bridge configuration.
    #[arg(short, long, value_name = "FILE", env = "KNOB_STATE_FILE")]
    state_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    log::info!("Knob Daemon v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        DaemonConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(bridge) = args.bridge {
        config.bridge = Some(bridge);
    }
    if let Some(zone) = args.zone {
        config.zone = Some(zone);
    }
    if let Some(state_file) = args.state_file {
        config.state_file = state_file;
    }

    log::info!(
        "Configuration: bridge={}, zone={}, state_file={}",
        config.bridge.as_deref().unwrap_or("discover"),
        config.zone.as_deref().unwrap_or("auto"),
        config.state_file.display()
    );

    let power = Arc::new(ManualPowerMonitor::default());
    power.set_charging(!config.on_battery);

    let mut builder = KnobServices::builder(config.to_engine_config())
        .store(Arc::new(JsonFileConfigStore::at_file(&config.state_file)))
        .power(power);
    if let Some(bridge) = config.bridge.clone() {
        builder = builder.bridge_base(bridge);
    }
    if let Some(zone) = config.zone.clone() {
        builder = builder.zone(zone);
    }
    let (services, ui_rx) = builder.build().context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let ui_handle = tokio::spawn(drain_ui(ui_rx));

    services.start();
    services.engine.set_network_connecting();
    services.network_up();

    let input_services = services.clone();
    let input_handle = tokio::spawn(async move { read_commands(input_services).await });

    log::info!("Ready. Type 'help' for commands.");

    tokio::select! {
        _ = shutdown_signal() => log::info!("Shutdown signal received, cleaning up..."),
        _ = services.cancel_token.cancelled() => {}
    }

    if !services.stop().await {
        log::warn!("Poll loop did not stop cleanly");
    }
    input_handle.abort();
    ui_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Reads commands from stdin until EOF or `quit`.
async fn read_commands(services: KnobServices) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                log::info!("[Input] stdin closed");
                return;
            }
            Err(e) => {
                log::error!("[Input] Failed to read stdin: {}", e);
                return;
            }
        };

        if line.trim() == "help" {
            println!("{}", HELP);
            continue;
        }
        match commands::parse(&line) {
            Ok(Some(command)) => execute(&services, command).await,
            Ok(None) => {}
            Err(e) => log::warn!("[Input] {:#}", e),
        }
    }
}

async fn execute(services: &KnobServices, command: Command) {
    let engine = &services.engine;
    match command {
        Command::Input(input) => {
            let outcome = services.dispatcher.handle_input(input).await;
            log::info!("[Input] {:?} -> {:?}", input, outcome);
        }
        Command::Action(action) => {
            let outcome = services.dispatcher.handle_action(action.clone()).await;
            log::info!("[Input] {:?} -> {:?}", action, outcome);
        }
        Command::SelectZone(zone_id) => {
            if let Err(e) = services.dispatcher.select_zone(&zone_id) {
                log::warn!("[Input] {}", e);
            }
        }
        Command::ListZones => {
            let (zones, selected) = engine.zones();
            if zones.is_empty() {
                log::info!("[Input] No zones known yet");
            }
            for zone in zones {
                let marker = if selected.as_deref() == Some(zone.zone_id.as_str()) {
                    "*"
                } else {
                    " "
                };
                log::info!("[Input] {} {} ({})", marker, zone.zone_name, zone.zone_id);
            }
        }
        Command::Network { up: true } => services.network_up(),
        Command::Network { up: false } => services.network_down(),
        Command::Poll => engine.trigger_poll(),
        Command::Status => {
            let retry = engine.bridge_retry_info();
            log::info!(
                "[Input] state={:?} bridge={} ({}) connected={} attempts={}/{}{}",
                engine.device_state(),
                engine.bridge_url().as_deref().unwrap_or("none"),
                if engine.bridge_from_discovery() {
                    "discovered"
                } else {
                    "manual"
                },
                engine.is_bridge_connected(),
                retry.attempt,
                retry.max,
                if retry.searching { " searching" } else { "" }
            );
            if let Some(url) = engine.artwork_url(240, 240, Some(120)) {
                log::info!("[Input] artwork {}", url);
            }
        }
        Command::Quit => services.cancel_token.cancel(),
    }
}

/// Logs every UI event, standing in for the renderer.
async fn drain_ui(mut rx: UnboundedReceiver<UiEvent>) {
    while let Some(event) = rx.recv().await {
        render(&event);
    }
}

fn render(event: &UiEvent) {
    match event {
        UiEvent::Sync(SyncEvent::Manifest { delta }) => match delta {
            CacheDelta::Full {
                manifest,
                nav_index,
            } => {
                let screens: Vec<String> = manifest
                    .screens
                    .iter()
                    .map(|screen| format!("{}:{}", screen.id, screen_kind(&screen.kind)))
                    .collect();
                log::info!(
                    "[UI] Layout {} [{}], showing #{}",
                    manifest.sha,
                    screens.join(", "),
                    nav_index
                );
                log_fast(delta);
            }
            CacheDelta::FastOnly { .. } => log_fast(delta),
        },
        UiEvent::Sync(SyncEvent::Online { online }) => {
            log::info!("[UI] Bridge {}", if *online { "online" } else { "offline" });
        }
        UiEvent::Sync(SyncEvent::DeviceState { state }) => log::info!("[UI] Device {:?}", state),
        UiEvent::Status(StatusEvent::Network { status: Some(status) }) => {
            log::warn!("[UI] {}", status.to_string().replace('\n', " - "));
        }
        UiEvent::Status(StatusEvent::Network { status: None }) => log::info!("[UI] Banner cleared"),
        UiEvent::Status(StatusEvent::Message { text }) => {
            log::info!("[UI] {}", text.replace('\n', " - "));
        }
        UiEvent::Zone(ZoneEvent::Name { name }) => log::info!("[UI] Zone: {}", name),
        UiEvent::Zone(ZoneEvent::Directory { zones, .. }) => {
            log::debug!("[UI] {} zone(s) listed", zones.len());
        }
        UiEvent::Input(feedback) => log::debug!("[UI] {:?}", feedback),
        UiEvent::Power(PowerEvent::Charging {
            charging,
            battery_level,
        }) => log::info!("[UI] Charging={} battery={:?}", charging, battery_level),
    }
}

fn log_fast(delta: &CacheDelta) {
    let fast = delta.fast();
    log::debug!(
        "[UI] {} vol {} ({}..{}) {}s/{}s",
        if fast.is_playing { "playing" } else { "stopped" },
        fast.volume,
        fast.volume_min,
        fast.volume_max,
        fast.seek_position,
        fast.length
    );
}

fn screen_kind(kind: &ScreenKind) -> &'static str {
    match kind {
        ScreenKind::Media(_) => "media",
        ScreenKind::List(_) => "list",
        ScreenKind::Card(_) => "card",
        ScreenKind::Progress(_) => "progress",
        ScreenKind::Status(_) => "status",
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
