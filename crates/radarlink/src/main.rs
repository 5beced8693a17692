//! `radarlink` - CLI for the radar relay
//!
//! This binary runs the relay server and offers offline tools for the
//! history log, raw captures and the radar render.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use radarlink::cli::{Cli, Command, ConfigCommand, DecodeCommand, HistoryCommand, RenderCommand, ServeCommand};
use radarlink::display::{render, SvgSurface};
use radarlink::link::{available_ports, SerialOpener};
use radarlink::relay::Relay;
use radarlink::server::{self, AppState};
use radarlink::simulation::Simulator;
use radarlink::{
    init_logging, BroadcastHub, Config, DisplayState, FrameDecoder, ModeController, SampleStore,
    SharedDisplay, StoreWriter,
};

/// How long shutdown waits for the controller and the history writer.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    // Execute the command
    match cli.command {
        Command::Serve(cmd) => handle_serve(&config, &cmd).await,
        Command::History(cmd) => handle_history(&config, &cmd),
        Command::Decode(cmd) => handle_decode(&config, &cmd),
        Command::Render(cmd) => handle_render(&config, &cmd),
        Command::Ports => handle_ports(),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

async fn handle_serve(config: &Config, cmd: &ServeCommand) -> anyhow::Result<()> {
    let store = SampleStore::open(config.history_path())?;
    info!("history log: {}", store.path().display());
    let (store_handle, writer) = StoreWriter::spawn(store.clone(), config.server.store_queue);
    let hub = Arc::new(BroadcastHub::new(config.server.broadcast_capacity));

    let (mode, controller) = ModeController::spawn(
        Arc::new(SerialOpener::new(config.link.clone())),
        config,
        Relay::new(store_handle, Arc::clone(&hub)),
        SharedDisplay::default(),
    );

    if cmd.connect {
        if let Err(e) = mode.connect().await {
            warn!("starting in simulation: {e}");
        }
    }

    let listener = TcpListener::bind(config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    let state = AppState::new(mode, hub, store, config.display.clone());
    server::serve(listener, state, shutdown_signal()).await?;

    info!("shutting down");
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = controller.await;
        let _ = writer.await;
    })
    .await;
    if drained.is_err() {
        warn!("history writer did not drain before shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

fn handle_history(config: &Config, cmd: &HistoryCommand) -> anyhow::Result<()> {
    let store = SampleStore::open(config.history_path())?;
    let samples = store.load_all()?;
    let skip = cmd
        .last
        .map_or(0, |n| samples.len().saturating_sub(n));
    let shown = &samples[skip..];

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(shown)?);
        return Ok(());
    }

    println!("History: {}", store.path().display());
    println!("{:<26} {:>6} {:>9}  {}", "Time", "Angle", "Distance", "Status");
    for sample in shown {
        println!(
            "{:<26} {:>5}° {:>7}cm  {}",
            sample.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            sample.angle,
            sample.distance,
            sample.status()
        );
    }
    println!("{} of {} samples", shown.len(), samples.len());
    Ok(())
}

fn handle_decode(config: &Config, cmd: &DecodeCommand) -> anyhow::Result<()> {
    let raw = match &cmd.file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    let mut decoder = FrameDecoder::new(&config.link);
    let mut decoded = 0usize;
    for sample in decoder.push(&raw) {
        println!("{}", serde_json::to_string(&sample)?);
        decoded += 1;
    }
    info!(
        decoded,
        dropped = decoder.dropped(),
        trailing = decoder.buffered().len(),
        "decode finished"
    );
    Ok(())
}

fn handle_render(config: &Config, cmd: &RenderCommand) -> anyhow::Result<()> {
    let mut simulator = Simulator::new(config.simulation.clone());
    let mut state = DisplayState::new();
    for _ in 0..cmd.ticks {
        for event in simulator.tick(Utc::now()) {
            state.apply(event);
        }
    }

    let mut surface = SvgSurface::new(config.display.width, config.display.height);
    render(&state, &mut surface, Utc::now());
    let svg = surface.finish();

    match &cmd.output {
        Some(path) => {
            std::fs::write(path, svg).with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{svg}"),
    }
    Ok(())
}

fn handle_ports() -> anyhow::Result<()> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Link]");
                println!("  Port:               {}", config.link.port);
                println!("  Baud rate:          {}", config.link.baud_rate);
                println!("  Frame delimiter:    {:?}", config.link.delimiter);
                println!("  Field separator:    {:?}", config.link.separator);
                println!("  Max frame bytes:    {}", config.link.max_frame_bytes);
                println!();
                println!("[Storage]");
                println!("  History log:        {}", config.history_path().display());
                println!();
                println!("[Server]");
                println!("  Listen:             {}", config.server.listen);
                println!();
                println!("[Simulation]");
                println!("  Tick (ms):          {}", config.simulation.tick_ms);
                println!(
                    "  Detection prob.:    {}",
                    config.simulation.detection_probability
                );
                println!(
                    "  Distance range:     {}..{} cm",
                    config.simulation.distance_min, config.simulation.distance_max
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
