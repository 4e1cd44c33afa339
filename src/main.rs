//! VTX GW - Vox Valvetronix VT-X amplifier controller
//!
//! Connects to the amplifier over MIDI SysEx, mirrors its programs and
//! parameters, and exposes import/export of amp configurations.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vtx_gw::ampfile::{self, FullAmpFile};
use vtx_gw::config::AppConfig;
use vtx_gw::midi::{discovery, DeviceLink};
use vtx_gw::paths::AppPaths;
use vtx_gw::store::{AMPFX_SLOTS, USER_BANKS};
use vtx_gw::sync::{StatusEvent, SyncHandle, SyncState, Synchronizer};

/// How long to wait for the initial device sync before giving up.
const SYNC_WAIT: Duration = Duration::from_secs(15);

/// VTX GW - control a Vox Valvetronix VT-X amplifier over MIDI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the detected data dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the amplifier and mirror its state until interrupted
    Run,
    /// List available MIDI ports
    ListPorts,
    /// Export the full amp configuration (or just the current program)
    /// to a JSON file
    Export {
        /// Output file
        output: PathBuf,
        /// Export only the current program
        #[arg(long)]
        current: bool,
    },
    /// Import a full amp configuration from a JSON file and push it to
    /// the device
    Import {
        /// Input file
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let paths = AppPaths::detect();
    paths.ensure_directories()?;

    let _log_guard = init_logging(&args.log_level, &paths)?;

    info!("Starting VTX GW...");
    info!("Data directory: {}", paths.base_dir().display());

    let config_path = args.config.unwrap_or_else(|| paths.config.clone());
    let config = AppConfig::load(&config_path)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config, &paths).await,
        Command::ListPorts => {
            list_ports_formatted();
            Ok(())
        }
        Command::Export { output, current } => export(config, &paths, &output, current).await,
        Command::Import { input } => import(config, &paths, &input).await,
    }
}

async fn run(config: AppConfig, paths: &AppPaths) -> Result<()> {
    let handle = start_sync(&config, paths)?;

    handle
        .subscribe(Arc::new(|event: &StatusEvent| match event {
            StatusEvent::CommunicationFailure => warn!("Device communication failure"),
            StatusEvent::AbsentDevice => warn!("No amplifier answered"),
            StatusEvent::NotConnected(direction) => {
                warn!(?direction, "Transport direction refused to open")
            }
            StatusEvent::DataError { command } => warn!(command, "Device data error"),
            other => info!(?other, "Device status"),
        }))
        .await;

    if config.midi.auto_connect || config.session_mode {
        handle.connect();
    } else {
        info!("auto_connect disabled; waiting for a manual connect");
    }

    // under a session manager, the previous session's edit buffer is
    // restored once the device is reachable
    let session_file = paths.base_dir().join("session.json");
    if config.session_mode {
        match ampfile::load_full(&session_file) {
            Ok(file) => {
                if wait_for_sync(&handle).await.is_ok() {
                    handle.set_current_program(file.current_program);
                    info!(path = %session_file.display(), "Session state restored");
                } else {
                    warn!("Device not reachable, session state not restored");
                }
            }
            Err(err) => info!(%err, "No previous session state"),
        }
    }

    shutdown_signal().await;

    if config.session_mode {
        match handle.store_snapshot().await {
            Some(store) => match ampfile::export_full(&session_file, &store) {
                Ok(()) => info!(path = %session_file.display(), "Session state saved"),
                Err(err) => warn!(%err, "Session state not saved"),
            },
            None => warn!("Synchronizer gone, session state not saved"),
        }
    }

    handle.disconnect();
    handle.shutdown();
    info!("VTX GW shutdown complete");
    Ok(())
}

async fn export(
    config: AppConfig,
    paths: &AppPaths,
    output: &std::path::Path,
    current_only: bool,
) -> Result<()> {
    let handle = start_sync(&config, paths)?;
    handle.connect();
    wait_for_sync(&handle).await?;

    if current_only {
        let program = handle
            .current_program()
            .await
            .context("synchronizer terminated")?;
        ampfile::export_program(output, &program)?;
        info!(path = %output.display(), program = %program.name, "Exported current program");
    } else {
        let store = handle
            .store_snapshot()
            .await
            .context("synchronizer terminated")?;
        ampfile::export_full(output, &store)?;
        info!(path = %output.display(), "Exported full amp configuration");
    }

    handle.disconnect();
    handle.shutdown();
    Ok(())
}

async fn import(config: AppConfig, paths: &AppPaths, input: &std::path::Path) -> Result<()> {
    // validate the document before any device traffic
    let file: FullAmpFile = ampfile::load_full(input)?;
    info!(path = %input.display(), "Amp configuration validated");

    let handle = start_sync(&config, paths)?;
    handle.connect();
    wait_for_sync(&handle).await?;

    let mut failed = 0usize;
    for slot in 0..USER_BANKS as u8 {
        if let Err(err) = handle
            .write_program_to_bank(slot, file.banks[slot as usize].clone())
            .await
        {
            warn!(%err, slot, "Bank import failed");
            failed += 1;
        }
    }
    for slot in 0..AMPFX_SLOTS as u8 {
        if let Err(err) = handle
            .write_ampfx(slot, file.ampfxs[slot as usize].clone())
            .await
        {
            warn!(%err, slot, "AmpFx import failed");
            failed += 1;
        }
    }
    handle.set_current_program(file.current_program.clone());

    if failed > 0 {
        warn!(failed, "Import finished with failures");
    } else {
        info!("Import complete");
    }

    // let the outbound queue drain before tearing down
    sleep(Duration::from_millis(500)).await;
    handle.disconnect();
    handle.shutdown();
    Ok(())
}

/// Build the transport from config (or discovery) and spawn the actor.
fn start_sync(config: &AppConfig, paths: &AppPaths) -> Result<SyncHandle> {
    let (input_port, output_port) = if !config.midi.input_port.is_empty() {
        (
            config.midi.input_port.clone(),
            if config.midi.output_port.is_empty() {
                config.midi.input_port.clone()
            } else {
                config.midi.output_port.clone()
            },
        )
    } else {
        discovery::find_device_ports()
            .context("no amplifier port found; set midi.input_port in the config")?
    };

    let mut link = DeviceLink::new(&input_port, &output_port);
    let frame_rx = link
        .take_frame_receiver()
        .context("transport frame queue already taken")?;

    Ok(Synchronizer::spawn(
        Box::new(link),
        frame_rx,
        config.sync.clone(),
        Some(paths.programs_dir.clone()),
    ))
}

async fn wait_for_sync(handle: &SyncHandle) -> Result<()> {
    let deadline = tokio::time::Instant::now() + SYNC_WAIT;
    loop {
        match handle.state().await {
            Some(SyncState::Synced) => return Ok(()),
            Some(SyncState::Error) | None => bail!("device sync failed"),
            _ => {}
        }
        if tokio::time::Instant::now() > deadline {
            bail!("timed out waiting for device sync");
        }
        sleep(Duration::from_millis(50)).await;
    }
}

fn init_logging(level: &str, paths: &AppPaths) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(&paths.logs_dir, "vtx-gw.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "Failed to install CTRL+C handler");
        return;
    }
    info!("Shutdown signal received");
}

fn list_ports_formatted() {
    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    match discovery::list_input_ports() {
        Ok(inputs) if inputs.is_empty() => println!("\n  {}", "No input ports found".dimmed()),
        Ok(inputs) => {
            println!("\n{}", "Input Ports:".bold());
            for name in inputs {
                println!("  {}", name);
            }
        }
        Err(err) => println!("  {} {}", "error:".red(), err),
    }

    match discovery::list_output_ports() {
        Ok(outputs) if outputs.is_empty() => println!("\n  {}", "No output ports found".dimmed()),
        Ok(outputs) => {
            println!("\n{}", "Output Ports:".bold());
            for name in outputs {
                println!("  {}", name);
            }
        }
        Err(err) => println!("  {} {}", "error:".red(), err),
    }

    match discovery::find_device_ports() {
        Some((input, output)) => {
            println!("\n{} {} / {}", "Amplifier detected:".green().bold(), input, output);
        }
        None => println!("\n{}", "No amplifier detected".yellow()),
    }
    println!();
}
