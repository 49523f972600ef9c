//! showrun CLI - The `showrun` command.
//!
//! Loads a rundown and runs the timing engine with its control surfaces.
//!
//! # Architecture
//!
//! The CLI binary wires together:
//!
//! - **showrun-core**: playback engine, runtime thread, OSC control, automations
//! - **showrun-http**: REST and WebSocket API
//!
//! Restore points are written to disk while the show runs so a restarted
//! process resumes playback.

mod config;
mod restore;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use showrun_core::rundown::normalise;
use showrun_core::{OscControlServer, PlaybackEngine, Rundown, Runtime, SystemClock};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use config::Config;
use restore::RestoreStore;

/// How often the restore point is checked for changes.
const RESTORE_INTERVAL: Duration = Duration::from_secs(1);

/// showrun - Show control timing engine
#[derive(Parser, Debug)]
#[command(name = "showrun")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rundown timing engine for live shows", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a rundown
    Run {
        /// Path to the rundown JSON file
        #[arg(value_name = "FILE")]
        rundown: PathBuf,

        /// Configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Override the OSC listen port
        #[arg(long, value_name = "PORT")]
        osc_port: Option<u16>,

        /// Override the HTTP port
        #[arg(long, value_name = "PORT")]
        http_port: Option<u16>,

        /// Start fresh instead of resuming the stored restore point
        #[arg(long)]
        no_restore: bool,
    },

    /// Normalise a rundown and print its metadata
    Check {
        #[arg(value_name = "FILE")]
        rundown: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Commands::Run {
            rundown,
            config,
            osc_port,
            http_port,
            no_restore,
        } => {
            let mut cfg = Config::load(config.as_deref())?;
            if let Some(port) = osc_port {
                cfg.osc.listen_port = port;
            }
            if let Some(port) = http_port {
                cfg.http.port = port;
            }
            run(&rundown, cfg, !no_restore)
        }
        Commands::Check { rundown } => {
            let mut rundown = load_rundown(&rundown)?;
            let metadata = normalise(&mut rundown);
            println!("{}", serde_json::to_string_pretty(&metadata)?);
            Ok(())
        }
        Commands::Version => {
            println!("showrun {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Rundown timing engine for live shows");
            println!();
            println!("Modular Architecture:");
            println!("  - showrun-core: Playback engine, runtime and OSC control");
            println!("  - showrun-http: REST and WebSocket API");
            Ok(())
        }
    }
}

fn load_rundown(path: &Path) -> Result<Rundown> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read rundown: {}", path.display()))?;
    let rundown: Rundown = serde_json::from_str(&content)
        .with_context(|| format!("Invalid rundown: {}", path.display()))?;
    rundown
        .check_references()
        .with_context(|| format!("Invalid rundown: {}", path.display()))?;
    Ok(rundown)
}

fn epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn run(rundown_path: &Path, cfg: Config, resume: bool) -> Result<()> {
    let rundown = load_rundown(rundown_path)?;
    log::info!(
        "Loaded rundown '{}' ({} entries)",
        rundown.title,
        rundown.entries.len()
    );

    let engine =
        PlaybackEngine::new(Arc::new(SystemClock), cfg.engine.clone()).with_rundown(rundown);
    let runtime = Runtime::start(engine, cfg.automation.clone())?;
    let handle = runtime.handle().clone();

    let mut store = if cfg.restore.enabled {
        cfg.restore_path().map(RestoreStore::new)
    } else {
        None
    };
    if let Some(store) = store.as_ref().filter(|_| resume) {
        match store.load() {
            Ok(Some(point)) => match handle.restore(point, epoch_ms()) {
                Ok(()) => log::info!("Restored playback from {}", store.path().display()),
                Err(e) => log::warn!("Not restoring playback: {}", e),
            },
            Ok(None) => {}
            Err(e) => log::warn!("{:#}", e),
        }
    }

    let osc = if cfg.osc.enabled {
        let bind = format!("0.0.0.0:{}", cfg.osc.listen_port);
        Some(
            OscControlServer::start(&bind, handle.message_sender())
                .with_context(|| format!("Failed to start OSC control on {}", bind))?,
        )
    } else {
        None
    };

    let http_rt = if cfg.http.enabled {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("Failed to create HTTP runtime")?;
        let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http.port));
        let http_handle = handle.clone();
        rt.spawn(async move {
            if let Err(e) = showrun_http::start_server(http_handle, addr).await {
                log::error!("[HTTP] Server error: {:#}", e);
            }
        });
        Some(rt)
    } else {
        None
    };

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&term))
        .context("Failed to register SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&term))
        .context("Failed to register SIGTERM handler")?;

    log::info!("Running... (Press Ctrl+C to exit)");

    let mut last_check = Instant::now();
    while !term.load(Ordering::Relaxed) && !handle.is_shutdown_requested() {
        std::thread::sleep(Duration::from_millis(100));

        if last_check.elapsed() < RESTORE_INTERVAL {
            continue;
        }
        last_check = Instant::now();
        if let Some(store) = store.as_mut() {
            if let Err(e) = store.save_if_changed(&handle.restore_point(epoch_ms())) {
                log::warn!("{:#}", e);
            }
        }
    }

    log::info!("Shutting down...");
    if let Some(store) = store.as_mut() {
        if let Err(e) = store.save(&handle.restore_point(epoch_ms())) {
            log::warn!("{:#}", e);
        }
    }
    if let Some(osc) = osc {
        osc.shutdown();
    }
    if let Some(rt) = http_rt {
        rt.shutdown_timeout(Duration::from_secs(1));
    }
    runtime.shutdown();
    Ok(())
}
