//! Phantom Bridge - IR remote to Devialet Phantom volume control.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use phantom_bridge::{
    Config, ConnectionManager, DiscoveryTransport, HttpApi, ManagerSettings, MdnsDiscovery,
    StaticDiscovery,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Delay between attempts to find the IR receiver
#[cfg(feature = "ir")]
const RECEIVER_RETRY: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "phantom-bridge", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Forward IR remote presses to the speaker (default)
    Run,
    /// Print scancodes received from the IR receiver
    Scan,
    /// Control the speaker from the keyboard
    Manual,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);

    let config = match command {
        // Scanning is used before a config exists.
        Command::Scan => Config::load(&cli.config).unwrap_or_default(),
        _ => Config::load(&cli.config)
            .with_context(|| format!("Failed to load {}", cli.config.display()))?,
    };

    init_logging(&config.logging.level)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Phantom Bridge");

    match command {
        Command::Run => run_bridge(config).await,
        Command::Scan => scan().await,
        Command::Manual => manual(config).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).context("Invalid logging.level")?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_manager(config: &Config) -> Result<ConnectionManager> {
    let discovery: Box<dyn DiscoveryTransport> = match &config.speaker.static_ip {
        Some(ip) => Box::new(StaticDiscovery::new(config.speaker.name.clone(), ip.clone())),
        None => Box::new(MdnsDiscovery::new().context("Failed to start mDNS")?),
    };
    let api = HttpApi::new().context("Failed to build HTTP client")?;

    Ok(ConnectionManager::new(
        ManagerSettings::from_config(&config.speaker),
        Arc::new(api),
        discovery,
    ))
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = term.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C");
    }
}

#[cfg(feature = "ir")]
async fn run_bridge(config: Config) -> Result<()> {
    use phantom_bridge::ActionDispatcher;

    let actions = config.action_map()?;
    info!(codes = actions.len(), "Loaded IR code mapping");

    let manager = build_manager(&config)?;
    let starter = manager.clone();
    tokio::spawn(async move {
        if let Err(e) = starter.start().await {
            error!("Speaker discovery failed to start: {}", e);
        }
    });

    let mut dispatcher = ActionDispatcher::new(
        actions,
        config.speaker.volume_step,
        Arc::new(manager.clone()),
    );

    let input = async {
        loop {
            match phantom_bridge::input::find_receiver() {
                Some((path, device)) => {
                    info!("Listening for IR events on {}", path.display());
                    match phantom_bridge::input::scancodes(device) {
                        Ok(codes) => {
                            dispatcher.run(codes).await;
                            error!("Device disconnected. Scanning...");
                        }
                        Err(e) => error!("Failed to open {}: {}", path.display(), e),
                    }
                }
                None => warn!("IR receiver not found. Retrying in {:?}...", RECEIVER_RETRY),
            }
            tokio::time::sleep(RECEIVER_RETRY).await;
        }
    };

    tokio::select! {
        _ = input => {}
        _ = shutdown_signal() => info!("Stopping..."),
    }

    manager.close().await;
    Ok(())
}

#[cfg(not(feature = "ir"))]
async fn run_bridge(_config: Config) -> Result<()> {
    anyhow::bail!("built without IR support; rebuild with the `ir` feature or use `manual`")
}

#[cfg(feature = "ir")]
async fn scan() -> Result<()> {
    use futures_util::StreamExt;
    use phantom_bridge::input;

    println!("Looking for IR receiver...");
    let Some((path, device)) = input::find_receiver() else {
        eprintln!("\nERROR: IR receiver device not found.");
        eprintln!("Ensure the overlay is configured in /boot/firmware/config.txt:");
        eprintln!("  dtoverlay=gpio-ir,gpio_pin=17");
        eprintln!("\nAvailable devices:");
        for device in input::list_devices() {
            eprintln!("  - {}: {}", device.path.display(), device.name);
        }
        return Ok(());
    };

    println!("\nFound IR device at {}", path.display());
    println!("Point your remote at the receiver and press buttons. Ctrl+C to exit.");

    let codes = input::scancodes(device).context("Failed to open IR device")?;
    futures_util::pin_mut!(codes);
    let shutdown = shutdown_signal();
    futures_util::pin_mut!(shutdown);
    loop {
        tokio::select! {
            code = codes.next() => match code {
                Some(code) => println!("Captured Signal -> Hex: {:#x} | Int: {}", code, code),
                None => break,
            },
            _ = &mut shutdown => break,
        }
    }
    Ok(())
}

#[cfg(not(feature = "ir"))]
async fn scan() -> Result<()> {
    anyhow::bail!("built without IR support; rebuild with the `ir` feature")
}

/// Keyboard control, bypassing the IR hardware
async fn manual(config: Config) -> Result<()> {
    use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
    use crossterm::terminal;

    let manager = build_manager(&config)?;
    let step = config.speaker.volume_step;

    println!("Waiting for speaker connection (System Leader)...");
    manager.start().await?;
    let endpoint = manager.wait_ready().await?;
    println!("Connected to System Leader at {}", endpoint);
    println!("  + / - : volume up / down");
    println!("  m / u : mute / unmute");
    println!("  v     : show volume");
    println!("  q     : quit");

    let (key_tx, mut key_rx) = mpsc::unbounded_channel();
    terminal::enable_raw_mode().context("Failed to enable raw mode")?;
    let reader = tokio::task::spawn_blocking(move || loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                let ctrl_c = key.code == KeyCode::Char('c')
                    && key.modifiers.contains(KeyModifiers::CONTROL);
                let code = if ctrl_c { KeyCode::Char('q') } else { key.code };
                if key_tx.send(code).is_err() || code == KeyCode::Char('q') {
                    break;
                }
            }
            Ok(_) => {}
            Err(_) => break,
        }
    });

    while let Some(key) = key_rx.recv().await {
        let result = match key {
            KeyCode::Char('q') => break,
            KeyCode::Char('+') | KeyCode::Char('=') => step_volume(&manager, step).await,
            KeyCode::Char('-') => step_volume(&manager, -step).await,
            KeyCode::Char('m') => manager.set_mute(true).await.map_err(Into::into),
            KeyCode::Char('u') => manager.set_mute(false).await.map_err(Into::into),
            KeyCode::Char('v') => manager
                .get_volume()
                .await
                .map(|volume| print!("Volume: {}\r\n", volume))
                .map_err(Into::into),
            _ => {
                print!("Unknown command.\r\n");
                Ok(())
            }
        };
        if let Err(e) = result {
            print!("Error: {}\r\n", e);
        }
    }

    terminal::disable_raw_mode().context("Failed to restore terminal")?;
    // The blocking reader exits after the quit key; don't wait on a stuck read.
    let _ = tokio::time::timeout(Duration::from_millis(100), reader).await;
    manager.close().await;
    println!("Exiting.");
    Ok(())
}

async fn step_volume(manager: &ConnectionManager, delta: i32) -> Result<()> {
    let current = manager.get_volume().await?;
    manager.set_volume(i32::from(current) + delta).await?;
    print!("Volume: {}\r\n", manager.get_volume().await?);
    Ok(())
}
