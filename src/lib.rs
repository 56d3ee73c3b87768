//! Bridge an IR remote control to Devialet Phantom speakers
//!
//! The crate resolves the controllable speaker on the local network and turns
//! raw remote-control scancodes into volume and mute requests against the
//! speaker's IP control API. It provides:
//!
//! - mDNS discovery with System Leader validation (or a static address)
//! - Self-healing: a failed request drops the endpoint and restarts discovery
//! - Volume control clamped to the speaker range, with debounced remote input
//! - Mute emulation through volume 0 and a remembered restore level
//!
//! # Quick Start
//!
//! ```no_run
//! use phantom_bridge::{
//!     ActionDispatcher, Config, ConnectionManager, HttpApi, ManagerSettings, MdnsDiscovery,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!
//!     let manager = ConnectionManager::new(
//!         ManagerSettings::from_config(&config.speaker),
//!         Arc::new(HttpApi::new()?),
//!         Box::new(MdnsDiscovery::new()?),
//!     );
//!     manager.start().await?;
//!
//!     let mut dispatcher = ActionDispatcher::new(
//!         config.action_map()?,
//!         config.speaker.volume_step,
//!         Arc::new(manager.clone()),
//!     );
//!     dispatcher.handle(0x45).await;
//!
//!     manager.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Manager**: endpoint resolution, leader validation, self-healing
//! - **Dispatcher**: scancode to action mapping, debouncing
//! - **Connection**: HTTP requests against one endpoint
//! - **Discovery**: candidate address sources (mDNS, static)
//! - **Protocol**: control paths and JSON bodies
//! - **Config**: TOML configuration and the action table

mod config;
mod connection;
mod discovery;
mod dispatcher;
mod error;
#[cfg(feature = "ir")]
pub mod input;
mod manager;
pub mod protocol;
mod types;

// Public exports
pub use config::{parse_scancode, ActionMap, Config, LoggingConfig, SpeakerConfig};
pub use connection::{HttpApi, SpeakerApi, REQUEST_TIMEOUT};
pub use discovery::{CandidateSink, DiscoveryTransport, MdnsDiscovery, StaticDiscovery, SERVICE_TYPE};
pub use dispatcher::{ActionDispatcher, VolumeControl, DEBOUNCE_WINDOW};
pub use error::{BridgeError, Result};
pub use manager::{
    clamp_volume, ConnectionManager, ManagerSettings, DEFAULT_RESTORE_VOLUME, REARM_BACKOFF,
    STARTUP_TIMEOUT, WAIT_TIMEOUT,
};
pub use protocol::DeviceInfo;
pub use types::{
    endpoint_for, Action, Candidate, ConnectionState, DebounceClass, Endpoint, MuteStrategy,
    Scancode,
};
