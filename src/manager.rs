use crate::connection::SpeakerApi;
use crate::discovery::{CandidateSink, DiscoveryTransport};
use crate::error::{BridgeError, Result};
use crate::types::{Candidate, ConnectionState, Endpoint, MuteStrategy};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// How long `start` waits for the first endpoint
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a control call waits for an endpoint
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between invalidating an endpoint and re-arming discovery
pub const REARM_BACKOFF: Duration = Duration::from_secs(1);

/// Volume restored on unmute when nothing was remembered
pub const DEFAULT_RESTORE_VOLUME: u8 = 20;

/// Connection manager settings
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Substring of the advertised service name to accept
    pub target_name: String,
    /// Address to validate directly at startup
    pub static_ip: Option<Endpoint>,
    pub mute_strategy: MuteStrategy,
    pub startup_timeout: Duration,
    pub wait_timeout: Duration,
    pub rearm_backoff: Duration,
}

impl ManagerSettings {
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            static_ip: None,
            mute_strategy: MuteStrategy::default(),
            startup_timeout: STARTUP_TIMEOUT,
            wait_timeout: WAIT_TIMEOUT,
            rearm_backoff: REARM_BACKOFF,
        }
    }

    pub fn from_config(speaker: &crate::config::SpeakerConfig) -> Self {
        Self {
            static_ip: speaker.static_ip.clone(),
            mute_strategy: speaker.mute,
            ..Self::new(speaker.name.clone())
        }
    }
}

/// Holds the active endpoint; "discovery signal set" is `Some`.
///
/// Both promotion and invalidation are single atomic updates of the watch
/// value, so the endpoint and the signal never disagree.
#[derive(Clone)]
struct EndpointCell {
    tx: Arc<watch::Sender<Option<Endpoint>>>,
}

impl EndpointCell {
    fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    fn current(&self) -> Option<Endpoint> {
        self.tx.borrow().clone()
    }

    /// Set the endpoint if none is active. Returns whether it was set.
    fn promote(&self, endpoint: &str) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(endpoint.to_string());
                true
            } else {
                false
            }
        })
    }

    /// Clear the endpoint if it is still `endpoint`. Returns whether it was cleared.
    fn invalidate(&self, endpoint: &str) -> bool {
        self.tx.send_if_modified(|current| {
            if current.as_deref() == Some(endpoint) {
                *current = None;
                true
            } else {
                false
            }
        })
    }

    async fn wait(&self, limit: Duration) -> Result<Endpoint> {
        let mut rx = self.tx.subscribe();
        let result = match timeout(limit, rx.wait_for(Option::is_some)).await {
            Ok(Ok(endpoint)) => endpoint.clone().ok_or(BridgeError::Closed),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => Err(BridgeError::DiscoveryTimeout(limit)),
        };
        result
    }
}

enum Command {
    /// Arm discovery unless it is already armed
    Arm,
    /// Disarm, back off, arm again
    Rearm,
    /// Validate a candidate now and report whether it became active
    Validate(Candidate, oneshot::Sender<bool>),
    Shutdown,
}

/// Discovery, leader validation and self-healing for a single speaker
///
/// Control calls wait (bounded) until an endpoint is known. A failed request
/// clears the endpoint and re-arms discovery after a short backoff.
///
/// # Example
///
/// ```no_run
/// use phantom_bridge::{ConnectionManager, HttpApi, ManagerSettings, MdnsDiscovery};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = ConnectionManager::new(
///         ManagerSettings::new("Phantom"),
///         Arc::new(HttpApi::new()?),
///         Box::new(MdnsDiscovery::new()?),
///     );
///     manager.start().await?;
///
///     let volume = manager.get_volume().await?;
///     manager.set_volume(i32::from(volume) + 5).await?;
///
///     manager.close().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    settings: ManagerSettings,
    api: Arc<dyn SpeakerApi>,
    cell: EndpointCell,
    validating: Arc<AtomicBool>,
    /// Last non-zero volume captured on mute; 0 means none
    mute_memory: AtomicU8,
    commands: mpsc::UnboundedSender<Command>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create the manager and spawn its supervisor task.
    ///
    /// Must be called from within a Tokio runtime. Discovery is not armed
    /// until [`start`](Self::start) or the first control call.
    pub fn new(
        settings: ManagerSettings,
        api: Arc<dyn SpeakerApi>,
        discovery: Box<dyn DiscoveryTransport>,
    ) -> Self {
        let cell = EndpointCell::new();
        let validating = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (candidate_tx, candidate_rx) = mpsc::unbounded_channel();

        let supervisor = Supervisor {
            cell: cell.clone(),
            api: api.clone(),
            discovery,
            target: settings.target_name.clone(),
            armed: false,
            restart: false,
            validating: validating.clone(),
            backoff: settings.rearm_backoff,
            candidate_tx,
        };
        let handle = tokio::spawn(supervisor.run(command_rx, candidate_rx));

        Self {
            inner: Arc::new(Inner {
                settings,
                api,
                cell,
                validating,
                mute_memory: AtomicU8::new(0),
                commands: command_tx,
                task_handle: Mutex::new(Some(handle)),
            }),
        }
    }

    /// Begin resolving the speaker.
    ///
    /// With a static address this is one validation pass. Otherwise discovery
    /// is armed and the call waits for the first endpoint; a timeout is logged
    /// and discovery keeps running.
    pub async fn start(&self) -> Result<()> {
        let settings = &self.inner.settings;

        if let Some(ip) = &settings.static_ip {
            tracing::info!("Using static IP: {}", ip);
            let (tx, rx) = oneshot::channel();
            let candidate = Candidate::new(settings.target_name.clone(), [ip.clone()]);
            self.send(Command::Validate(candidate, tx))?;
            let promoted = rx.await.map_err(|_| BridgeError::Closed)?;
            if !promoted && self.endpoint().is_none() {
                tracing::warn!("Static speaker at {} is not available yet", ip);
            }
            return Ok(());
        }

        tracing::info!("Starting discovery for '{}'...", settings.target_name);
        self.send(Command::Arm)?;
        match self.inner.cell.wait(settings.startup_timeout).await {
            Ok(endpoint) => {
                tracing::info!("Speaker ready at {}", endpoint);
                Ok(())
            }
            Err(BridgeError::DiscoveryTimeout(_)) => {
                tracing::warn!("Discovery timed out. Will continue listening in background.");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Current active endpoint, if any
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner.cell.current()
    }

    pub fn state(&self) -> ConnectionState {
        match self.inner.cell.current() {
            Some(endpoint) => ConnectionState::Active(endpoint),
            None if self.inner.validating.load(Ordering::SeqCst) => ConnectionState::Validating,
            None => ConnectionState::Unresolved,
        }
    }

    /// Wait until an endpoint is active, bounded by the wait timeout
    pub async fn wait_ready(&self) -> Result<Endpoint> {
        self.active_endpoint().await
    }

    /// Read the speaker volume. Failures invalidate the endpoint and are returned.
    pub async fn get_volume(&self) -> Result<u8> {
        let endpoint = self.active_endpoint().await?;
        match self.inner.api.volume(&endpoint).await {
            Ok(volume) => Ok(volume),
            Err(e) => {
                tracing::error!("Error getting volume: {}", e);
                self.self_heal(&endpoint);
                Err(e)
            }
        }
    }

    /// Set the speaker volume, clamped to 0..=100.
    ///
    /// Request failures invalidate the endpoint and are only logged. Errors
    /// are returned only when no endpoint became available.
    pub async fn set_volume(&self, volume: i32) -> Result<()> {
        let volume = clamp_volume(volume);
        let endpoint = self.active_endpoint().await?;
        if let Err(e) = self.inner.api.set_volume(&endpoint, volume).await {
            tracing::error!("Error setting volume: {}", e);
            self.self_heal(&endpoint);
        }
        Ok(())
    }

    /// Mute or unmute using the configured strategy.
    ///
    /// Request failures are logged, not returned.
    pub async fn set_mute(&self, muted: bool) -> Result<()> {
        match self.inner.settings.mute_strategy {
            MuteStrategy::Emulated => self.emulate_mute(muted).await,
            MuteStrategy::Native => {
                let endpoint = self.active_endpoint().await?;
                if let Err(e) = self.inner.api.set_mute(&endpoint, muted).await {
                    tracing::error!("Error setting mute: {}", e);
                    self.self_heal(&endpoint);
                }
                Ok(())
            }
        }
    }

    /// Volume-0 mute; repeated mutes at 0 and unmutes above 0 do nothing.
    async fn emulate_mute(&self, muted: bool) -> Result<()> {
        let current = match self.get_volume().await {
            Ok(volume) => volume,
            Err(e) if e.is_unresolved() => return Err(e),
            Err(e) => {
                tracing::error!("Error toggling mute: {}", e);
                return Ok(());
            }
        };

        if muted {
            if current > 0 {
                self.inner.mute_memory.store(current, Ordering::SeqCst);
                tracing::info!("Muting: saving volume {} and setting to 0", current);
                self.set_volume(0).await?;
            } else {
                tracing::debug!("Already at volume 0 (muted)");
            }
        } else if current == 0 {
            let restore = match self.inner.mute_memory.load(Ordering::SeqCst) {
                0 => DEFAULT_RESTORE_VOLUME,
                remembered => remembered,
            };
            tracing::info!("Unmuting: restoring volume to {}", restore);
            self.set_volume(i32::from(restore)).await?;
        } else {
            tracing::debug!("Already unmuted (volume {})", current);
        }
        Ok(())
    }

    /// Stop discovery and the supervisor task. Safe to call more than once.
    pub async fn close(&self) {
        let _ = self.inner.commands.send(Command::Shutdown);
        let handle = self
            .inner
            .task_handle
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(mut handle) = handle {
            // Give it a moment to stop gracefully
            if timeout(self.inner.settings.rearm_backoff * 2, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Supervisor did not stop in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
    }

    async fn active_endpoint(&self) -> Result<Endpoint> {
        if let Some(endpoint) = self.inner.cell.current() {
            return Ok(endpoint);
        }
        self.send(Command::Arm)?;
        self.inner.cell.wait(self.inner.settings.wait_timeout).await
    }

    fn self_heal(&self, endpoint: &str) {
        if self.inner.cell.invalidate(endpoint) {
            tracing::info!("Lost speaker at {}, restarting discovery...", endpoint);
            let _ = self.inner.commands.send(Command::Rearm);
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.inner
            .commands
            .send(command)
            .map_err(|_| BridgeError::Closed)
    }
}

/// Clamp a requested volume into the speaker's 0..=100 range
pub fn clamp_volume(volume: i32) -> u8 {
    volume.clamp(0, 100) as u8
}

/// Single owner of discovery and of endpoint promotion
struct Supervisor {
    cell: EndpointCell,
    api: Arc<dyn SpeakerApi>,
    discovery: Box<dyn DiscoveryTransport>,
    target: String,
    armed: bool,
    /// A candidate failed validation; the next arm restarts the transport
    restart: bool,
    validating: Arc<AtomicBool>,
    backoff: Duration,
    candidate_tx: CandidateSink,
}

impl Supervisor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut candidates: mpsc::UnboundedReceiver<Candidate>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Arm) => self.arm(),
                    Some(Command::Rearm) => {
                        self.disarm();
                        sleep(self.backoff).await;
                        if self.cell.current().is_none() {
                            self.arm();
                        }
                    }
                    Some(Command::Validate(candidate, reply)) => {
                        let promoted = self.consider(candidate).await;
                        let _ = reply.send(promoted);
                    }
                    Some(Command::Shutdown) | None => {
                        tracing::info!("Connection manager stopping");
                        break;
                    }
                },
                Some(candidate) = candidates.recv() => {
                    self.consider(candidate).await;
                }
            }
        }
    }

    fn arm(&mut self) {
        if self.armed {
            if !self.restart {
                return;
            }
            // mDNS reports a resolved service once per browse.
            tracing::debug!("Restarting discovery after a failed validation");
            self.discovery.disarm();
        }
        self.restart = false;
        match self.discovery.arm(self.candidate_tx.clone()) {
            Ok(()) => self.armed = self.discovery.is_continuous(),
            Err(e) => tracing::error!("Failed to start discovery: {}", e),
        }
    }

    fn disarm(&mut self) {
        self.discovery.disarm();
        self.armed = false;
        self.restart = false;
    }

    /// Validate a candidate; the first System Leader wins.
    async fn consider(&mut self, candidate: Candidate) -> bool {
        if !candidate.matches(&self.target) {
            tracing::trace!("Ignoring service {}", candidate.name);
            return false;
        }
        if let Some(active) = self.cell.current() {
            tracing::trace!("Ignoring {}, already using {}", candidate.name, active);
            return false;
        }

        tracing::debug!("Checking candidate: {} at {:?}", candidate.name, candidate.addresses);
        self.validating.store(true, Ordering::SeqCst);
        let promoted = validate(self.api.clone(), &self.cell, &candidate).await;
        self.validating.store(false, Ordering::SeqCst);

        if !promoted && self.cell.current().is_none() {
            self.restart = true;
        }
        promoted
    }
}

impl Drop for Supervisor {
    // Runs on a normal stop and when `close` aborts the task.
    fn drop(&mut self) {
        self.validating.store(false, Ordering::SeqCst);
        self.discovery.close();
    }
}

/// Promote the first address of `candidate` that reports itself System Leader
async fn validate(api: Arc<dyn SpeakerApi>, cell: &EndpointCell, candidate: &Candidate) -> bool {
    for address in &candidate.addresses {
        match api.device_info(address).await {
            Ok(info) if info.is_system_leader => {
                if cell.promote(address) {
                    tracing::info!("Confirmed System Leader at {}", address);
                    return true;
                }
                return false;
            }
            Ok(_) => tracing::debug!("Candidate {} is not System Leader. Ignoring.", address),
            Err(e) => tracing::debug!("Failed to validate candidate {}: {}", address, e),
        }
    }
    false
}
