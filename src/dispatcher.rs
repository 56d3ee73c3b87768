use crate::config::ActionMap;
use crate::error::Result;
use crate::manager::ConnectionManager;
use crate::types::{Action, DebounceClass, Scancode};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum spacing between accepted codes of one debounce class
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Volume operations the dispatcher needs from the speaker side
#[async_trait]
pub trait VolumeControl: Send + Sync {
    async fn get_volume(&self) -> Result<u8>;
    async fn set_volume(&self, volume: i32) -> Result<()>;
    async fn set_mute(&self, muted: bool) -> Result<()>;
}

#[async_trait]
impl VolumeControl for ConnectionManager {
    async fn get_volume(&self) -> Result<u8> {
        ConnectionManager::get_volume(self).await
    }

    async fn set_volume(&self, volume: i32) -> Result<()> {
        ConnectionManager::set_volume(self, volume).await
    }

    async fn set_mute(&self, muted: bool) -> Result<()> {
        ConnectionManager::set_mute(self, muted).await
    }
}

/// Last accepted instant per debounce class
#[derive(Debug)]
struct Debouncer {
    window: Duration,
    last: HashMap<DebounceClass, Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    /// Record `now` and return true unless the previous accept is too recent
    fn accept(&mut self, class: DebounceClass, now: Instant) -> bool {
        if let Some(last) = self.last.get(&class) {
            if now.saturating_duration_since(*last) < self.window {
                return false;
            }
        }
        self.last.insert(class, now);
        true
    }
}

/// Turns scancodes into speaker commands
pub struct ActionDispatcher {
    actions: ActionMap,
    volume_step: i32,
    control: Arc<dyn VolumeControl>,
    debouncer: Debouncer,
}

impl ActionDispatcher {
    pub fn new(actions: ActionMap, volume_step: i32, control: Arc<dyn VolumeControl>) -> Self {
        Self {
            actions,
            volume_step,
            control,
            debouncer: Debouncer::new(DEBOUNCE_WINDOW),
        }
    }

    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debouncer = Debouncer::new(window);
        self
    }

    /// Handle one scancode. Errors are logged; this never fails.
    pub async fn handle(&mut self, code: Scancode) {
        let Some(action) = self.actions.get(code) else {
            tracing::debug!("Unknown scancode: {:#x}", code);
            return;
        };

        if let Some(class) = action.debounce_class() {
            if !self.debouncer.accept(class, Instant::now()) {
                tracing::debug!("Debouncing {} code", action);
                return;
            }
        }

        tracing::info!("Action: {} (from {:#x})", action, code);

        if let Err(e) = self.dispatch(action).await {
            tracing::error!("Failed to execute action {}: {}", action, e);
        }
    }

    /// Handle codes in arrival order until the stream ends
    pub async fn run<S>(&mut self, codes: S)
    where
        S: Stream<Item = Scancode>,
    {
        futures_util::pin_mut!(codes);
        while let Some(code) = codes.next().await {
            self.handle(code).await;
        }
    }

    async fn dispatch(&self, action: Action) -> Result<()> {
        match action {
            Action::VolumeUp => {
                let current = self.control.get_volume().await?;
                self.control
                    .set_volume(i32::from(current) + self.volume_step)
                    .await
            }
            Action::VolumeDown => {
                let current = self.control.get_volume().await?;
                self.control
                    .set_volume(i32::from(current) - self.volume_step)
                    .await
            }
            Action::Mute => self.control.set_mute(true).await,
            Action::Unmute => self.control.set_mute(false).await,
        }
    }
}
