use crate::error::Result;
use crate::types::Candidate;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::thread::JoinHandle;
use tokio::sync::mpsc;

/// Service type browsed for speakers
pub const SERVICE_TYPE: &str = "_http._tcp.local.";

/// Channel end a transport announces candidates into
///
/// Transports may send from any thread; the receiving side is owned by the
/// connection manager's supervisor task.
pub type CandidateSink = mpsc::UnboundedSender<Candidate>;

/// Source of candidate speaker addresses
///
/// The manager arms the transport whenever it has no active endpoint and
/// disarms it before re-arming after a failure.
pub trait DiscoveryTransport: Send {
    /// Start announcing candidates into `sink`
    fn arm(&mut self, sink: CandidateSink) -> Result<()>;

    /// Stop announcing candidates
    fn disarm(&mut self);

    /// Whether the transport keeps announcing after `arm` returns.
    ///
    /// One-shot transports are re-armed on every wait for an endpoint.
    fn is_continuous(&self) -> bool {
        true
    }

    /// Release all resources. The transport is not armed again afterwards.
    fn close(&mut self) {
        self.disarm();
    }
}

/// mDNS browser for [`SERVICE_TYPE`]
///
/// Resolved services are forwarded from a dedicated thread, so nothing in the
/// mDNS callback path touches manager state directly.
pub struct MdnsDiscovery {
    daemon: Option<ServiceDaemon>,
    forwarder: Option<JoinHandle<()>>,
}

impl MdnsDiscovery {
    /// Create the mDNS daemon. Browsing starts on [`DiscoveryTransport::arm`].
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()?;
        Ok(Self {
            daemon: Some(daemon),
            forwarder: None,
        })
    }
}

impl DiscoveryTransport for MdnsDiscovery {
    fn arm(&mut self, sink: CandidateSink) -> Result<()> {
        let Some(daemon) = &self.daemon else {
            return Err(crate::error::BridgeError::Closed);
        };

        tracing::info!("Browsing for {}", SERVICE_TYPE);
        let receiver = daemon.browse(SERVICE_TYPE)?;

        let handle = std::thread::Builder::new()
            .name("mdns-forwarder".to_string())
            .spawn(move || {
                while let Ok(event) = receiver.recv() {
                    match event {
                        ServiceEvent::ServiceResolved(info) => {
                            let candidate =
                                Candidate::from_ips(info.get_fullname(), info.get_addresses());
                            if candidate.addresses.is_empty() {
                                continue;
                            }
                            tracing::trace!("Resolved {} at {:?}", candidate.name, candidate.addresses);
                            if sink.send(candidate).is_err() {
                                break;
                            }
                        }
                        ServiceEvent::SearchStopped(_) => break,
                        _ => {}
                    }
                }
                tracing::debug!("mDNS forwarder exiting");
            })?;

        self.forwarder = Some(handle);
        Ok(())
    }

    fn disarm(&mut self) {
        if let Some(daemon) = &self.daemon {
            if let Err(e) = daemon.stop_browse(SERVICE_TYPE) {
                tracing::debug!("Failed to stop browsing: {}", e);
            }
        }
        // The forwarder exits on SearchStopped or when the daemon drops the channel.
        self.forwarder.take();
    }

    fn close(&mut self) {
        self.disarm();
        if let Some(daemon) = self.daemon.take() {
            if let Err(e) = daemon.shutdown() {
                tracing::warn!("Failed to shut down mDNS daemon: {}", e);
            }
        }
    }
}

impl Drop for MdnsDiscovery {
    fn drop(&mut self) {
        self.close();
    }
}

/// Announces one configured address on every arm
pub struct StaticDiscovery {
    candidate: Candidate,
}

impl StaticDiscovery {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            candidate: Candidate::new(name, [endpoint.into()]),
        }
    }
}

impl DiscoveryTransport for StaticDiscovery {
    fn arm(&mut self, sink: CandidateSink) -> Result<()> {
        tracing::debug!("Announcing static address {:?}", self.candidate.addresses);
        // A closed sink means the manager is shutting down.
        let _ = sink.send(self.candidate.clone());
        Ok(())
    }

    fn disarm(&mut self) {}

    fn is_continuous(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_discovery_announces_on_each_arm() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut discovery = StaticDiscovery::new("Phantom", "192.168.1.50");
        assert!(!discovery.is_continuous());

        discovery.arm(tx.clone()).unwrap();
        discovery.arm(tx).unwrap();

        for _ in 0..2 {
            let candidate = rx.recv().await.unwrap();
            assert_eq!(candidate.name, "Phantom");
            assert_eq!(candidate.addresses, vec!["192.168.1.50"]);
        }
    }
}
