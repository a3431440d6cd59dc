//! TCP accept loop and session lifecycle.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use auris_speaker::{Embedder, ProfileCell, ProfileTable, SpectralEmbedder};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::payload::{audit_topic, AuditRecord};
use crate::publish::{NullPublisher, Publisher};
use crate::registry::{DeviceRegistry, RegistryCell};
use crate::session::{handshake, DeviceSession};

/// Tracks which task currently speaks for a board.
///
/// The id pins cleanup to the task that registered the entry, so a takeover
/// cannot remove its successor's registration.
struct SessionHandle {
    id: u64,
    cancel: CancellationToken,
}

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    registry: DeviceRegistry,
    profiles: ProfileTable,
    embedder: Option<Arc<dyn Embedder>>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            registry: DeviceRegistry::default(),
            profiles: ProfileTable::default(),
            embedder: None,
            publisher: None,
        }
    }

    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: DeviceRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_profiles(mut self, profiles: ProfileTable) -> Self {
        self.profiles = profiles;
        self
    }

    /// Replaces the built-in spectral embedder.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Sets the output sink. Without one, everything is discarded.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn build(self) -> Gateway {
        Gateway {
            config: self.config.normalized(),
            registry: RegistryCell::new(self.registry),
            profiles: Arc::new(ProfileCell::new(self.profiles)),
            embedder: self
                .embedder
                .unwrap_or_else(|| Arc::new(SpectralEmbedder::new())),
            publisher: self.publisher.unwrap_or_else(|| Arc::new(NullPublisher)),
            sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
            local_addr: Mutex::new(None),
        }
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts board connections and runs one session per device.
pub struct Gateway {
    config: GatewayConfig,
    registry: RegistryCell,
    profiles: Arc<ProfileCell>,
    embedder: Arc<dyn Embedder>,
    publisher: Arc<dyn Publisher>,
    /// Board id to the session currently speaking for it.
    sessions: Mutex<HashMap<String, SessionHandle>>,
    next_session_id: AtomicU64,
    cancel: CancellationToken,
    running: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Address the gateway is bound to, once `serve` has started listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Replaces the device registry for connections accepted from now on.
    pub fn reload_registry(&self, registry: DeviceRegistry) {
        info!("registry reloaded: {} devices", registry.len());
        self.registry.swap(registry);
    }

    /// Replaces the enrolled profiles for utterances verified from now on.
    pub fn reload_profiles(&self, profiles: ProfileTable) {
        info!("profiles reloaded: {} speakers", profiles.len());
        self.profiles.swap(profiles);
    }

    /// Stops the accept loop and cancels every running session.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Listens and serves until [`Gateway::shutdown`] is called.
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(addr);
        info!("gateway listening on {}", addr);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("gateway shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {}", peer);
                        let gateway = Arc::clone(&self);
                        tokio::spawn(async move {
                            gateway.handle_connection(stream, peer).await;
                        });
                    }
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                },
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, mut stream: TcpStream, peer: SocketAddr) {
        let registry = self.registry.snapshot();
        let refusal = match timeout(
            self.config.handshake_timeout(),
            handshake(&mut stream, &registry),
        )
        .await
        {
            Ok(Ok((device, leftover))) => {
                let (id, cancel) = self.register_session(&device.board_id);
                let session = DeviceSession::new(
                    self.config.clone(),
                    device.clone(),
                    peer,
                    Arc::clone(&self.profiles),
                    Arc::clone(&self.embedder),
                    Arc::clone(&self.publisher),
                );
                let result = session.run(stream, leftover, cancel).await;
                self.unregister_session(&device.board_id, id);
                if let Err(e) = result {
                    warn!("session for {} failed: {}", device.board_id, e);
                }
                return;
            }
            Ok(Err(e)) => e,
            Err(_) => Error::HandshakeTimeout,
        };

        if let Error::UnknownDevice(mac) = &refusal {
            self.audit_rejection(mac, peer, "unknown device");
        }
        warn!("refusing {}: {}", peer, refusal);
    }

    /// Registers a session for a board, cancelling any session it replaces.
    fn register_session(&self, board_id: &str) -> (u64, CancellationToken) {
        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let cancel = self.cancel.child_token();
        let handle = SessionHandle {
            id,
            cancel: cancel.clone(),
        };
        if let Some(old) = self.sessions.lock().insert(board_id.to_string(), handle) {
            info!("board {} reconnected, replacing its session", board_id);
            old.cancel.cancel();
        }
        (id, cancel)
    }

    /// Removes a session entry if it still belongs to the finishing task.
    fn unregister_session(&self, board_id: &str, id: u64) {
        let mut sessions = self.sessions.lock();
        if sessions.get(board_id).is_some_and(|h| h.id == id) {
            sessions.remove(board_id);
        }
    }

    fn audit_rejection(&self, mac: &str, peer: SocketAddr, reason: &str) {
        let record = AuditRecord::rejected(&peer.to_string(), Utc::now(), reason);
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(e) = self.publisher.publish(&audit_topic(mac), bytes) {
                    debug!("rejection audit publish failed: {}", e);
                }
            }
            Err(e) => debug!("rejection audit encode failed: {}", e),
        }
    }
}
