//! Gateway sessions
//!
//! A session stands for one browser session: it owns the connection store and
//! the bridge controller that follows it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bridge::controller::{self, BridgeStatus};
use crate::bridge::session::BridgeOptions;
use crate::store::connection::VmConnectionStore;
use crate::utils::{generate_uuid, unix_now};

pub struct Session {
    pub id: String,
    pub created_at: u64,
    /// Creation order within the registry; eviction follows it
    pub sequence: u64,
    store: Arc<VmConnectionStore>,
    bridge_rx: watch::Receiver<Option<BridgeStatus>>,
    shutdown_tx: broadcast::Sender<()>,
    controller_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session and start its bridge controller
    pub fn spawn(options: &BridgeOptions, sequence: u64) -> Arc<Self> {
        let id = generate_uuid();
        let store = Arc::new(VmConnectionStore::new());
        let (status_tx, bridge_rx) = watch::channel(None);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(controller::run(
            options.clone(),
            store.clone(),
            status_tx,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        ));

        info!(session_id = %id, "Session created");
        Arc::new(Self {
            id,
            created_at: unix_now(),
            sequence,
            store,
            bridge_rx,
            shutdown_tx,
            controller_handle: Mutex::new(Some(handle)),
        })
    }

    pub fn store(&self) -> &VmConnectionStore {
        &self.store
    }

    /// Current bridge session, if one is mounted
    pub fn bridge(&self) -> Option<BridgeStatus> {
        self.bridge_rx.borrow().clone()
    }

    pub fn watch_bridge(&self) -> watch::Receiver<Option<BridgeStatus>> {
        self.bridge_rx.clone()
    }

    /// Close the connection and wait for the controller to stop
    pub async fn shutdown(&self) {
        self.store.close_connection();
        let _ = self.shutdown_tx.send(());

        let handle = self.controller_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(session_id = %self.id, "Bridge controller failed: {}", e);
            }
        }
        info!(session_id = %self.id, "Session closed");
    }
}

/// In-memory registry of live sessions
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    capacity: usize,
    next_sequence: AtomicU64,
    bridge_options: BridgeOptions,
}

impl SessionRegistry {
    pub fn new(capacity: usize, bridge_options: BridgeOptions) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            next_sequence: AtomicU64::new(0),
            bridge_options,
        }
    }

    pub fn bridge_options(&self) -> &BridgeOptions {
        &self.bridge_options
    }

    /// Create a session, evicting the oldest one when at capacity
    pub async fn create(&self) -> Arc<Session> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let session = Session::spawn(&self.bridge_options, sequence);

        let evicted = {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            let evicted = if sessions.len() >= self.capacity {
                sessions
                    .values()
                    .min_by_key(|s| s.sequence)
                    .map(|s| s.id.clone())
                    .and_then(|id| sessions.remove(&id))
            } else {
                None
            };
            sessions.insert(session.id.clone(), session.clone());
            evicted
        };

        if let Some(evicted) = evicted {
            info!(session_id = %evicted.id, "Evicting oldest session");
            evicted.shutdown().await;
        }
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(id).cloned()
    }

    /// Remove a session and close its connection
    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let session = {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            sessions.remove(id)
        };
        if let Some(session) = &session {
            session.shutdown().await;
        }
        session
    }

    pub fn len(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn shutdown_all(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            sessions.drain().map(|(_, s)| s).collect()
        };
        for session in sessions {
            session.shutdown().await;
        }
    }
}
