//! Mounts and unmounts bridge sessions as a connection store changes

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use openapi_server::models::BridgeView;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bridge::session::{BridgeOptions, BridgePhase, BridgeSession, SharedViewport};
use crate::store::connection::{mount_request, MountRequest, VmConnectionStore};

/// Current session as seen from outside the controller
#[derive(Debug, Clone)]
pub struct BridgeStatus {
    pub deployment_id: String,
    pub attempt: u64,
    pub phase: BridgePhase,
    pub viewport: SharedViewport,
}

impl BridgeStatus {
    pub fn view(&self) -> BridgeView {
        let viewport = self.viewport.read().unwrap_or_else(|e| e.into_inner());
        let (framebuffer_width, framebuffer_height) = viewport.framebuffer_size();
        let (error, message) = match &self.phase {
            BridgePhase::Error(failure) => (
                Some(failure.kind.as_str().to_string()),
                Some(failure.message.clone()),
            ),
            _ => (None, None),
        };

        BridgeView {
            phase: self.phase.as_str().to_string(),
            error,
            message,
            framebuffer_width,
            framebuffer_height,
            viewport_width: viewport.width(),
            viewport_height: viewport.height(),
            scale: viewport.scale(),
        }
    }
}

/// View reported while no session is mounted
pub fn idle_view(options: &BridgeOptions) -> BridgeView {
    BridgeView {
        phase: "idle".to_string(),
        error: None,
        message: None,
        framebuffer_width: 0,
        framebuffer_height: 0,
        viewport_width: options.viewport_width,
        viewport_height: options.viewport_height,
        scale: 1.0,
    }
}

struct Active {
    request: MountRequest,
    session: BridgeSession,
    phase_rx: watch::Receiver<BridgePhase>,
}

enum Event {
    Shutdown,
    Mount(Option<MountRequest>),
    Phase(BridgePhase),
}

fn mount(options: &BridgeOptions, request: MountRequest) -> Active {
    info!(
        deployment_id = %request.deployment_id,
        attempt = request.attempt,
        address = %request.service_address,
        "Mounting remote desktop"
    );
    let session = BridgeSession::mount(options, request.service_address.as_str());
    let phase_rx = session.subscribe();
    Active {
        request,
        session,
        phase_rx,
    }
}

async fn unmount(active: Active, status_tx: &watch::Sender<Option<BridgeStatus>>) {
    debug!(
        deployment_id = %active.request.deployment_id,
        attempt = active.request.attempt,
        "Unmounting remote desktop"
    );
    active.session.unmount().await;
    status_tx.send_replace(None);
}

fn publish(active: &Active, status_tx: &watch::Sender<Option<BridgeStatus>>) {
    status_tx.send_replace(Some(BridgeStatus {
        deployment_id: active.request.deployment_id.clone(),
        attempt: active.request.attempt,
        phase: active.session.phase(),
        viewport: active.session.viewport(),
    }));
}

async fn next_phase(active: &mut Option<Active>) -> Option<BridgePhase> {
    match active {
        Some(active) => {
            active.phase_rx.changed().await.ok()?;
            let phase = active.phase_rx.borrow_and_update().clone();
            Some(phase)
        }
        None => std::future::pending().await,
    }
}

/// Keep at most one bridge session mounted for the store's current connection.
///
/// A previous session is always fully closed before the next one is mounted.
/// Ready and error phases are written back to the store for the attempt that
/// produced them.
pub async fn run(
    options: BridgeOptions,
    store: Arc<VmConnectionStore>,
    status_tx: watch::Sender<Option<BridgeStatus>>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    let mut selector = store.select(mount_request);
    let mut active = selector.get().clone().map(|request| mount(&options, request));
    if let Some(active) = &active {
        publish(active, &status_tx);
    }

    loop {
        let event = tokio::select! {
            _ = &mut shutdown_signal => Event::Shutdown,
            // `store` is held here, so the projection never ends
            Some(request) = selector.changed() => Event::Mount(request),
            Some(phase) = next_phase(&mut active) => Event::Phase(phase),
        };

        match event {
            Event::Shutdown => break,
            Event::Mount(request) => {
                if let Some(previous) = active.take() {
                    unmount(previous, &status_tx).await;
                }
                if let Some(request) = request {
                    let mounted = mount(&options, request);
                    publish(&mounted, &status_tx);
                    active = Some(mounted);
                }
            }
            Event::Phase(phase) => {
                let Some(current) = &active else { continue };
                let MountRequest {
                    deployment_id,
                    attempt,
                    ..
                } = &current.request;

                match &phase {
                    BridgePhase::Ready => {
                        store.mark_connected(deployment_id, *attempt);
                    }
                    BridgePhase::Error(failure) => {
                        warn!(
                            deployment_id = %deployment_id,
                            attempt,
                            kind = failure.kind.as_str(),
                            "Remote desktop failed: {}",
                            failure.message
                        );
                        store.mark_disconnected(deployment_id, *attempt);
                    }
                    BridgePhase::Validating | BridgePhase::Loading => {}
                }
                publish(current, &status_tx);
            }
        }
    }

    if let Some(previous) = active.take() {
        unmount(previous, &status_tx).await;
    }
    debug!("Bridge controller stopped");
}
