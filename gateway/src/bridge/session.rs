//! One VNC-over-WebSocket client session

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::address::ServiceAddress;
use crate::bridge::rfb::{self, PixelFormat, Rect, ServerMessage};
use crate::bridge::transport::{FrameTransport, RfbStream, WsTransport};
use crate::bridge::viewport::{Viewport, DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH};
use crate::errors::{ErrorKind, GatewayError};

/// WebSocket subprotocol spoken by websockify
pub const WEBSOCKIFY_PROTOCOL: &str = "binary";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&GatewayError> for BridgeFailure {
    fn from(err: &GatewayError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Observable phase of a session. `Error` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgePhase {
    Validating,
    Loading,
    Ready,
    Error(BridgeFailure),
}

impl BridgePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgePhase::Validating => "validating",
            BridgePhase::Loading => "loading",
            BridgePhase::Ready => "ready",
            BridgePhase::Error(_) => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BridgePhase::Error(_))
    }
}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Origin of the page the remote desktop is shown on
    pub page_origin: Url,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    /// How long to wait for the server to acknowledge a close
    pub close_timeout: Duration,
    /// Ask the server to keep other viewers connected
    pub shared: bool,
}

impl BridgeOptions {
    pub fn new(page_origin: Url) -> Self {
        Self {
            page_origin,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
            shared: true,
        }
    }
}

/// WebSocket URL of the tunnel for `address`, as seen from `page_origin`.
///
/// The scheme mirrors the page: `https` pages get `wss`.
pub fn derive_websocket_url(page_origin: &Url, address: &ServiceAddress) -> Result<Url, GatewayError> {
    let scheme = match page_origin.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(GatewayError::ConfigError(format!(
                "Unsupported page origin scheme '{}'",
                other
            )))
        }
    };

    let mut url = page_origin.clone();
    url.set_scheme(scheme).map_err(|_| {
        GatewayError::ConfigError(format!("Cannot derive {} URL from {}", scheme, page_origin))
    })?;
    url.set_path(&format!("/{}/websockify", address));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

pub type SharedViewport = Arc<RwLock<Viewport>>;

/// Publishes phase changes and keeps their history
struct PhaseReporter {
    tx: watch::Sender<BridgePhase>,
    history: Arc<Mutex<Vec<BridgePhase>>>,
}

impl PhaseReporter {
    fn set(&self, phase: BridgePhase) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(phase.clone());
        self.tx.send_replace(phase);
    }

    fn fail(&self, err: &GatewayError) {
        self.set(BridgePhase::Error(err.into()));
    }
}

/// A mounted remote-desktop session.
///
/// Dropping the session aborts its socket; [`BridgeSession::unmount`] closes
/// it gracefully.
pub struct BridgeSession {
    phase_rx: watch::Receiver<BridgePhase>,
    history: Arc<Mutex<Vec<BridgePhase>>>,
    viewport: SharedViewport,
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl BridgeSession {
    /// Start a session for `address`. The address is validated inside the
    /// session, so an invalid one ends in the `Error` phase.
    pub fn mount(options: &BridgeOptions, address: &str) -> Self {
        let (phase_tx, phase_rx) = watch::channel(BridgePhase::Validating);
        let history = Arc::new(Mutex::new(vec![BridgePhase::Validating]));
        let reporter = PhaseReporter {
            tx: phase_tx,
            history: history.clone(),
        };
        let viewport = Arc::new(RwLock::new(Viewport::new(
            options.viewport_width,
            options.viewport_height,
        )));
        let (close_tx, close_rx) = oneshot::channel();

        let task = tokio::spawn(run(
            options.clone(),
            address.to_string(),
            reporter,
            viewport.clone(),
            close_rx,
        ));

        Self {
            phase_rx,
            history,
            viewport,
            close_tx: Some(close_tx),
            task: Some(task),
        }
    }

    pub fn phase(&self) -> BridgePhase {
        self.phase_rx.borrow().clone()
    }

    /// Receiver that also sees phase changes made before the call
    pub fn subscribe(&self) -> watch::Receiver<BridgePhase> {
        self.phase_rx.clone()
    }

    /// Every phase entered so far, in order
    pub fn transitions(&self) -> Vec<BridgePhase> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn viewport(&self) -> SharedViewport {
        self.viewport.clone()
    }

    /// Close the socket and wait until the session task is gone
    pub async fn unmount(mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Bridge session task failed: {}", e);
                }
            }
        }
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum Outcome {
    Closed,
    Finished(Result<(), GatewayError>),
}

async fn run(
    options: BridgeOptions,
    address: String,
    reporter: PhaseReporter,
    viewport: SharedViewport,
    mut close_rx: oneshot::Receiver<()>,
) {
    let service_address = match ServiceAddress::parse(&address) {
        Ok(address) => address,
        Err(e) => {
            warn!("Refusing to open remote desktop: {}", e);
            reporter.fail(&e);
            return;
        }
    };
    let url = match derive_websocket_url(&options.page_origin, &service_address) {
        Ok(url) => url,
        Err(e) => {
            error!("{}", e);
            reporter.fail(&e);
            return;
        }
    };

    reporter.set(BridgePhase::Loading);
    debug!(%url, "Connecting to remote desktop");

    let transport = tokio::select! {
        _ = &mut close_rx => {
            debug!(%url, "Session closed while connecting");
            return;
        }
        result = connect(&url, options.connect_timeout) => match result {
            Ok(transport) => transport,
            Err(e) => {
                warn!(%url, "Remote desktop connection failed: {}", e);
                reporter.fail(&e);
                return;
            }
        },
    };

    let mut stream = RfbStream::new(transport);
    let outcome = tokio::select! {
        _ = &mut close_rx => Outcome::Closed,
        result = render(&mut stream, &options, &reporter, &viewport) => Outcome::Finished(result),
    };

    match outcome {
        Outcome::Closed => {
            match tokio::time::timeout(options.close_timeout, stream.close()).await {
                Ok(Ok(())) => debug!(%url, "Remote desktop closed"),
                Ok(Err(e)) => debug!(%url, "Error while closing remote desktop: {}", e),
                Err(_) => debug!(%url, "Close not acknowledged in time"),
            }
        }
        Outcome::Finished(result) => {
            let err = result.err().unwrap_or_else(|| {
                GatewayError::ProtocolError("Remote desktop stream ended".to_string())
            });
            warn!(%url, "Remote desktop session ended: {}", err);
            reporter.fail(&err);
            let _ = tokio::time::timeout(options.close_timeout, stream.close()).await;
        }
    }
}

async fn connect(url: &Url, timeout: Duration) -> Result<WsTransport, GatewayError> {
    let mut request = url.as_str().into_client_request()?;
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static(WEBSOCKIFY_PROTOCOL),
    );

    let (stream, _response) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
        .await
        .map_err(|_| GatewayError::Timeout(format!("Connecting to {} took longer than {:?}", url, timeout)))??;
    Ok(WsTransport::new(stream))
}

/// Handshake, then apply server updates until the stream fails
async fn render<T: FrameTransport>(
    stream: &mut RfbStream<T>,
    options: &BridgeOptions,
    reporter: &PhaseReporter,
    viewport: &SharedViewport,
) -> Result<(), GatewayError> {
    let init = tokio::time::timeout(options.handshake_timeout, rfb::handshake(stream, options.shared))
        .await
        .map_err(|_| GatewayError::Timeout("RFB handshake".to_string()))??;
    info!(
        version = %init.version,
        width = init.width,
        height = init.height,
        name = %init.name,
        "Remote desktop handshake complete"
    );

    let format = PixelFormat::rgbx8888();
    stream.write(rfb::set_pixel_format(&format)).await?;
    stream
        .write(rfb::set_encodings(&[
            rfb::ENCODING_RAW,
            rfb::ENCODING_COPY_RECT,
            rfb::ENCODING_DESKTOP_SIZE,
        ]))
        .await?;

    let (mut width, mut height) = (init.width, init.height);
    viewport
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .resize(width, height);
    stream
        .write(rfb::framebuffer_update_request(false, width, height))
        .await?;

    let mut ready = false;
    loop {
        match rfb::read_server_message(stream, &format).await? {
            ServerMessage::FramebufferUpdate(rects) => {
                let resized = {
                    let mut viewport = viewport.write().unwrap_or_else(|e| e.into_inner());
                    let resized = apply_update(&mut viewport, rects)?;
                    if resized {
                        (width, height) = viewport.framebuffer_size();
                    }
                    resized
                };

                if !ready {
                    ready = true;
                    reporter.set(BridgePhase::Ready);
                    info!(width, height, "Remote desktop ready");
                }
                stream
                    .write(rfb::framebuffer_update_request(!resized, width, height))
                    .await?;
            }
            ServerMessage::Bell => debug!("Bell"),
            ServerMessage::ServerCutText(text) => debug!(len = text.len(), "Server cut text"),
            ServerMessage::SetColourMapEntries => {}
        }
    }
}

/// Apply one update's rectangles. Returns whether the desktop was resized.
fn apply_update(viewport: &mut Viewport, rects: Vec<Rect>) -> Result<bool, GatewayError> {
    let mut resized = false;
    for rect in rects {
        match rect {
            Rect::Raw {
                x,
                y,
                width,
                height,
                pixels,
            } => viewport.apply_raw(x, y, width, height, &pixels)?,
            Rect::CopyRect {
                x,
                y,
                width,
                height,
                src_x,
                src_y,
            } => viewport.copy_rect(x, y, width, height, src_x, src_y)?,
            Rect::DesktopSize { width, height } => {
                viewport.resize(width, height);
                resized = true;
            }
        }
    }
    viewport.finish_update();
    Ok(resized)
}
