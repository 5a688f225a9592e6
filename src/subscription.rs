//! Subscription manager
//!
//! A caller declares a set of (resource, priority) pairs. The controller
//! answers with a WebSocket poll URL; every frame pushed on that socket is an
//! XHTML fragment holding one or more `<li>` change events. Each event is
//! routed back to the request entry it belongs to and forwarded as a typed
//! [`Notification`] through a bounded channel.
//!
//! The reader runs on its own tokio task, so request/response calls on the
//! same client are never blocked by a busy subscription.

use base64::Engine;
use futures::{Stream, StreamExt};
use regex::Regex;
use std::sync::OnceLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::resources::RwsRequest;
use crate::session::Session;
use crate::types::{IpcMessage, RapidVariable, Signal, SignalAddress};
use crate::{Result, RwsError};

/// WebSocket subprotocol spoken by RWS 2.0 subscription channels.
pub const SUBPROTOCOL: &str = "rws_subscription";

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    ControllerState,
    OperationalMode,
    ExecutionState,
    PersVar,
    IpcQueue,
    Elog,
    Signal,
}

impl ResourceType {
    /// Only persistent variables and signals may be subscribed at high priority.
    pub fn supports_high_priority(&self) -> bool {
        matches!(self, ResourceType::PersVar | ResourceType::Signal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    #[default]
    Low = 0,
    Medium = 1,
    High = 2,
}

/// A subscribable resource together with the parameter it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionResource {
    ControllerState,
    OperationalMode,
    ExecutionState,
    PersVar { task: String, name: String },
    IpcQueue { queue: String },
    Elog { domain: u32 },
    Signal(SignalAddress),
}

impl SubscriptionResource {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            SubscriptionResource::ControllerState => ResourceType::ControllerState,
            SubscriptionResource::OperationalMode => ResourceType::OperationalMode,
            SubscriptionResource::ExecutionState => ResourceType::ExecutionState,
            SubscriptionResource::PersVar { .. } => ResourceType::PersVar,
            SubscriptionResource::IpcQueue { .. } => ResourceType::IpcQueue,
            SubscriptionResource::Elog { .. } => ResourceType::Elog,
            SubscriptionResource::Signal(_) => ResourceType::Signal,
        }
    }

    /// Resource path as sent in the subscription form.
    pub fn path(&self) -> String {
        match self {
            SubscriptionResource::ControllerState => "/rw/panel/ctrl-state".to_string(),
            SubscriptionResource::OperationalMode => "/rw/panel/opmode".to_string(),
            SubscriptionResource::ExecutionState => "/rw/rapid/execution;ctrlexecstate".to_string(),
            SubscriptionResource::PersVar { task, name } => {
                format!("/rw/rapid/symbol/RAPID/{}/{}/data;value", task, name)
            }
            SubscriptionResource::IpcQueue { queue } => format!("/rw/dipc/{}", queue),
            SubscriptionResource::Elog { domain } => format!("/rw/elog/{}", domain),
            SubscriptionResource::Signal(address) => match address.location() {
                Some((network, unit)) => format!("/rw/iosystem/signals/{}/{}/{};state", network, unit, address.name),
                None => format!("/rw/iosystem/signals/{};state", address.name),
            },
        }
    }
}

/// A validated subscription entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    resource: SubscriptionResource,
    priority: Priority,
}

impl SubscriptionRequest {
    pub fn new(resource: SubscriptionResource, priority: Priority) -> Result<Self> {
        if priority == Priority::High && !resource.resource_type().supports_high_priority() {
            return Err(RwsError::InvalidSubscription(format!(
                "{:?} does not support high priority",
                resource.resource_type()
            )));
        }
        Ok(Self { resource, priority })
    }

    pub fn resource(&self) -> &SubscriptionResource {
        &self.resource
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}

/// Build the `POST subscription` request for a set of entries.
///
/// Entries are numbered from 1 on the wire; `N` carries the path, `N-p` the
/// priority and one `resources=N` field lists each entry.
pub fn subscription_request(requests: &[SubscriptionRequest]) -> Result<RwsRequest> {
    if requests.is_empty() {
        return Err(RwsError::InvalidSubscription("no resources requested".to_string()));
    }
    let mut request = RwsRequest::post("subscription");
    for (i, entry) in requests.iter().enumerate() {
        let n = (i + 1).to_string();
        request = request
            .form("resources", n.clone())
            .form(&n, entry.resource.path())
            .form(&format!("{}-p", n), (entry.priority as u8).to_string());
    }
    Ok(request)
}

/// Typed payload of one change event.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    ControllerState(String),
    OperationalMode(String),
    ExecutionState(String),
    Variable(RapidVariable),
    Ipc(IpcMessage),
    EventLog { seqnum: u64 },
    Signal(Signal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Position of the originating entry in the request list.
    pub index: usize,
    pub resource_type: ResourceType,
    pub event: SubscriptionEvent,
}

/// Routes notification fragments back to subscription entries.
#[derive(Debug, Clone)]
pub struct Demultiplexer {
    entries: Vec<(SubscriptionResource, Vec<String>)>,
}

impl Demultiplexer {
    pub fn new(requests: &[SubscriptionRequest]) -> Self {
        let entries = requests
            .iter()
            .map(|r| (r.resource.clone(), route_segments(&r.resource.path())))
            .collect();
        Self { entries }
    }

    /// Split a frame into `<li>` events and route each one.
    pub fn route(&self, frame: &str) -> Vec<Notification> {
        let mut out = Vec::new();
        for caps in item_pattern().captures_iter(frame) {
            let class = &caps[1];
            let body = &caps[2];
            let Some(href) = self_link_pattern().captures(body).map(|c| c[1].to_string()) else {
                debug!("Dropping {} event without self link", class);
                continue;
            };
            let Some(index) = self.match_entry(&href) else {
                debug!("Dropping {} event for unsubscribed resource {}", class, href);
                continue;
            };
            let resource = &self.entries[index].0;
            match extract_event(resource, &href, body) {
                Some(event) => out.push(Notification {
                    index,
                    resource_type: resource.resource_type(),
                    event,
                }),
                None => warn!("Could not extract {} event for {}", class, href),
            }
        }
        out
    }

    /// Entry whose path is the longest segment prefix of `href`.
    fn match_entry(&self, href: &str) -> Option<usize> {
        let target = route_segments(href);
        let mut best: Option<(usize, usize)> = None;
        for (i, (resource, segments)) in self.entries.iter().enumerate() {
            let score = if target.starts_with(segments) {
                segments.len()
            } else if let SubscriptionResource::Signal(address) = resource {
                // Bare-name subscriptions are answered with qualified hrefs
                if address.location().is_none()
                    && target.starts_with(&signal_root())
                    && target.last() == Some(&address.name)
                {
                    signal_root().len() + 1
                } else {
                    continue;
                }
            } else {
                continue;
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        best.map(|(i, _)| i)
    }
}

fn signal_root() -> Vec<String> {
    vec!["rw".to_string(), "iosystem".to_string(), "signals".to_string()]
}

/// Path segments with any `;state`-style suffix removed.
fn route_segments(path: &str) -> Vec<String> {
    let path = path.split(';').next().unwrap_or_default();
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
        .collect()
}

fn span<'a>(body: &'a str, class: &str) -> Option<&'a str> {
    span_pattern()
        .captures_iter(body)
        .find(|c| &c[1] == class)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().trim())
}

fn extract_event(resource: &SubscriptionResource, href: &str, body: &str) -> Option<SubscriptionEvent> {
    match resource {
        SubscriptionResource::ControllerState => {
            span(body, "ctrlstate").map(|v| SubscriptionEvent::ControllerState(v.to_string()))
        }
        SubscriptionResource::OperationalMode => {
            span(body, "opmode").map(|v| SubscriptionEvent::OperationalMode(v.to_string()))
        }
        SubscriptionResource::ExecutionState => {
            span(body, "ctrlexecstate").map(|v| SubscriptionEvent::ExecutionState(v.to_string()))
        }
        SubscriptionResource::PersVar { task, name } => span(body, "value").map(|v| {
            SubscriptionEvent::Variable(RapidVariable {
                task: Some(task.clone()),
                name: name.clone(),
                value: v.to_string(),
            })
        }),
        SubscriptionResource::IpcQueue { queue } => {
            let data = span(body, "dipc-data")?;
            Some(SubscriptionEvent::Ipc(IpcMessage {
                data: data.to_string(),
                userdef: span(body, "dipc-userdef").unwrap_or_default().to_string(),
                msgtype: span(body, "dipc-msgtype").unwrap_or_default().to_string(),
                cmd: span(body, "dipc-cmd").unwrap_or_default().to_string(),
                queue_name: queue.clone(),
            }))
        }
        SubscriptionResource::Elog { .. } => {
            let raw = span(body, "seqnum").or_else(|| route_last(href))?;
            raw.parse().ok().map(|seqnum| SubscriptionEvent::EventLog { seqnum })
        }
        SubscriptionResource::Signal(address) => {
            let lvalue = span(body, "lvalue")?;
            let segments = route_segments(href);
            let (network, unit) = match address.location() {
                Some((n, u)) => (Some(n.to_string()), Some(u.to_string())),
                // rw/iosystem/signals/{network}/{unit}/{name}
                None if segments.len() == 6 => (Some(segments[3].clone()), Some(segments[4].clone())),
                None => (None, None),
            };
            Some(SubscriptionEvent::Signal(Signal {
                name: address.name.clone(),
                network,
                unit,
                lvalue: lvalue.to_string(),
            }))
        }
    }
}

fn route_last(href: &str) -> Option<&str> {
    href.split(';').next()?.rsplit('/').find(|s| !s.is_empty())
}

fn item_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(?s)<li\s+class="([^"]+)"[^>]*>(.*?)</li>"#).expect("item pattern is valid"))
}

fn self_link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"<a\s+href="([^"]+)"\s+rel="self"\s*/?>"#).expect("self link pattern is valid")
    })
}

fn span_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"<span\s+class="([^"]+)"\s*>([^<]*)</span>"#).expect("span pattern is valid")
    })
}

fn poll_link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(wss?://[^"\s<>]+/poll/\d+)"#).expect("poll link pattern is valid"))
}

/// Handle to a running subscription.
///
/// Notifications are read with [`Subscription::next`]. Transport failures
/// arrive as an `Err` item, after which the stream ends. Dropping the handle
/// stops the reader task.
pub struct Subscription {
    receiver: mpsc::Receiver<Result<Notification>>,
    close_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Negotiate the subscription and open its WebSocket channel.
    pub async fn open(session: &Session, requests: Vec<SubscriptionRequest>, capacity: usize) -> Result<Self> {
        let request = subscription_request(&requests)?;
        let response = session.execute_raw(&request).await?;
        if response.status != 201 {
            warn!("Subscription answered with HTTP {} instead of 201", response.status);
        }

        let body = String::from_utf8_lossy(&response.bytes);
        let poll_url = response
            .location
            .clone()
            .filter(|l| l.starts_with("ws"))
            .or_else(|| poll_link_pattern().captures(&body).map(|c| c[1].to_string()))
            .ok_or_else(|| RwsError::malformed("subscription response carries no poll URL"))?;
        info!("Opening subscription channel {} for {} resources", poll_url, requests.len());

        let ws = connect(session, &poll_url).await?;
        let demux = Demultiplexer::new(&requests);
        let (tx, receiver) = mpsc::channel(capacity.max(1));
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(run_websocket(ws, demux, tx, close_rx));

        Ok(Self {
            receiver,
            close_tx: Some(close_tx),
            task,
        })
    }

    /// Demultiplex an arbitrary stream of text frames.
    pub fn from_stream<S>(frames: S, requests: &[SubscriptionRequest], capacity: usize) -> Self
    where
        S: Stream<Item = Result<String>> + Send + Unpin + 'static,
    {
        let demux = Demultiplexer::new(requests);
        let (tx, receiver) = mpsc::channel(capacity.max(1));
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(run_frames(frames, demux, tx, close_rx));
        Self {
            receiver,
            close_tx: Some(close_tx),
            task,
        }
    }

    /// Next notification, or `None` once the channel has ended.
    pub async fn next(&mut self) -> Option<Result<Notification>> {
        self.receiver.recv().await
    }

    /// Close the channel and wait for the reader task to finish.
    pub async fn close(mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
        self.receiver.close();
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                error!("Subscription task failed: {}", e);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn connect(session: &Session, poll_url: &str) -> Result<WsStream> {
    let mut request = poll_url.into_client_request()?;
    let headers = request.headers_mut();
    headers.insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

    let credentials = session.credentials();
    let token = base64::engine::general_purpose::STANDARD
        .encode(format!("{}:{}", credentials.username, credentials.password));
    let auth = HeaderValue::from_str(&format!("Basic {}", token))
        .map_err(|e| RwsError::Config(format!("invalid credentials header: {}", e)))?;
    headers.insert("Authorization", auth);

    if let Some(cookie) = session.cookie_header() {
        let cookie = HeaderValue::from_bytes(cookie.as_bytes())
            .map_err(|e| RwsError::Config(format!("invalid cookie header: {}", e)))?;
        headers.insert("Cookie", cookie);
    }

    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(!session.verify_tls())
        .danger_accept_invalid_hostnames(!session.verify_tls())
        .build()
        .map_err(|e| RwsError::WebSocket(format!("TLS setup failed: {}", e)))?;

    let (ws, _) = connect_async_tls_with_config(request, None, false, Some(Connector::NativeTls(tls))).await?;
    Ok(ws)
}

async fn forward(demux: &Demultiplexer, tx: &mpsc::Sender<Result<Notification>>, frame: &str) -> bool {
    for notification in demux.route(frame) {
        if tx.send(Ok(notification)).await.is_err() {
            return false;
        }
    }
    true
}

async fn run_websocket(
    mut ws: WsStream,
    demux: Demultiplexer,
    tx: mpsc::Sender<Result<Notification>>,
    mut close_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut close_rx => {
                if let Err(e) = ws.close(None).await {
                    debug!("Subscription close handshake failed: {}", e);
                }
                break;
            }
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !forward(&demux, &tx, text.as_str()).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Subscription channel closed by controller");
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    error!("Subscription channel failed: {}", e);
                    let _ = tx.send(Err(e.into())).await;
                    break;
                }
            }
        }
    }
}

async fn run_frames<S>(
    mut frames: S,
    demux: Demultiplexer,
    tx: mpsc::Sender<Result<Notification>>,
    mut close_rx: oneshot::Receiver<()>,
) where
    S: Stream<Item = Result<String>> + Unpin,
{
    loop {
        tokio::select! {
            _ = &mut close_rx => break,
            frame = frames.next() => match frame {
                Some(Ok(text)) => {
                    if !forward(&demux, &tx, &text).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
                None => break,
            }
        }
    }
}
