//! Event channel connection.
//!
//! [`EventChannel`] owns the TCP socket the device pushes subscription and
//! alarm messages on. A background task reads the socket, runs the bytes
//! through a [`FrameExtractor`] and sends every frame to a bounded queue. A
//! full queue blocks the reader, which in turn stops reading the socket.
//!
//! How the task ends is reported to a [`ConnectionObserver`], which decides
//! whether to reconnect:
//! - the connect step failed: [`ConnectionObserver::on_failed_connection`]
//! - the device closed the socket: [`ConnectionObserver::on_remote_close`]
//! - any other read error: [`ConnectionObserver::on_error`]

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use wva_core::config::{DEFAULT_MAX_FRAME_LENGTH, DEFAULT_RECONNECT_DELAY_MS};
use wva_protocol::{Frame, FrameExtractor};

const READ_BUFFER_SIZE: usize = 4096;

/// Delay [`ConnectionObserver::on_remote_close`] waits before reconnecting by default.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS);

/// Lifecycle of the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Why the event channel went down.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {addr}: {source}")]
    FailedConnection {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Event channel closed by the device")]
    RemoteClosed,

    #[error("Event channel I/O error: {0}")]
    Transport(#[from] io::Error),
}

/// What the channel should do after going down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Stop,
    ReconnectAfter(Duration),
}

/// Receives event channel lifecycle notifications.
///
/// Callbacks run on the channel's task. The returned [`Recovery`] decides
/// whether the task reconnects.
pub trait ConnectionObserver: Send + Sync {
    fn on_connected(&self) {}

    fn on_error(&self, error: &ConnectionError) -> Recovery {
        Recovery::Stop
    }

    fn on_remote_close(&self) -> Recovery {
        Recovery::ReconnectAfter(DEFAULT_RECONNECT_DELAY)
    }

    fn on_failed_connection(&self, error: &ConnectionError) -> Recovery {
        Recovery::Stop
    }
}

/// Observer that logs every transition and reconnects after a remote close.
#[derive(Debug, Clone)]
pub struct ReconnectObserver {
    delay: Duration,
}

impl ReconnectObserver {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for ReconnectObserver {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

impl ConnectionObserver for ReconnectObserver {
    fn on_connected(&self) {
        info!("Event channel connected");
    }

    fn on_error(&self, error: &ConnectionError) -> Recovery {
        error!("Event channel stopped: {}", error);
        Recovery::Stop
    }

    fn on_remote_close(&self) -> Recovery {
        warn!("Device closed the event channel, reconnecting in {:?}", self.delay);
        Recovery::ReconnectAfter(self.delay)
    }

    fn on_failed_connection(&self, error: &ConnectionError) -> Recovery {
        error!("{}", error);
        Recovery::Stop
    }
}

/// `host:port`, bracketing IPv6 literals.
pub fn socket_address(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// State shared between the channel handle and its task.
struct Shared {
    addr: String,
    observer: Arc<dyn ConnectionObserver>,
    frames: mpsc::Sender<Frame>,
    state: watch::Sender<ConnectionState>,
    stopping: AtomicBool,
}

impl Shared {
    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ConnectionState) {
        // Once stopped, only the final Disconnected may be published.
        if self.is_stopping() && state != ConnectionState::Disconnected {
            return;
        }
        self.state.send_replace(state);
    }

    /// Apply the observer's decision. Returns true to connect again.
    async fn recover(&self, recovery: Recovery, stopped: ConnectionState) -> bool {
        if self.is_stopping() {
            return false;
        }
        match recovery {
            Recovery::Stop => {
                self.set_state(stopped);
                false
            }
            Recovery::ReconnectAfter(delay) => {
                debug!("Reconnecting to {} in {:?}", self.addr, delay);
                self.set_state(ConnectionState::Reconnecting);
                tokio::time::sleep(delay).await;
                !self.is_stopping()
            }
        }
    }
}

/// The device's event channel.
///
/// Dropping the channel stops its task and closes the socket.
pub struct EventChannel {
    shared: Arc<Shared>,
    max_frame_length: usize,
    accepted: Mutex<Option<TcpStream>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventChannel {
    /// Channel that connects to `addr` (`host:port`) when started.
    pub fn new(
        addr: impl Into<String>,
        observer: Arc<dyn ConnectionObserver>,
        frames: mpsc::Sender<Frame>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                addr: addr.into(),
                observer,
                frames,
                state,
                stopping: AtomicBool::new(false),
            }),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            accepted: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Channel over an already open connection. Reconnects go to its peer address.
    pub fn from_stream(
        stream: TcpStream,
        observer: Arc<dyn ConnectionObserver>,
        frames: mpsc::Sender<Frame>,
    ) -> Self {
        let addr = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        let channel = Self::new(addr, observer, frames);
        *channel.accepted.lock() = Some(stream);
        channel
    }

    /// Discard frames longer than `max_frame_length` characters.
    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    pub fn addr(&self) -> &str {
        &self.shared.addr
    }

    /// Spawn the reader task. Does nothing if it is already running.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        self.shared.stopping.store(false, Ordering::SeqCst);
        let accepted = self.accepted.lock().take();
        *task = Some(tokio::spawn(run(
            self.shared.clone(),
            accepted,
            self.max_frame_length,
        )));
    }

    /// Stop the reader task and close the socket.
    ///
    /// Frames already queued stay in the queue.
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.accepted.lock().take();
        self.shared.set_state(ConnectionState::Disconnected);
        debug!("Event channel to {} stopped", self.shared.addr);
    }

    pub fn is_stopped(&self) -> bool {
        self.task.lock().as_ref().map_or(true, |t| t.is_finished())
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("addr", &self.shared.addr)
            .field("state", &self.state())
            .finish()
    }
}

enum ReadEnd {
    RemoteClosed,
    Failed(io::Error),
    /// The frame queue's receiver was dropped.
    ConsumerGone,
}

async fn run(shared: Arc<Shared>, mut accepted: Option<TcpStream>, max_frame_length: usize) {
    loop {
        if shared.is_stopping() {
            return;
        }

        let stream = match accepted.take() {
            Some(stream) => stream,
            None => {
                shared.set_state(ConnectionState::Connecting);
                match TcpStream::connect(shared.addr.as_str()).await {
                    Ok(stream) => stream,
                    Err(source) => {
                        let error = ConnectionError::FailedConnection {
                            addr: shared.addr.clone(),
                            source,
                        };
                        debug!("{}", error);
                        let recovery = shared.observer.on_failed_connection(&error);
                        if shared.recover(recovery, ConnectionState::Failed).await {
                            continue;
                        }
                        return;
                    }
                }
            }
        };

        shared.set_state(ConnectionState::Connected);
        debug!("Event channel connected to {}", shared.addr);
        shared.observer.on_connected();

        // The socket is closed by the time the observer hears about it.
        let (recovery, stopped) = match read_frames(stream, &shared, max_frame_length).await {
            ReadEnd::RemoteClosed => {
                debug!("Event channel closed by {}", shared.addr);
                (shared.observer.on_remote_close(), ConnectionState::Disconnected)
            }
            ReadEnd::Failed(e) => {
                let error = ConnectionError::Transport(e);
                debug!("Event channel to {} failed: {}", shared.addr, error);
                (shared.observer.on_error(&error), ConnectionState::Failed)
            }
            ReadEnd::ConsumerGone => {
                debug!("Frame queue closed, stopping event channel to {}", shared.addr);
                shared.set_state(ConnectionState::Disconnected);
                return;
            }
        };

        if !shared.recover(recovery, stopped).await {
            return;
        }
    }
}

async fn read_frames(mut stream: TcpStream, shared: &Shared, max_frame_length: usize) -> ReadEnd {
    let mut extractor = FrameExtractor::with_max_length(max_frame_length);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => return ReadEnd::RemoteClosed,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return ReadEnd::Failed(e),
        };

        extractor.push_bytes(&buf[..n]);
        for frame in extractor.by_ref() {
            // Blocks while the queue is full.
            if shared.frames.send(frame).await.is_err() {
                return ReadEnd::ConsumerGone;
            }
        }
    }
}
