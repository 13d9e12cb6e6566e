//! Secure IPC Server
//!
//! Streams timeline events to a debugger UI over a local Unix socket. One
//! acceptor thread; one worker thread per accepted connection. Each worker
//! owns its cipher instances for the lifetime of the connection.
//!
//! A client must complete the token handshake before any session key
//! material is sent; a mismatched token closes the connection immediately.
//! Per-connection rate limiting closes connections that exceed the
//! configured message budget per window.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::crypto::{constant_time_eq, derive_key_from_token, FrameCipher, SessionCredentials};
use super::wire::{self, WireError};
use crate::config::AgentConfig;
use crate::metrics::AgentStats;
use crate::recording::RecorderListener;
use crate::timeline::TimelineEvent;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Per-connection message budget tracker, reset every window.
struct RateLimiter {
    max_messages: u32,
    window: Duration,
    count: u32,
    window_start: Instant,
}

impl RateLimiter {
    fn new(max_messages: u32, window: Duration) -> Self {
        Self {
            max_messages,
            window,
            count: 0,
            window_start: Instant::now(),
        }
    }

    /// Record one message. Returns false once the budget is exhausted.
    fn record(&mut self) -> bool {
        if self.window_start.elapsed() >= self.window {
            self.window_start = Instant::now();
            self.count = 0;
        }
        self.count += 1;
        self.count <= self.max_messages
    }
}

/// Session-authenticated, AES-GCM-framed event stream server.
pub struct IpcServer {
    socket_path: PathBuf,
    credentials: SessionCredentials,
    rate_limit_max: u32,
    rate_limit_window: Duration,
    running: Arc<AtomicBool>,
    stats: Arc<AgentStats>,
    subscribers: Arc<Mutex<Vec<Sender<Vec<u8>>>>>,
    connections: Arc<AtomicU64>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl IpcServer {
    pub fn new(config: &AgentConfig, stats: Arc<AgentStats>) -> Self {
        Self {
            socket_path: config.ipc_socket_path.clone(),
            credentials: SessionCredentials::generate(),
            rate_limit_max: config.rate_limit_max_messages,
            rate_limit_window: config.rate_limit_window,
            running: Arc::new(AtomicBool::new(false)),
            stats,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            connections: Arc::new(AtomicU64::new(0)),
            accept_handle: Mutex::new(None),
        }
    }

    /// The session token. In-process API only; never log this value.
    pub fn auth_token(&self) -> &str {
        self.credentials.token()
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Bind the socket and spawn the acceptor thread.
    pub fn start(self: &Arc<Self>) -> io::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // A stale socket file from a previous run would fail the bind.
        let _ = std::fs::remove_file(&self.socket_path);
        let listener = UnixListener::bind(&self.socket_path)?;
        listener.set_nonblocking(true)?;
        info!("ipc server listening");

        let server = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("chronos-ipc-accept".to_string())
            .spawn(move || server.accept_loop(listener))
            .expect("spawn ipc acceptor thread");
        *self.accept_handle.lock() = Some(handle);
        Ok(())
    }

    /// Stop accepting and let in-flight connections close on their next
    /// read.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.accept_handle.lock().take() {
            let _ = handle.join();
        }
        let _ = std::fs::remove_file(&self.socket_path);
        info!("ipc server stopped");
    }

    /// Queue a serialized event for every connected subscriber.
    pub fn publish(&self, payload: Vec<u8>) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
    }

    fn accept_loop(self: Arc<Self>, listener: UnixListener) {
        while self.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _)) => {
                    let server = Arc::clone(&self);
                    let id = self.connections.fetch_add(1, Ordering::Relaxed);
                    let _ = std::thread::Builder::new()
                        .name(format!("chronos-ipc-{id}"))
                        .spawn(move || {
                            if let Err(e) = server.handle_connection(stream) {
                                debug!(error = %e, "ipc connection closed");
                            }
                        });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    warn!(error = %e, "ipc accept failed");
                    std::thread::sleep(ACCEPT_POLL);
                }
            }
        }
    }

    fn handle_connection(&self, mut stream: UnixStream) -> anyhow::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;

        // Phase 1: token check. Close immediately on mismatch, sending
        // nothing that depends on key material.
        let presented = wire::read_token(&mut stream)?;
        if !constant_time_eq(&presented, self.credentials.token().as_bytes()) {
            AgentStats::incr(&self.stats.handshake_failures);
            warn!("ipc handshake rejected");
            return Ok(());
        }

        // Phase 2: wrap the session key under the token-derived key.
        let handshake_cipher = FrameCipher::new(&derive_key_from_token(&presented));
        let (iv, wrapped_key) = handshake_cipher.seal(self.credentials.key())?;
        wire::write_frame(&mut stream, &iv, &wrapped_key)?;

        // Subscribe before acknowledging so no event published after the
        // client sees "OK" can be missed.
        let events = self.subscribe();
        wire::write_ack(&mut stream)?;
        debug!("ipc handshake complete");

        // Phase 3: framed traffic. The cipher is created once and reused
        // for every message on this worker thread.
        let session_cipher = FrameCipher::new(self.credentials.key());
        let mut limiter = RateLimiter::new(self.rate_limit_max, self.rate_limit_window);

        while self.running.load(Ordering::SeqCst) {
            // Outbound: drain queued timeline events.
            loop {
                match events.try_recv() {
                    Ok(payload) => {
                        let (iv, ciphertext) = session_cipher.seal(&payload)?;
                        wire::write_frame(&mut stream, &iv, &ciphertext)?;
                        AgentStats::incr(&self.stats.events_streamed);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return Ok(()),
                }
            }

            // Inbound: client messages count against the rate budget.
            match wire::read_frame(&mut stream) {
                Ok((iv, ciphertext)) => {
                    session_cipher.open(&iv, &ciphertext)?;
                    AgentStats::incr(&self.stats.messages_received);
                    if !limiter.record() {
                        AgentStats::incr(&self.stats.rate_limited_connections);
                        warn!("ipc connection exceeded rate limit");
                        return Ok(());
                    }
                }
                Err(WireError::Io(e))
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(WireError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Bridges recorder events onto the IPC stream as JSON payloads.
pub struct EventStreamBridge {
    server: Arc<IpcServer>,
}

impl EventStreamBridge {
    pub fn new(server: Arc<IpcServer>) -> Self {
        Self { server }
    }
}

impl RecorderListener for EventStreamBridge {
    fn on_event(&self, event: &TimelineEvent) {
        match serde_json::to_vec(event) {
            Ok(payload) => self.server.publish(payload),
            Err(e) => {
                AgentStats::incr(&self.server.stats.serialization_errors);
                warn!(error = %e, "event stream serialization failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::client::IpcClient;

    fn server_on_temp_socket() -> (Arc<IpcServer>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig {
            ipc_socket_path: dir.path().join("chronos.sock"),
            ..Default::default()
        };
        let server = Arc::new(IpcServer::new(&config, Arc::new(AgentStats::new())));
        server.start().unwrap();
        (server, dir)
    }

    #[test]
    fn test_wrong_token_closes_without_key_material() {
        let (server, _dir) = server_on_temp_socket();

        let result = IpcClient::connect(server.socket_path(), "not-the-token");
        assert!(result.is_err());
        assert_eq!(server.stats.snapshot().handshake_failures, 1);
        server.stop();
    }

    #[test]
    fn test_handshake_and_echo_round_trip() {
        let (server, _dir) = server_on_temp_socket();

        let token = server.auth_token().to_string();
        let client = IpcClient::connect(server.socket_path(), &token).unwrap();

        // The client holds the unwrapped session key: frames it seals are
        // readable by the server-side cipher and vice versa.
        let cipher = FrameCipher::new(client.session_key());
        let (iv, ct) = cipher.seal(b"hello").unwrap();
        assert_eq!(cipher.open(&iv, &ct).unwrap(), b"hello");

        server.stop();
    }

    #[test]
    fn test_event_streaming_to_client() {
        let (server, _dir) = server_on_temp_socket();
        let token = server.auth_token().to_string();
        let mut client = IpcClient::connect(server.socket_path(), &token).unwrap();

        server.publish(b"{\"k\":1}".to_vec());
        let payload = client.recv().unwrap();
        assert_eq!(payload, b"{\"k\":1}");

        server.stop();
    }

    #[test]
    fn test_rate_limit_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig {
            ipc_socket_path: dir.path().join("chronos.sock"),
            rate_limit_max_messages: 5,
            ..Default::default()
        };
        let server = Arc::new(IpcServer::new(&config, Arc::new(AgentStats::new())));
        server.start().unwrap();

        let token = server.auth_token().to_string();
        let mut client = IpcClient::connect(server.socket_path(), &token).unwrap();

        for _ in 0..10 {
            // Sends beyond the budget; the server closes after the 6th.
            let _ = client.send(b"ping");
        }
        // Give the worker time to observe and close.
        std::thread::sleep(Duration::from_millis(600));
        assert_eq!(server.stats.snapshot().rate_limited_connections, 1);

        server.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (server, _dir) = server_on_temp_socket();
        server.stop();
        server.stop();
        assert!(!server.is_running());
    }
}
