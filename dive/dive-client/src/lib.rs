//! Client (C5): connects to host:port, runs the version handshake, keeps a
//! background keep-alive thread alive, and exposes typed request methods.
//! Grounded on the source's `tcp_client.h`/`.cc`.

mod framing;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use dive_context::Context;
use dive_proto::{DiveError, Message, MessageType, Result};
use dive_transport::{Connection, NO_TIMEOUT};

use framing::{receive_message, send_message};

/// Handshake version this client speaks; the server is expected to echo it
/// verbatim.
pub const HANDSHAKE_MAJOR_VERSION: u32 = 1;
pub const HANDSHAKE_MINOR_VERSION: u32 = 0;

/// Default keep-alive ping interval.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);
/// Deadline for a keep-alive `Pong` reply.
pub const PING_TIMEOUT_MS: i64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Disconnected,
    Connecting,
    Connected,
    ConnectionFailed,
}

struct ClientShared {
    conn: Mutex<Option<Arc<Connection>>>,
    status: Mutex<ClientStatus>,
    /// Serializes every request/response exchange (including keep-alive
    /// pings) so concurrent callers never interleave a half-framed message.
    request_lock: Mutex<()>,
}

struct KeepAlive {
    running: Arc<AtomicBool>,
    wake: Arc<(Mutex<bool>, Condvar)>,
    handle: JoinHandle<()>,
}

/// A TCP client for the on-device RPC service.
pub struct Client {
    shared: Arc<ClientShared>,
    keep_alive: Mutex<Option<KeepAlive>>,
    keep_alive_interval: Duration,
}

impl Client {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ClientShared {
                conn: Mutex::new(None),
                status: Mutex::new(ClientStatus::Disconnected),
                request_lock: Mutex::new(()),
            }),
            keep_alive: Mutex::new(None),
            keep_alive_interval: KEEP_ALIVE_INTERVAL,
        }
    }

    /// Overrides the keep-alive interval (tests use a short interval so
    /// they don't have to wait 5 real seconds).
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn status(&self) -> ClientStatus {
        *self.shared.status.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ClientStatus::Connected
    }

    /// `DISCONNECTED -> CONNECTING -> CONNECTED`, performing the version
    /// handshake and starting the keep-alive thread along the way.
    /// `CONNECTION_FAILED` on any step's failure.
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        *self.shared.status.lock().unwrap() = ClientStatus::Connecting;

        let conn = match Connection::connect_tcp(host, port) {
            Ok(conn) => Arc::new(conn),
            Err(e) => {
                *self.shared.status.lock().unwrap() = ClientStatus::ConnectionFailed;
                return Err(e);
            }
        };
        *self.shared.conn.lock().unwrap() = Some(conn.clone());

        if let Err(e) = perform_handshake(&self.shared, &conn) {
            conn.close().ok();
            *self.shared.conn.lock().unwrap() = None;
            *self.shared.status.lock().unwrap() = ClientStatus::ConnectionFailed;
            return Err(e);
        }

        self.start_keep_alive();
        *self.shared.status.lock().unwrap() = ClientStatus::Connected;
        Ok(())
    }

    pub fn disconnect(&self) {
        self.stop_keep_alive();
        if let Some(conn) = self.shared.conn.lock().unwrap().take() {
            conn.close().ok();
        }
        *self.shared.status.lock().unwrap() = ClientStatus::Disconnected;
    }

    fn start_keep_alive(&self) {
        let running = Arc::new(AtomicBool::new(true));
        let wake = Arc::new((Mutex::new(false), Condvar::new()));
        let shared = self.shared.clone();
        let interval = self.keep_alive_interval;
        let thread_running = running.clone();
        let thread_wake = wake.clone();
        let handle = std::thread::spawn(move || {
            keep_alive_loop(shared, thread_running, thread_wake, interval)
        });
        *self.keep_alive.lock().unwrap() = Some(KeepAlive {
            running,
            wake,
            handle,
        });
    }

    fn stop_keep_alive(&self) {
        if let Some(ka) = self.keep_alive.lock().unwrap().take() {
            ka.running.store(false, Ordering::SeqCst);
            {
                let (lock, cv) = &*ka.wake;
                let mut signaled = lock.lock().unwrap();
                *signaled = true;
                cv.notify_all();
            }
            ka.handle.join().ok();
        }
    }

    fn current_conn(&self) -> Result<Arc<Connection>> {
        self.shared
            .conn
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DiveError::failed_precondition("client is not connected"))
    }

    fn request_response(&self, request: &Message, expected: MessageType) -> Result<Message> {
        if !self.is_connected() {
            return Err(DiveError::failed_precondition("client is not connected"));
        }
        let _guard = self.shared.request_lock.lock().unwrap();
        let conn = self.current_conn()?;
        send_message(&conn, request)?;
        let response = receive_message(&conn, NO_TIMEOUT)?;
        if response.message_type() != expected {
            return Err(DiveError::invalid_argument(format!(
                "expected {expected}, got {}",
                response.message_type()
            )));
        }
        Ok(response)
    }

    pub fn ping_server(&self) -> Result<()> {
        self.request_response(&Message::Ping, MessageType::Pong)
            .map(|_| ())
    }

    pub fn start_pm4_capture(&self) -> Result<String> {
        match self.request_response(&Message::Pm4CaptureRequest, MessageType::Pm4CaptureResponse)? {
            Message::Pm4CaptureResponse { capture_file_path } => Ok(capture_file_path),
            _ => unreachable!("request_response validated the message type"),
        }
    }

    /// Returns `None` if the server reports the path was not found.
    pub fn get_capture_file_size(&self, path: &str) -> Result<Option<u64>> {
        let request = Message::FileSizeRequest {
            path: path.to_string(),
        };
        match self.request_response(&request, MessageType::FileSizeResponse)? {
            Message::FileSizeResponse {
                found,
                file_size_str,
                ..
            } => {
                if !found {
                    return Ok(None);
                }
                Ok(Some(file_size_str.parse::<u64>()?))
            }
            _ => unreachable!("request_response validated the message type"),
        }
    }

    /// Downloads `remote_path` to `local_path`, invoking `progress_cb` with
    /// the cumulative byte count after each chunk. Holds the client's
    /// request lock for the entire transfer. `ctx` is polled between chunks
    /// so a caller can abort a large download without tearing down the
    /// connection.
    pub fn download_file_from_server(
        &self,
        remote_path: &str,
        local_path: &Path,
        ctx: &Context,
        mut progress_cb: Option<&mut dyn FnMut(u64)>,
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(DiveError::failed_precondition("client is not connected"));
        }
        let _guard = self.shared.request_lock.lock().unwrap();
        let conn = self.current_conn()?;
        send_message(
            &conn,
            &Message::DownloadFileRequest {
                path: remote_path.to_string(),
            },
        )?;
        match receive_message(&conn, NO_TIMEOUT)? {
            Message::DownloadFileResponse {
                found,
                error_reason,
                file_size_str,
                ..
            } => {
                if !found {
                    return Err(DiveError::not_found(error_reason));
                }
                let size: u64 = file_size_str.parse()?;
                conn.recv_file(local_path, size, ctx, progress_cb.as_deref_mut())
            }
            other => Err(DiveError::invalid_argument(format!(
                "expected DownloadFileResponse, got {}",
                other.message_type()
            ))),
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop_keep_alive();
    }
}

fn perform_handshake(shared: &ClientShared, conn: &Connection) -> Result<()> {
    let _guard = shared.request_lock.lock().unwrap();
    send_message(
        conn,
        &Message::HandshakeRequest {
            major: HANDSHAKE_MAJOR_VERSION,
            minor: HANDSHAKE_MINOR_VERSION,
        },
    )?;
    match receive_message(conn, NO_TIMEOUT)? {
        Message::HandshakeResponse { major, minor } => {
            if major != HANDSHAKE_MAJOR_VERSION || minor != HANDSHAKE_MINOR_VERSION {
                return Err(DiveError::failed_precondition(format!(
                    "handshake version mismatch: server speaks {major}.{minor}, client speaks {HANDSHAKE_MAJOR_VERSION}.{HANDSHAKE_MINOR_VERSION}"
                )));
            }
            Ok(())
        }
        other => Err(DiveError::invalid_argument(format!(
            "expected HandshakeResponse, got {}",
            other.message_type()
        ))),
    }
}

fn keep_alive_loop(
    shared: Arc<ClientShared>,
    running: Arc<AtomicBool>,
    wake: Arc<(Mutex<bool>, Condvar)>,
    interval: Duration,
) {
    let (lock, cv) = &*wake;
    loop {
        let mut signaled = lock.lock().unwrap();
        let result = cv
            .wait_timeout_while(signaled, interval, |s| !*s && running.load(Ordering::SeqCst))
            .unwrap();
        signaled = result.0;
        if !running.load(Ordering::SeqCst) {
            return;
        }
        *signaled = false;
        drop(signaled);

        if let Err(e) = ping_once(&shared) {
            tracing::warn!(error = %e, "keep-alive ping failed, marking connection failed");
            *shared.status.lock().unwrap() = ClientStatus::ConnectionFailed;
            return;
        }
    }
}

fn ping_once(shared: &ClientShared) -> Result<()> {
    let _guard = shared.request_lock.lock().unwrap();
    let conn = shared
        .conn
        .lock()
        .unwrap()
        .clone()
        .ok_or_else(|| DiveError::failed_precondition("client is not connected"))?;
    send_message(&conn, &Message::Ping)?;
    match receive_message(&conn, PING_TIMEOUT_MS)? {
        Message::Pong => Ok(()),
        other => Err(DiveError::invalid_argument(format!(
            "expected Pong, got {}",
            other.message_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dive_server::{DefaultMessageHandler, Server};

    fn unique_uds_name(tag: &str) -> String {
        format!(
            "dive-client-test-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        )
    }

    #[test]
    fn ping_server_round_trips_over_mem_pair() {
        let (server_conn, client_conn) = Connection::mem_pair();
        std::thread::spawn(move || {
            let msg = receive_message(&server_conn, 1_000).unwrap();
            assert_eq!(msg, Message::Ping);
            send_message(&server_conn, &Message::Pong).unwrap();
        });

        let client = Client::new();
        *client.shared.conn.lock().unwrap() = Some(Arc::new(client_conn));
        *client.shared.status.lock().unwrap() = ClientStatus::Connected;
        client.ping_server().unwrap();
    }

    #[test]
    fn get_capture_file_size_returns_none_when_not_found() {
        let (server_conn, client_conn) = Connection::mem_pair();
        std::thread::spawn(move || {
            let msg = receive_message(&server_conn, 1_000).unwrap();
            assert_eq!(
                msg,
                Message::FileSizeRequest {
                    path: "/missing".to_string()
                }
            );
            send_message(
                &server_conn,
                &Message::FileSizeResponse {
                    found: false,
                    error_reason: "no such file".to_string(),
                    file_size_str: String::new(),
                },
            )
            .unwrap();
        });

        let client = Client::new();
        *client.shared.conn.lock().unwrap() = Some(Arc::new(client_conn));
        *client.shared.status.lock().unwrap() = ClientStatus::Connected;
        assert_eq!(client.get_capture_file_size("/missing").unwrap(), None);
    }

    #[test]
    fn connect_over_uds_performs_handshake_and_reaches_connected() {
        let server = Server::new();
        let addr = unique_uds_name("connect");
        server
            .start(&addr, Box::new(DefaultMessageHandler::new(|| Ok(String::new()))))
            .unwrap();

        // The client abstraction targets TCP per the host deployment model;
        // exercise the same handshake state machine directly against a raw
        // UDS connection here instead of duplicating Client::connect's TCP
        // dial step.
        let conn = Connection::connect_uds(&addr).unwrap();
        send_message(
            &conn,
            &Message::HandshakeRequest {
                major: HANDSHAKE_MAJOR_VERSION,
                minor: HANDSHAKE_MINOR_VERSION,
            },
        )
        .unwrap();
        let response = receive_message(&conn, 2_000).unwrap();
        assert_eq!(
            response,
            Message::HandshakeResponse {
                major: HANDSHAKE_MAJOR_VERSION,
                minor: HANDSHAKE_MINOR_VERSION
            }
        );
        server.stop();
    }

    #[test]
    fn unconnected_client_rejects_requests() {
        let client = Client::new();
        let err = client.ping_server().unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::FailedPrecondition);
    }
}
