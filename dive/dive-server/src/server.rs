//! Server (C4): single-client server bound to an abstract-namespace Unix
//! domain socket, grounded on `unix_domain_server.h`/`.cc`'s
//! `UnixDomainServer::Start`/`Stop`/`AcceptAndHandleClientLoop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use dive_proto::{DiveError, Result, StatusCode};
use dive_transport::{Connection, ACCEPT_TIMEOUT_MS, NO_TIMEOUT};

use crate::framing::receive_message;
use crate::handler::MessageHandler;

struct Shared {
    running: AtomicBool,
    listening_conn: Mutex<Option<Connection>>,
    client_conn: Mutex<Option<Arc<Connection>>>,
    stopped: Mutex<bool>,
    stopped_cv: Condvar,
}

/// A single-client server. `Start` spawns a dedicated worker thread that
/// accepts at most one client at a time and dispatches its messages to a
/// user-supplied [`MessageHandler`]; `Stop` unblocks the worker and joins
/// it.
pub struct Server {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                listening_conn: Mutex::new(None),
                client_conn: Mutex::new(None),
                stopped: Mutex::new(true),
                stopped_cv: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Binds `addr` (an abstract-namespace UDS name) and starts the worker
    /// thread. `AlreadyExists` if the server is already running.
    pub fn start(&self, addr: &str, handler: Box<dyn MessageHandler>) -> Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(DiveError::already_exists("server is already running"));
        }
        let listener = match Connection::bind_listen_uds(addr) {
            Ok(l) => l,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        *self.shared.listening_conn.lock().unwrap() = Some(listener);
        *self.shared.stopped.lock().unwrap() = false;

        let shared = self.shared.clone();
        let join = std::thread::spawn(move || accept_and_handle_client_loop(shared, handler));
        *self.worker.lock().unwrap() = Some(join);
        Ok(())
    }

    /// Marks shutdown, closes both endpoints to unblock any blocked syscall,
    /// joins the worker, and signals [`Server::wait`].
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(conn) = self.shared.listening_conn.lock().unwrap().take() {
            conn.close().ok();
        }
        if let Some(conn) = self.shared.client_conn.lock().unwrap().take() {
            conn.close().ok();
        }
        if let Some(handle) = self.worker.lock().unwrap().take() {
            handle.join().ok();
        }
        let mut stopped = self.shared.stopped.lock().unwrap();
        *stopped = true;
        self.shared.stopped_cv.notify_all();
    }

    /// Blocks until the server has stopped.
    pub fn wait(&self) {
        let guard = self.shared.stopped.lock().unwrap();
        let _ = self
            .shared
            .stopped_cv
            .wait_while(guard, |stopped| !*stopped);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

fn accept_and_handle_client_loop(shared: Arc<Shared>, mut handler: Box<dyn MessageHandler>) {
    while shared.running.load(Ordering::SeqCst) {
        let has_client = shared.client_conn.lock().unwrap().is_some();
        if !has_client {
            let accepted = {
                let guard = shared.listening_conn.lock().unwrap();
                match guard.as_ref() {
                    Some(listener) => listener.accept(ACCEPT_TIMEOUT_MS),
                    None => break,
                }
            };
            match accepted {
                Ok(conn) => {
                    *shared.client_conn.lock().unwrap() = Some(Arc::new(conn));
                    handler.on_connect();
                }
                Err(e) if e.code() == StatusCode::DeadlineExceeded => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed, retrying");
                    continue;
                }
            }
            continue;
        }

        // Clone the Arc out and drop the guard before blocking: Stop() needs
        // this same lock to take() and close() the connection to unblock us.
        let conn = {
            let guard = shared.client_conn.lock().unwrap();
            match guard.as_ref() {
                Some(conn) => conn.clone(),
                None => continue,
            }
        };

        let message = receive_message(&conn, NO_TIMEOUT);

        let dispatch_result = match message {
            Ok(msg) => handler.handle_message(msg, &conn),
            Err(e) => Err(e),
        };

        if let Err(e) = dispatch_result {
            if !shared.running.load(Ordering::SeqCst) {
                // Stop() closed our connection to unblock us; this is a
                // clean shutdown, not a per-client error.
                break;
            }
            tracing::info!(error = %e, "client disconnected");
            handler.on_disconnect();
            if let Some(conn) = shared.client_conn.lock().unwrap().take() {
                conn.close().ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::send_message;
    use crate::handler::DefaultMessageHandler;
    use dive_proto::Message;

    fn unique_uds_name(tag: &str) -> String {
        format!(
            "dive-server-test-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        )
    }

    #[test]
    fn start_twice_is_already_exists() {
        let server = Server::new();
        let addr = unique_uds_name("start-twice");
        server
            .start(&addr, Box::new(DefaultMessageHandler::new(|| Ok(String::new()))))
            .unwrap();
        let err = server
            .start(&addr, Box::new(DefaultMessageHandler::new(|| Ok(String::new()))))
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::AlreadyExists);
        server.stop();
    }

    #[test]
    fn handshake_and_ping_round_trip_against_default_handler() {
        let server = Server::new();
        let addr = unique_uds_name("handshake");
        server
            .start(&addr, Box::new(DefaultMessageHandler::new(|| Ok(String::new()))))
            .unwrap();

        let client = Connection::connect_uds(&addr).unwrap();
        send_message(&client, &Message::HandshakeRequest { major: 1, minor: 0 }).unwrap();
        let response = receive_message(&client, 2_000).unwrap();
        assert_eq!(
            response,
            Message::HandshakeResponse { major: 1, minor: 0 }
        );

        send_message(&client, &Message::Ping).unwrap();
        let response = receive_message(&client, 2_000).unwrap();
        assert_eq!(response, Message::Pong);

        server.stop();
    }

    #[test]
    fn stop_unblocks_worker_and_join_completes() {
        let server = Server::new();
        let addr = unique_uds_name("stop");
        server
            .start(&addr, Box::new(DefaultMessageHandler::new(|| Ok(String::new()))))
            .unwrap();
        server.stop();
        assert!(!server.is_running());
    }
}
