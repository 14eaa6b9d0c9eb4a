//! Connection (C2): an abstract stream endpoint supporting connect/accept,
//! send-all, recv-with-timeout, send-file, recv-file — POSIX (abstract-
//! namespace Unix domain socket + TCP) and a Windows-compatible TCP-only
//! variant, plus an in-memory backend for tests.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dive_context::Context;
use dive_proto::{DiveError, Result};

use crate::mem::MemHalf;

/// Sentinel meaning "block indefinitely" for operations that take an
/// explicit millisecond timeout.
pub const NO_TIMEOUT: i64 = -1;
/// The fixed `accept()` timeout the server uses so it can periodically
/// observe a shutdown request.
pub const ACCEPT_TIMEOUT_MS: i64 = 2000;
/// Wall-clock fallback used by the in-memory backend when no explicit
/// timeout is supplied, preserving the source's visible behavior.
pub const MEM_FALLBACK_TIMEOUT_MS: i64 = 5_000;

const CHUNK_SIZE: usize = 4096;

/// Callback invoked after each chunk received by [`Connection::recv_file`]
/// with the cumulative byte count transferred so far.
pub type ProgressCallback<'a> = dyn FnMut(u64) + 'a;

enum ListenerHandle {
    #[cfg(unix)]
    Uds(crate::uds::UdsListener),
    Tcp(TcpListener),
}

enum StreamHandle {
    #[cfg(unix)]
    Uds(crate::uds::UdsStream),
    Tcp(TcpStream),
    Mem(MemHalf),
}

enum Inner {
    Listening(ListenerHandle),
    Established(Arc<StreamHandle>),
    Closed,
}

/// A value owning one stream endpoint and one lifecycle flag (`listening`
/// vs `established`). Exactly one role; close is idempotent; send/recv on a
/// listening endpoint fails with `FailedPrecondition`.
pub struct Connection {
    inner: Mutex<Inner>,
    /// `true` for the in-memory backend: governs the 5-second timeout
    /// fallback documented for fake/local transports.
    is_mem: bool,
}

impl Connection {
    fn from_established(handle: StreamHandle, is_mem: bool) -> Self {
        Self {
            inner: Mutex::new(Inner::Established(Arc::new(handle))),
            is_mem,
        }
    }

    fn from_listener(handle: ListenerHandle) -> Self {
        Self {
            inner: Mutex::new(Inner::Listening(handle)),
            is_mem: false,
        }
    }

    /// Binds and listens on an abstract-namespace Unix domain socket.
    /// `Unimplemented` on non-POSIX platforms.
    #[cfg(unix)]
    pub fn bind_listen_uds(name: &str) -> Result<Self> {
        let listener = crate::uds::UdsListener::bind(name)?;
        Ok(Self::from_listener(ListenerHandle::Uds(listener)))
    }

    #[cfg(not(unix))]
    pub fn bind_listen_uds(_name: &str) -> Result<Self> {
        Err(DiveError::unimplemented(
            "abstract-namespace Unix domain sockets are POSIX-only",
        ))
    }

    /// Connects to an abstract-namespace Unix domain socket by name.
    /// `Unimplemented` on non-POSIX platforms.
    #[cfg(unix)]
    pub fn connect_uds(name: &str) -> Result<Self> {
        let stream = crate::uds::UdsStream::connect(name)?;
        Ok(Self::from_established(StreamHandle::Uds(stream), false))
    }

    #[cfg(not(unix))]
    pub fn connect_uds(_name: &str) -> Result<Self> {
        Err(DiveError::unimplemented(
            "abstract-namespace Unix domain sockets are POSIX-only",
        ))
    }

    /// Connects a TCP client to `host:port`.
    pub fn connect_tcp(host: &str, port: u16) -> Result<Self> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| DiveError::unavailable(format!("resolving {host}:{port}: {e}")))?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr) {
                Ok(stream) => return Ok(Self::from_established(StreamHandle::Tcp(stream), false)),
                Err(e) => last_err = Some(e),
            }
        }
        Err(DiveError::unavailable(format!(
            "connect {host}:{port} failed: {}",
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }

    /// Creates an in-memory duplex pair, useful for testing framing and
    /// protocol logic without a real socket.
    pub fn mem_pair() -> (Self, Self) {
        let (a, b) = MemHalf::pair();
        (
            Self::from_established(StreamHandle::Mem(a), true),
            Self::from_established(StreamHandle::Mem(b), true),
        )
    }

    /// Accepts a new established connection on a listening endpoint, waiting
    /// up to `timeout_ms` (negative = forever).
    pub fn accept(&self, timeout_ms: i64) -> Result<Self> {
        let guard = self.inner.lock().unwrap();
        match &*guard {
            Inner::Listening(listener) => accept_on(listener, timeout_ms),
            Inner::Established(_) => Err(DiveError::failed_precondition(
                "accept on an established connection",
            )),
            Inner::Closed => Err(DiveError::failed_precondition("accept on a closed connection")),
        }
    }

    fn established_handle(&self) -> Result<Arc<StreamHandle>> {
        let guard = self.inner.lock().unwrap();
        match &*guard {
            Inner::Established(handle) => Ok(handle.clone()),
            Inner::Listening(_) => Err(DiveError::failed_precondition(
                "send/recv on a listening endpoint",
            )),
            Inner::Closed => Err(DiveError::failed_precondition("send/recv on a closed connection")),
        }
    }

    /// Sends `bytes`, looping until every byte has been written.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        let handle = self.established_handle()?;
        let mut sent = 0;
        while sent < bytes.len() {
            match write_handle(&handle, &bytes[sent..]) {
                Ok(0) => return Err(DiveError::aborted("peer closed during send")),
                Ok(n) => sent += n,
                Err(e) if is_reset(&e) => {
                    self.close().ok();
                    return Err(DiveError::aborted(e.to_string()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Err(DiveError::unavailable(e.to_string()))
                }
                Err(e) => return Err(DiveError::internal(e.to_string())),
            }
        }
        Ok(())
    }

    /// Receives exactly `size` bytes, looping until complete or a terminal
    /// error occurs. `timeout_ms < 0` blocks indefinitely, except on the
    /// in-memory backend, which falls back to
    /// [`MEM_FALLBACK_TIMEOUT_MS`].
    pub fn recv(&self, size: usize, timeout_ms: i64) -> Result<Vec<u8>> {
        let handle = self.established_handle()?;
        let effective_timeout_ms = if timeout_ms < 0 && self.is_mem {
            MEM_FALLBACK_TIMEOUT_MS
        } else {
            timeout_ms
        };
        let timeout = if effective_timeout_ms < 0 {
            None
        } else {
            Some(Duration::from_millis(effective_timeout_ms as u64))
        };
        set_read_timeout(&handle, timeout)?;

        let mut out = vec![0u8; size];
        let mut received = 0;
        while received < size {
            match read_handle(&handle, &mut out[received..], timeout) {
                Ok(0) => return Err(DiveError::out_of_range("peer closed gracefully")),
                Ok(n) => received += n,
                Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                    return Err(DiveError::deadline_exceeded("recv timed out"))
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(DiveError::out_of_range("peer closed gracefully"))
                }
                Err(e) if is_reset(&e) => {
                    self.close().ok();
                    return Err(DiveError::aborted(e.to_string()));
                }
                Err(e) => return Err(DiveError::internal(e.to_string())),
            }
        }
        Ok(out)
    }

    /// Streams `path`'s content in 4 KiB chunks via [`Connection::send`].
    pub fn send_file(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::open(path)?;
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = file
                .read(&mut buf)
                .map_err(|e| DiveError::data_loss(format!("reading {}: {e}", path.display())))?;
            if n == 0 {
                break;
            }
            self.send(&buf[..n])?;
        }
        Ok(())
    }

    /// Receives exactly `size` bytes and writes them to `path` in 4 KiB
    /// chunks, invoking `progress_cb` with the cumulative count after each.
    /// `ctx` is polled at each chunk boundary; a cancelled context fails the
    /// transfer with `Cancelled` before the next chunk is read, leaving the
    /// partially-written file on disk.
    pub fn recv_file(
        &self,
        path: &Path,
        size: u64,
        ctx: &Context,
        mut progress_cb: Option<&mut ProgressCallback<'_>>,
    ) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        let mut remaining = size;
        let mut total = 0u64;
        while remaining > 0 {
            if ctx.is_cancelled() {
                return Err(DiveError::cancelled("recv_file cancelled"));
            }
            let chunk_len = remaining.min(CHUNK_SIZE as u64) as usize;
            let chunk = self.recv(chunk_len, NO_TIMEOUT)?;
            file.write_all(&chunk)
                .map_err(|e| DiveError::data_loss(format!("writing {}: {e}", path.display())))?;
            remaining -= chunk_len as u64;
            total += chunk_len as u64;
            if let Some(cb) = &mut progress_cb {
                cb(total);
            }
        }
        Ok(())
    }

    /// Closes the connection. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let prev = std::mem::replace(&mut *guard, Inner::Closed);
        match prev {
            Inner::Established(handle) => close_handle(&handle),
            Inner::Listening(_) | Inner::Closed => Ok(()),
        }
    }
}

fn is_reset(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionAborted
    )
}

fn accept_on(listener: &ListenerHandle, timeout_ms: i64) -> Result<Connection> {
    match listener {
        #[cfg(unix)]
        ListenerHandle::Uds(l) => {
            if !crate::uds::poll_readable(l.raw_fd(), timeout_ms)? {
                return Err(DiveError::deadline_exceeded("accept timed out"));
            }
            let stream = l.accept()?;
            Ok(Connection::from_established(StreamHandle::Uds(stream), false))
        }
        ListenerHandle::Tcp(l) => {
            #[cfg(unix)]
            {
                use std::os::fd::AsRawFd;
                if !crate::uds::poll_readable(l.as_raw_fd(), timeout_ms)? {
                    return Err(DiveError::deadline_exceeded("accept timed out"));
                }
            }
            #[cfg(not(unix))]
            {
                let _ = timeout_ms;
            }
            let (stream, _) = l.accept()?;
            Ok(Connection::from_established(StreamHandle::Tcp(stream), false))
        }
    }
}

fn set_read_timeout(handle: &StreamHandle, timeout: Option<Duration>) -> Result<()> {
    match handle {
        #[cfg(unix)]
        StreamHandle::Uds(s) => s.set_read_timeout(timeout),
        StreamHandle::Tcp(s) => s.set_read_timeout(timeout).map_err(Into::into),
        StreamHandle::Mem(_) => Ok(()),
    }
}

fn read_handle(
    handle: &StreamHandle,
    buf: &mut [u8],
    mem_timeout: Option<Duration>,
) -> std::io::Result<usize> {
    match handle {
        #[cfg(unix)]
        StreamHandle::Uds(s) => s.read(buf),
        StreamHandle::Tcp(s) => (&*s).read(buf),
        StreamHandle::Mem(m) => m.read(buf, mem_timeout),
    }
}

fn write_handle(handle: &StreamHandle, buf: &[u8]) -> std::io::Result<usize> {
    match handle {
        #[cfg(unix)]
        StreamHandle::Uds(s) => s.write(buf),
        StreamHandle::Tcp(s) => (&*s).write(buf),
        StreamHandle::Mem(m) => m.write(buf),
    }
}

fn close_handle(handle: &StreamHandle) -> Result<()> {
    match handle {
        #[cfg(unix)]
        StreamHandle::Uds(s) => s.shutdown(),
        StreamHandle::Tcp(s) => {
            match s.shutdown(std::net::Shutdown::Both) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
        StreamHandle::Mem(m) => {
            m.close();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_recv_round_trip_over_mem_pair() {
        let (a, b) = Connection::mem_pair();
        a.send(b"hello, dive").unwrap();
        let received = b.recv(11, 1_000).unwrap();
        assert_eq!(received, b"hello, dive");
    }

    #[test]
    fn recv_on_listening_endpoint_is_failed_precondition() {
        let conn = Connection {
            inner: Mutex::new(Inner::Listening(ListenerHandle::Tcp(
                TcpListener::bind("127.0.0.1:0").unwrap(),
            ))),
            is_mem: false,
        };
        let err = conn.recv(4, 10).unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::FailedPrecondition);
    }

    #[test]
    fn close_is_idempotent() {
        let (a, _b) = Connection::mem_pair();
        a.close().unwrap();
        a.close().unwrap();
    }

    #[test]
    fn recv_after_peer_close_is_out_of_range() {
        let (a, b) = Connection::mem_pair();
        a.close().unwrap();
        let err = b.recv(4, 50).unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::OutOfRange);
    }

    #[test]
    fn tcp_loopback_send_recv_round_trips() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server_conn = Connection::from_listener(ListenerHandle::Tcp(listener));
        let client_thread = std::thread::spawn(move || {
            Connection::connect_tcp("127.0.0.1", addr.port()).unwrap()
        });
        let server_side = server_conn.accept(ACCEPT_TIMEOUT_MS).unwrap();
        let client_side = client_thread.join().unwrap();
        client_side.send(b"ping").unwrap();
        let received = server_side.recv(4, 1_000).unwrap();
        assert_eq!(&received, b"ping");
    }

    #[test]
    fn send_file_recv_file_round_trips_over_mem_pair() {
        let dir = std::env::temp_dir();
        let src_path = dir.join("dive_connection_test_send_file_src");
        let dst_path = dir.join("dive_connection_test_recv_file_dst");
        std::fs::write(&src_path, vec![0xABu8; CHUNK_SIZE * 2 + 17]).unwrap();

        let (a, b) = Connection::mem_pair();
        let src_path_clone = src_path.clone();
        let sender = std::thread::spawn(move || a.send_file(&src_path_clone).unwrap());

        let size = std::fs::metadata(&src_path).unwrap().len();
        let mut total_seen = 0u64;
        b.recv_file(
            &dst_path,
            size,
            &Context::background(),
            Some(&mut |written| total_seen = written),
        )
        .unwrap();
        sender.join().unwrap();

        assert_eq!(total_seen, size);
        let original = std::fs::read(&src_path).unwrap();
        let copied = std::fs::read(&dst_path).unwrap();
        assert_eq!(original, copied);

        std::fs::remove_file(&src_path).ok();
        std::fs::remove_file(&dst_path).ok();
    }

    #[test]
    fn recv_file_observes_a_cancelled_context_before_the_first_chunk() {
        let dst_path = std::env::temp_dir().join("dive_connection_test_recv_file_cancelled");
        let (_a, b) = Connection::mem_pair();
        let (ctx, handle) = Context::new();
        handle.cancel();

        let err = b.recv_file(&dst_path, 4096, &ctx, None).unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::Cancelled);

        std::fs::remove_file(&dst_path).ok();
    }

    #[test]
    fn accept_with_no_pending_client_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let conn = Connection::from_listener(ListenerHandle::Tcp(listener));
        let err = conn.accept(50).unwrap_err();
        assert_eq!(err.code(), dive_proto::StatusCode::DeadlineExceeded);
    }
}
