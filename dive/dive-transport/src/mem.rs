//! In-memory duplex connection backend used by this crate's own tests and by
//! `dive-server`/`dive-client` integration tests that exercise framing logic
//! without a real socket.

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

pub struct MemHalf {
    tx: Mutex<Option<Sender<Vec<u8>>>>,
    rx: Mutex<Receiver<Vec<u8>>>,
    pending: Mutex<VecDeque<u8>>,
}

impl MemHalf {
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel();
        let (tx_b, rx_b) = mpsc::channel();
        (
            Self {
                tx: Mutex::new(Some(tx_a)),
                rx: Mutex::new(rx_b),
                pending: Mutex::new(VecDeque::new()),
            },
            Self {
                tx: Mutex::new(Some(tx_b)),
                rx: Mutex::new(rx_a),
                pending: Mutex::new(VecDeque::new()),
            },
        )
    }

    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let guard = self.tx.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => match tx.send(buf.to_vec()) {
                Ok(()) => Ok(buf.len()),
                Err(_) => Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed")),
            },
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "local half closed")),
        }
    }

    pub fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<usize> {
        {
            let mut pending = self.pending.lock().unwrap();
            if !pending.is_empty() {
                return Ok(drain_into(&mut pending, buf));
            }
        }
        let rx = self.rx.lock().unwrap();
        let chunk = match timeout {
            Some(d) => rx.recv_timeout(d).map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    io::Error::new(io::ErrorKind::WouldBlock, "recv timed out")
                }
                RecvTimeoutError::Disconnected => {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed")
                }
            })?,
            None => rx
                .recv()
                .map_err(|_| io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed"))?,
        };
        drop(rx);
        let mut pending = self.pending.lock().unwrap();
        pending.extend(chunk);
        Ok(drain_into(&mut pending, buf))
    }

    pub fn close(&self) {
        *self.tx.lock().unwrap() = None;
    }
}

fn drain_into(pending: &mut VecDeque<u8>, buf: &mut [u8]) -> usize {
    let n = buf.len().min(pending.len());
    for slot in buf[..n].iter_mut() {
        *slot = pending.pop_front().expect("checked length above");
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let (a, b) = MemHalf::pair();
        a.write(b"hello").unwrap();
        let mut buf = [0u8; 5];
        let n = b.read(&mut buf, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_after_close_is_unexpected_eof() {
        let (a, b) = MemHalf::pair();
        a.close();
        let mut buf = [0u8; 4];
        let err = b.read(&mut buf, Some(Duration::from_millis(50))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn read_with_no_data_times_out() {
        let (_a, b) = MemHalf::pair();
        let mut buf = [0u8; 4];
        let err = b
            .read(&mut buf, Some(Duration::from_millis(20)))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn partial_reads_assemble_across_chunks() {
        let (a, b) = MemHalf::pair();
        a.write(b"ab").unwrap();
        a.write(b"cdef").unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(b.read(&mut buf, None).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(b.read(&mut buf, None).unwrap(), 3);
        assert_eq!(&buf, b"def");
    }
}
