//! Envelope-level send/receive built on top of a raw [`Connection`].
//!
//! Mirrors `dive-server`'s framing module; kept as a private duplicate
//! rather than a shared dependency since neither side of the wire needs the
//! other's crate.

use dive_proto::{decode_header, decode_payload, encode_message, Message, Result, ENVELOPE_HEADER_SIZE};
use dive_transport::Connection;

pub fn send_message(conn: &Connection, msg: &Message) -> Result<()> {
    conn.send(&encode_message(msg))
}

pub fn receive_message(conn: &Connection, timeout_ms: i64) -> Result<Message> {
    let header = conn.recv(ENVELOPE_HEADER_SIZE, timeout_ms)?;
    let (ty, length) = decode_header(&header)?;
    let payload = conn.recv(length as usize, timeout_ms)?;
    decode_payload(ty, &payload)
}
