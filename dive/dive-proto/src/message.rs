//! Message Framing (C3): the TLV envelope `{type:u32, length:u32,
//! payload:bytes}` and the typed messages carried inside it.
//!
//! Registration of a (de)serializer per [`MessageType`] is compile-time: the
//! match arms in [`encode_payload`] and [`decode_payload`] are the registry.
//! Every enumerated type has both arms; there is no entry point for an
//! unregistered type to reach either function.

use std::fmt;

use crate::buffer::{read_string, read_u32, ByteBuffer};
use crate::error::{DiveError, Result};

/// Maximum payload size accepted on the wire: 16 MiB. A larger declared
/// length is treated as protocol corruption, not merely a large message.
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// The fixed on-wire discriminator for a [`Message`]. Values are part of the
/// wire protocol and must never change.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    HandshakeRequest = 1,
    HandshakeResponse = 2,
    Ping = 3,
    Pong = 4,
    Pm4CaptureRequest = 5,
    Pm4CaptureResponse = 6,
    DownloadFileRequest = 7,
    DownloadFileResponse = 8,
    FileSizeRequest = 9,
    FileSizeResponse = 10,
}

impl MessageType {
    pub const ALL: [MessageType; 10] = [
        MessageType::HandshakeRequest,
        MessageType::HandshakeResponse,
        MessageType::Ping,
        MessageType::Pong,
        MessageType::Pm4CaptureRequest,
        MessageType::Pm4CaptureResponse,
        MessageType::DownloadFileRequest,
        MessageType::DownloadFileResponse,
        MessageType::FileSizeRequest,
        MessageType::FileSizeResponse,
    ];
}

impl TryFrom<u32> for MessageType {
    type Error = DiveError;

    fn try_from(v: u32) -> Result<Self> {
        match v {
            1 => Ok(MessageType::HandshakeRequest),
            2 => Ok(MessageType::HandshakeResponse),
            3 => Ok(MessageType::Ping),
            4 => Ok(MessageType::Pong),
            5 => Ok(MessageType::Pm4CaptureRequest),
            6 => Ok(MessageType::Pm4CaptureResponse),
            7 => Ok(MessageType::DownloadFileRequest),
            8 => Ok(MessageType::DownloadFileResponse),
            9 => Ok(MessageType::FileSizeRequest),
            10 => Ok(MessageType::FileSizeResponse),
            other => Err(DiveError::invalid_argument(format!(
                "unknown message type: {other}"
            ))),
        }
    }
}

impl From<MessageType> for u32 {
    fn from(t: MessageType) -> u32 {
        t as u32
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::HandshakeRequest => "HandshakeRequest",
            MessageType::HandshakeResponse => "HandshakeResponse",
            MessageType::Ping => "Ping",
            MessageType::Pong => "Pong",
            MessageType::Pm4CaptureRequest => "Pm4CaptureRequest",
            MessageType::Pm4CaptureResponse => "Pm4CaptureResponse",
            MessageType::DownloadFileRequest => "DownloadFileRequest",
            MessageType::DownloadFileResponse => "DownloadFileResponse",
            MessageType::FileSizeRequest => "FileSizeRequest",
            MessageType::FileSizeResponse => "FileSizeResponse",
        };
        f.write_str(s)
    }
}

/// A typed protocol message. The payload shape is fixed by the variant;
/// [`Message::message_type`] gives the wire discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    HandshakeRequest { major: u32, minor: u32 },
    HandshakeResponse { major: u32, minor: u32 },
    Ping,
    Pong,
    Pm4CaptureRequest,
    Pm4CaptureResponse { capture_file_path: String },
    DownloadFileRequest { path: String },
    DownloadFileResponse {
        found: bool,
        error_reason: String,
        file_path: String,
        file_size_str: String,
    },
    FileSizeRequest { path: String },
    FileSizeResponse {
        found: bool,
        error_reason: String,
        file_size_str: String,
    },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::HandshakeRequest { .. } => MessageType::HandshakeRequest,
            Message::HandshakeResponse { .. } => MessageType::HandshakeResponse,
            Message::Ping => MessageType::Ping,
            Message::Pong => MessageType::Pong,
            Message::Pm4CaptureRequest => MessageType::Pm4CaptureRequest,
            Message::Pm4CaptureResponse { .. } => MessageType::Pm4CaptureResponse,
            Message::DownloadFileRequest { .. } => MessageType::DownloadFileRequest,
            Message::DownloadFileResponse { .. } => MessageType::DownloadFileResponse,
            Message::FileSizeRequest { .. } => MessageType::FileSizeRequest,
            Message::FileSizeResponse { .. } => MessageType::FileSizeResponse,
        }
    }
}

fn write_found_flag(buf: &mut ByteBuffer, found: bool) {
    buf.write_u32(if found { 1 } else { 0 });
}

fn read_found_flag(payload: &[u8], offset: &mut usize) -> Result<bool> {
    Ok(read_u32(payload, offset)? != 0)
}

/// Serializes just the payload of a message (no envelope header).
pub fn encode_payload(msg: &Message) -> Vec<u8> {
    let mut buf = ByteBuffer::new();
    match msg {
        Message::HandshakeRequest { major, minor } | Message::HandshakeResponse { major, minor } => {
            buf.write_u32(*major);
            buf.write_u32(*minor);
        }
        Message::Ping | Message::Pong | Message::Pm4CaptureRequest => {}
        Message::Pm4CaptureResponse { capture_file_path } => {
            buf.write_string(capture_file_path);
        }
        Message::DownloadFileRequest { path } | Message::FileSizeRequest { path } => {
            buf.write_string(path);
        }
        Message::DownloadFileResponse {
            found,
            error_reason,
            file_path,
            file_size_str,
        } => {
            write_found_flag(&mut buf, *found);
            buf.write_string(error_reason);
            buf.write_string(file_path);
            buf.write_string(file_size_str);
        }
        Message::FileSizeResponse {
            found,
            error_reason,
            file_size_str,
        } => {
            write_found_flag(&mut buf, *found);
            buf.write_string(error_reason);
            buf.write_string(file_size_str);
        }
    }
    buf.into_vec()
}

/// Deserializes a payload given its already-decoded [`MessageType`].
/// Leftover trailing bytes are not an error (forward-compatible extension);
/// a payload shorter than required fails with `OutOfRange`.
pub fn decode_payload(ty: MessageType, payload: &[u8]) -> Result<Message> {
    let mut offset = 0;
    let msg = match ty {
        MessageType::HandshakeRequest => {
            let major = read_u32(payload, &mut offset)?;
            let minor = read_u32(payload, &mut offset)?;
            Message::HandshakeRequest { major, minor }
        }
        MessageType::HandshakeResponse => {
            let major = read_u32(payload, &mut offset)?;
            let minor = read_u32(payload, &mut offset)?;
            Message::HandshakeResponse { major, minor }
        }
        MessageType::Ping => Message::Ping,
        MessageType::Pong => Message::Pong,
        MessageType::Pm4CaptureRequest => Message::Pm4CaptureRequest,
        MessageType::Pm4CaptureResponse => {
            let capture_file_path = read_string(payload, &mut offset)?;
            Message::Pm4CaptureResponse { capture_file_path }
        }
        MessageType::DownloadFileRequest => {
            let path = read_string(payload, &mut offset)?;
            Message::DownloadFileRequest { path }
        }
        MessageType::DownloadFileResponse => {
            let found = read_found_flag(payload, &mut offset)?;
            let error_reason = read_string(payload, &mut offset)?;
            let file_path = read_string(payload, &mut offset)?;
            let file_size_str = read_string(payload, &mut offset)?;
            Message::DownloadFileResponse {
                found,
                error_reason,
                file_path,
                file_size_str,
            }
        }
        MessageType::FileSizeRequest => {
            let path = read_string(payload, &mut offset)?;
            Message::FileSizeRequest { path }
        }
        MessageType::FileSizeResponse => {
            let found = read_found_flag(payload, &mut offset)?;
            let error_reason = read_string(payload, &mut offset)?;
            let file_size_str = read_string(payload, &mut offset)?;
            Message::FileSizeResponse {
                found,
                error_reason,
                file_size_str,
            }
        }
    };
    Ok(msg)
}

/// Serializes a full envelope: `type`, `length`, then the payload bytes.
pub fn encode_message(msg: &Message) -> Vec<u8> {
    let payload = encode_payload(msg);
    let mut envelope = ByteBuffer::with_capacity(8 + payload.len());
    envelope.write_u32(msg.message_type().into());
    envelope.write_u32(payload.len() as u32);
    envelope.write_bytes(&payload);
    envelope.into_vec()
}

/// Parses the 8-byte envelope header, returning the message type and
/// declared payload length. Fails with `InvalidArgument` for an unknown
/// type, `ResourceExhausted` if the declared length exceeds
/// [`MAX_PAYLOAD_SIZE`].
pub fn decode_header(header: &[u8]) -> Result<(MessageType, u32)> {
    let mut offset = 0;
    let raw_type = read_u32(header, &mut offset)?;
    let ty = MessageType::try_from(raw_type)?;
    let length = read_u32(header, &mut offset)?;
    if length > MAX_PAYLOAD_SIZE {
        return Err(DiveError::resource_exhausted(format!(
            "payload length {length} exceeds maximum {MAX_PAYLOAD_SIZE}"
        )));
    }
    Ok((ty, length))
}

/// The fixed size of the envelope header (`type` + `length`), in bytes.
pub const ENVELOPE_HEADER_SIZE: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::HandshakeRequest { major: 1, minor: 0 },
            Message::HandshakeResponse {
                major: 345_612,
                minor: 567_348,
            },
            Message::Ping,
            Message::Pong,
            Message::Pm4CaptureRequest,
            Message::Pm4CaptureResponse {
                capture_file_path: "/sdcard/capture_001.gfxr".to_string(),
            },
            Message::DownloadFileRequest {
                path: "/tmp/x".to_string(),
            },
            Message::DownloadFileResponse {
                found: true,
                error_reason: String::new(),
                file_path: "/tmp/x".to_string(),
                file_size_str: "33".to_string(),
            },
            Message::FileSizeRequest {
                path: "/tmp/missing".to_string(),
            },
            Message::FileSizeResponse {
                found: false,
                error_reason: "no such file".to_string(),
                file_size_str: String::new(),
            },
        ]
    }

    #[test]
    fn every_registered_type_round_trips() {
        for msg in sample_messages() {
            let ty = msg.message_type();
            let payload = encode_payload(&msg);
            let decoded = decode_payload(ty, &payload).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn envelope_length_equals_payload_length() {
        for msg in sample_messages() {
            let envelope = encode_message(&msg);
            let (ty, length) = decode_header(&envelope[..ENVELOPE_HEADER_SIZE]).unwrap();
            assert_eq!(ty, msg.message_type());
            assert_eq!(length as usize, envelope.len() - ENVELOPE_HEADER_SIZE);
        }
    }

    #[test]
    fn unknown_type_is_invalid_argument() {
        let mut header = ByteBuffer::new();
        header.write_u32(999);
        header.write_u32(0);
        let err = decode_header(header.as_slice()).unwrap_err();
        assert_eq!(err.code(), crate::error::StatusCode::InvalidArgument);
    }

    #[test]
    fn oversize_length_is_resource_exhausted_before_any_payload_read() {
        let mut header = ByteBuffer::new();
        header.write_u32(MessageType::Ping.into());
        header.write_u32(MAX_PAYLOAD_SIZE + 1);
        let err = decode_header(header.as_slice()).unwrap_err();
        assert_eq!(err.code(), crate::error::StatusCode::ResourceExhausted);
    }

    #[test]
    fn empty_handshake_request_payload_is_malformed() {
        let err = decode_payload(MessageType::HandshakeRequest, &[]).unwrap_err();
        assert_eq!(err.code(), crate::error::StatusCode::OutOfRange);
    }

    #[test]
    fn leftover_trailing_bytes_are_not_an_error() {
        let mut payload = ByteBuffer::new();
        payload.write_u32(0);
        payload.write_bytes(b"trailing garbage that should be ignored");
        let decoded = decode_payload(MessageType::Pong, payload.as_slice());
        // Pong has no fields: decoding succeeds regardless of what follows.
        assert_eq!(decoded.unwrap(), Message::Pong);
    }

    #[test]
    fn string_carrier_permits_empty_strings() {
        let msg = Message::Pm4CaptureResponse {
            capture_file_path: String::new(),
        };
        let payload = encode_payload(&msg);
        assert_eq!(decode_payload(MessageType::Pm4CaptureResponse, &payload).unwrap(), msg);
    }
}
