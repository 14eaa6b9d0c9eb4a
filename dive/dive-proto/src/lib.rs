//! Wire protocol primitives shared by every Dive capture-and-delivery crate:
//! the byte buffer codec (C1), TLV message framing (C3), and the status-kind
//! vocabulary (§7) used as the one error type across the workspace.

mod buffer;
mod error;
mod message;

pub use buffer::{read_bytes, read_string, read_u32, read_u64, read_u8, ByteBuffer};
pub use error::{DiveError, Result, StatusCode};
pub use message::{
    decode_header, decode_payload, encode_message, encode_payload, Message, MessageType,
    ENVELOPE_HEADER_SIZE, MAX_PAYLOAD_SIZE,
};

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn u32_round_trips(v in any::<u32>()) {
            let mut buf = ByteBuffer::new();
            buf.write_u32(v);
            let mut offset = 0;
            prop_assert_eq!(read_u32(buf.as_slice(), &mut offset).unwrap(), v);
        }

        #[test]
        fn string_round_trips(s in ".*") {
            let mut buf = ByteBuffer::new();
            buf.write_string(&s);
            let mut offset = 0;
            prop_assert_eq!(read_string(buf.as_slice(), &mut offset).unwrap(), s);
        }

        #[test]
        fn handshake_round_trips(major in any::<u32>(), minor in any::<u32>()) {
            let msg = Message::HandshakeRequest { major, minor };
            let payload = encode_payload(&msg);
            let decoded = decode_payload(MessageType::HandshakeRequest, &payload).unwrap();
            prop_assert_eq!(decoded, msg);
        }

        #[test]
        fn envelope_length_always_matches_serialized_payload(path in "[a-zA-Z0-9/_.]{0,64}") {
            let msg = Message::DownloadFileRequest { path };
            let envelope = encode_message(&msg);
            let (_, length) = decode_header(&envelope[..ENVELOPE_HEADER_SIZE]).unwrap();
            prop_assert_eq!(length as usize, envelope.len() - ENVELOPE_HEADER_SIZE);
        }
    }
}
