//! The `MessageHandler` extension point and the built-in default handler.

use dive_proto::{Message, Result};
use dive_transport::Connection;

use crate::framing::send_message;
use crate::handlers;

/// Callback interface driven by the server's worker thread once per
/// connected client.
pub trait MessageHandler: Send {
    fn on_connect(&mut self) {}
    fn on_disconnect(&mut self) {}
    fn handle_message(&mut self, msg: Message, conn: &Connection) -> Result<()>;
}

/// The handler wired up when no custom `MessageHandler` is supplied:
/// handshake echo, ping/pong, file-size, download, and a PM4 capture
/// trigger provided by the embedder. Unknown message types are logged and
/// dropped, not treated as a fatal per-client error.
pub struct DefaultMessageHandler {
    on_pm4_capture: Box<dyn FnMut() -> Result<String> + Send>,
}

impl DefaultMessageHandler {
    pub fn new(on_pm4_capture: impl FnMut() -> Result<String> + Send + 'static) -> Self {
        Self {
            on_pm4_capture: Box::new(on_pm4_capture),
        }
    }
}

impl MessageHandler for DefaultMessageHandler {
    fn handle_message(&mut self, msg: Message, conn: &Connection) -> Result<()> {
        match msg {
            Message::HandshakeRequest { major, minor } => {
                send_message(conn, &Message::HandshakeResponse { major, minor })
            }
            Message::Ping => send_message(conn, &Message::Pong),
            Message::FileSizeRequest { path } => handlers::file_size(conn, &path),
            Message::DownloadFileRequest { path } => handlers::download_file(conn, &path),
            Message::Pm4CaptureRequest => {
                let capture_file_path = (self.on_pm4_capture)()?;
                send_message(conn, &Message::Pm4CaptureResponse { capture_file_path })
            }
            other => {
                tracing::warn!(message_type = %other.message_type(), "unknown message type, dropping");
                Ok(())
            }
        }
    }
}
