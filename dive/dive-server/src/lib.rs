//! Server (C4): a single-client server bound to an abstract-namespace Unix
//! domain socket, with a default handler for handshake, ping, file-size,
//! download, and PM4 capture requests, and an extension point for custom
//! handlers.

mod framing;
pub mod handlers;
mod handler;
mod server;

pub use framing::{receive_message, send_message};
pub use handler::{DefaultMessageHandler, MessageHandler};
pub use server::Server;
