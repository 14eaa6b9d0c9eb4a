//! Connection (C2): blocking stream endpoints — abstract-namespace Unix
//! domain sockets and TCP on POSIX, TCP-only on other platforms — plus the
//! in-memory backend used throughout the workspace's own test suites.

mod connection;
mod init;
mod mem;
#[cfg(unix)]
mod uds;

pub use connection::{
    Connection, ProgressCallback, ACCEPT_TIMEOUT_MS, MEM_FALLBACK_TIMEOUT_MS, NO_TIMEOUT,
};
pub use init::network_init;
