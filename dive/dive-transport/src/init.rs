//! One process-wide network initializer, idempotent, mirroring the
//! original's Windows `WSAStartup` singleton. Rust's standard library
//! performs any platform-specific socket-subsystem setup internally on
//! first use, so this is a documented no-op kept for parity with callers
//! that expect an explicit initialization step before the first socket call.

use std::sync::Once;

static INIT: Once = Once::new();

/// Idempotent; safe to call from any thread, any number of times.
pub fn network_init() {
    INIT.call_once(|| {
        tracing::debug!("network subsystem initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_idempotent() {
        network_init();
        network_init();
        network_init();
    }
}
