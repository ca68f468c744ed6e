mod network;
mod peer;
mod transport;

pub use network::{START_MS, TestNetwork};
pub use peer::TestPeer;
pub use transport::LoopbackTransport;

use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Route engine and client logs to the test output, filtered by `RUST_LOG`.
/// Safe to call from every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
