//! Shared test utilities for integration and convergence tests.
//!
//! Provides an in-process mock change-propagation server: it assigns
//! sequence numbers, keeps the full change log, replays it as a snapshot
//! to every new connection, and rebroadcasts live changes to all
//! connected clients (including the sender).

#![allow(dead_code)]

pub mod server;

pub use server::*;

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a test-writer tracing subscriber once per process.
/// Honors `RUST_LOG`; silent by default.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
