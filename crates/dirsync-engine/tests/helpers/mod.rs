//! Shared helpers for dirsync-engine tests.

#![allow(dead_code)]

pub mod memory_store;

use std::sync::Once;

static INIT: Once = Once::new();

/// Route engine logs to the test writer once per binary.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
