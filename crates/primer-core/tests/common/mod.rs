//! Shared helpers for integration tests

#![allow(dead_code)]

use primer_core::{RuntimeType, Thrown};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber once; `RUST_LOG` controls the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A class whose initializer counts its runs and sleeps for `delay`
pub fn slow_type(name: &str, delay: Duration) -> (Arc<RuntimeType>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let ty = RuntimeType::builder(name)
        .initializer(move || {
            c.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(delay);
            Ok(())
        })
        .build()
        .unwrap();
    (ty, calls)
}

/// A class whose initializer always fails
pub fn failing_type(name: &str, message: &'static str) -> (Arc<RuntimeType>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let ty = RuntimeType::builder(name)
        .initializer(move || {
            c.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            Err(Thrown::exception(message))
        })
        .build()
        .unwrap();
    (ty, calls)
}
