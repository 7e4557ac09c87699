//! Common test utilities for the booth.
//!
//! - `fixtures`: fast configurations and scratch directories
//! - `harness`: a running controller wired to mock collaborators
#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

use tracing_subscriber::EnvFilter;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
