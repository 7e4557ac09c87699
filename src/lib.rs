//! Photobooth controller library.
//!
//! Exposes the booth's components for the `booth` binary and for tests.
//!
//! # Modules
//!
//! - `config`: Configuration file loading and validation
//! - `input`: Buttons, keyboard and touch reduced to one action queue
//! - `camera`: Camera collaborator
//! - `render`: Effects, collage compositing and animation encoding
//! - `pipeline`: Capture plans per mode and post-capture processing
//! - `session`: The session controller state machine
//! - `auth`: OAuth2 credentials and background token refresh
//! - `delivery`: Email and print dispatch with retry and journal
//! - `error`: Error types with user-recoverable hints
#![forbid(unsafe_code)]

pub mod app;
pub mod auth;
pub mod camera;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod input;
pub mod logging;
pub mod pipeline;
pub mod render;
pub mod session;
