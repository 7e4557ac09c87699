//! Mock pin backend for testing without GPIO hardware.
//!
//! Clones share state, so a test keeps one handle to drive pin levels while
//! the poller owns another.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::ConfigError;

use super::gpio::{PinReader, PinSpec};

#[derive(Debug, Default)]
struct PinsState {
    levels: HashMap<u32, u8>,
    default_level: u8,
    setup: Vec<PinSpec>,
    failing_setup: HashSet<u32>,
    failing_reads: HashSet<u32>,
    reads: usize,
}

/// Scriptable [`PinReader`].
#[derive(Debug, Clone, Default)]
pub struct MockPins {
    state: Arc<Mutex<PinsState>>,
}

impl MockPins {
    /// All lines read 0 until set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines read `level` until set; useful for pull-up wiring.
    #[must_use]
    pub fn with_default_level(level: u8) -> Self {
        let pins = Self::default();
        pins.state.lock().unwrap().default_level = level;
        pins
    }

    pub fn set_level(&self, line: u32, level: u8) {
        trace!(line, level, "Mock pin level");
        self.state.lock().unwrap().levels.insert(line, level);
    }

    /// Make `setup` fail for a line.
    pub fn fail_setup(&self, line: u32) {
        self.state.lock().unwrap().failing_setup.insert(line);
    }

    /// Make every read of a line fail.
    pub fn fail_reads(&self, line: u32) {
        self.state.lock().unwrap().failing_reads.insert(line);
    }

    /// Pins configured so far, in setup order.
    #[must_use]
    pub fn setup_calls(&self) -> Vec<PinSpec> {
        self.state.lock().unwrap().setup.clone()
    }

    #[must_use]
    pub fn read_count(&self) -> usize {
        self.state.lock().unwrap().reads
    }
}

impl PinReader for MockPins {
    fn setup(&mut self, spec: &PinSpec) -> Result<(), ConfigError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_setup.contains(&spec.line) {
            return Err(ConfigError::PinSetup {
                pin: spec.pin,
                reason: "mock setup failure".to_string(),
            });
        }
        state.setup.push(spec.clone());
        Ok(())
    }

    fn read(&mut self, line: u32) -> std::io::Result<u8> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        if state.failing_reads.contains(&line) {
            return Err(std::io::Error::other(format!("mock line {line} unreadable")));
        }
        Ok(state.levels.get(&line).copied().unwrap_or(state.default_level))
    }
}
