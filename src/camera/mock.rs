//! Mock camera for testing without hardware.
//!
//! Records every capture request with the instant it started and returns
//! solid-colour frames whose colour encodes the call index, so tests can tell
//! frames apart after compositing.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use image::Rgb;
use tracing::trace;

use crate::config::FrameSize;
use crate::error::CaptureError;

use super::{Camera, Frame};

/// A recorded capture request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCall {
    /// 1-based call number.
    pub number: usize,
    pub size: FrameSize,
    pub started: Instant,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<CaptureCall>,
    fail_on: Option<(usize, CaptureError)>,
}

/// Recording [`Camera`] with failure injection.
#[derive(Debug, Default)]
pub struct MockCamera {
    state: Mutex<MockState>,
    delay: Duration,
}

impl MockCamera {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block every capture for `delay`, like a real sensor readout.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the `number`-th capture (1-based) with `error`.
    #[must_use]
    pub fn failing_on(self, number: usize, error: CaptureError) -> Self {
        self.state.lock().unwrap().fail_on = Some((number, error));
        self
    }

    /// Colour of the frame returned by the `number`-th call.
    #[must_use]
    pub fn color_of(number: usize) -> Rgb<u8> {
        let n = (number % 256) as u8;
        Rgb([n, n.wrapping_mul(3), 255 - n])
    }

    #[must_use]
    pub fn calls(&self) -> Vec<CaptureCall> {
        self.state.lock().unwrap().calls.clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Gaps between consecutive capture starts.
    #[must_use]
    pub fn intervals(&self) -> Vec<Duration> {
        self.calls()
            .windows(2)
            .map(|w| w[1].started.duration_since(w[0].started))
            .collect()
    }
}

impl Camera for MockCamera {
    fn capture(&self, size: FrameSize) -> Result<Frame, CaptureError> {
        let number = {
            let mut state = self.state.lock().unwrap();
            let number = state.calls.len() + 1;
            state.calls.push(CaptureCall {
                number,
                size,
                started: Instant::now(),
            });
            if let Some((fail_at, error)) = &state.fail_on {
                if *fail_at == number {
                    trace!(number, "Injected capture failure");
                    return Err(error.clone());
                }
            }
            number
        };

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        trace!(number, %size, "Mock capture");
        Ok(Frame::from_pixel(size.width, size.height, Self::color_of(number)))
    }
}
