//! Hardware button polling.
//!
//! Pins are sampled at a fixed period on a dedicated blocking thread. A press
//! is reported once, when a pin enters its active level and is still active on
//! the following sample. Holding or releasing a button reports nothing.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{BoothConfig, PinNumbering, Pull};
use crate::error::ConfigError;

use super::{Action, ActionSender, ActionSource};

/// Highest Broadcom line exposed on the 40-pin header.
const MAX_BCM_LINE: u8 = 27;

/// Physical header position to Broadcom line for the 40-pin header.
///
/// Returns `None` for power, ground and out-of-range positions.
pub const fn board_to_bcm(pin: u8) -> Option<u32> {
    let line = match pin {
        3 => 2,
        5 => 3,
        7 => 4,
        8 => 14,
        10 => 15,
        11 => 17,
        12 => 18,
        13 => 27,
        15 => 22,
        16 => 23,
        18 => 24,
        19 => 10,
        21 => 9,
        22 => 25,
        23 => 11,
        24 => 8,
        26 => 7,
        27 => 0,
        28 => 1,
        29 => 5,
        31 => 6,
        32 => 12,
        33 => 13,
        35 => 19,
        36 => 16,
        37 => 26,
        38 => 20,
        40 => 21,
        _ => return None,
    };
    Some(line)
}

/// One polled button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinSpec {
    /// Pin number as written in the configuration.
    pub pin: u8,
    /// Broadcom line number used by the backend.
    pub line: u32,
    pub pull: Pull,
    /// Logic level read while the button is pressed.
    pub active_state: u8,
    pub action: Action,
}

impl PinSpec {
    pub const fn is_active(&self, level: u8) -> bool {
        level == self.active_state
    }
}

/// Pin access backend.
pub trait PinReader: Send + 'static {
    /// Configure a pin as an input with its pull resistor.
    ///
    /// Called once per pin at startup. Failures are configuration errors.
    fn setup(&mut self, spec: &PinSpec) -> Result<(), ConfigError>;

    /// Read the raw logic level (0 or 1) of a configured line.
    fn read(&mut self, line: u32) -> std::io::Result<u8>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebounceState {
    Released,
    /// Active on one sample, not yet confirmed.
    Pending,
    /// Press reported; waiting for release.
    Held,
}

/// Press detector for one pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    state: DebounceState,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}

impl Debouncer {
    pub const fn new() -> Self {
        Self {
            state: DebounceState::Released,
        }
    }

    /// Seed from the level read at startup. A button already held at startup
    /// must be released before it can trigger.
    pub const fn with_initial(active: bool) -> Self {
        Self {
            state: if active {
                DebounceState::Held
            } else {
                DebounceState::Released
            },
        }
    }

    /// Feed one sample. Returns true exactly once per confirmed press.
    pub fn update(&mut self, active: bool) -> bool {
        let (next, pressed) = match (self.state, active) {
            (DebounceState::Released, true) => (DebounceState::Pending, false),
            (DebounceState::Pending, true) => (DebounceState::Held, true),
            (DebounceState::Held, true) => (DebounceState::Held, false),
            (_, false) => (DebounceState::Released, false),
        };
        self.state = next;
        pressed
    }

    pub fn is_held(&self) -> bool {
        self.state == DebounceState::Held
    }
}

#[derive(Debug)]
struct PolledPin {
    spec: PinSpec,
    debouncer: Debouncer,
}

/// Fixed-period sampler over all bound pins.
pub struct GpioPoller<R: PinReader> {
    reader: R,
    pins: Vec<PolledPin>,
    period: Duration,
}

impl<R: PinReader> GpioPoller<R> {
    /// Configure every pin referenced by a binding.
    ///
    /// A pin that does not exist in the configured numbering, cannot be set up
    /// or cannot be read fails here rather than at poll time. With GPIO
    /// disabled no pin is touched and the poller has nothing to sample.
    #[instrument(skip_all, fields(numbering = ?config.gpio.numbering))]
    pub fn from_config(config: &BoothConfig, mut reader: R) -> Result<Self, ConfigError> {
        let gpio = &config.gpio;
        let mut pins = Vec::new();
        if !gpio.enabled {
            info!("GPIO disabled, buttons limited to keys and touch");
            return Ok(Self {
                reader,
                pins,
                period: Duration::from_millis(gpio.poll_period_millis),
            });
        }

        for (name, binding) in &config.buttons {
            let Some(pin) = binding.gpio else {
                continue;
            };
            let action = Action::parse(name)?;
            let line = match gpio.numbering {
                PinNumbering::Board => board_to_bcm(pin).ok_or_else(|| ConfigError::PinSetup {
                    pin,
                    reason: "not a GPIO position on the 40-pin header".to_string(),
                })?,
                PinNumbering::Bcm if pin <= MAX_BCM_LINE => u32::from(pin),
                PinNumbering::Bcm => {
                    return Err(ConfigError::PinSetup {
                        pin,
                        reason: format!("BCM line must be 0-{MAX_BCM_LINE}"),
                    });
                }
            };

            let spec = PinSpec {
                pin,
                line,
                pull: binding.pull.unwrap_or(gpio.pull),
                active_state: binding.active_state.unwrap_or(gpio.active_state),
                action,
            };
            reader.setup(&spec)?;
            let level = reader.read(line).map_err(|e| ConfigError::PinSetup {
                pin,
                reason: format!("unreadable: {e}"),
            })?;

            info!(pin, line, action = %spec.action, pull = ?spec.pull, "Button pin configured");
            pins.push(PolledPin {
                debouncer: Debouncer::with_initial(spec.is_active(level)),
                spec,
            });
        }

        Ok(Self {
            reader,
            pins,
            period: Duration::from_millis(gpio.poll_period_millis),
        })
    }

    pub fn pins(&self) -> impl Iterator<Item = &PinSpec> {
        self.pins.iter().map(|p| &p.spec)
    }

    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Sample every pin once and return the confirmed presses.
    pub fn poll_once(&mut self) -> Vec<(u8, Action)> {
        let mut pressed = Vec::new();
        for polled in &mut self.pins {
            match self.reader.read(polled.spec.line) {
                Ok(level) => {
                    if polled.debouncer.update(polled.spec.is_active(level)) {
                        trace!(pin = polled.spec.pin, "Button press confirmed");
                        pressed.push((polled.spec.pin, polled.spec.action.clone()));
                    }
                }
                Err(e) => warn!(pin = polled.spec.pin, error = %e, "Pin read failed"),
            }
        }
        pressed
    }

    /// Poll until the action queue closes.
    pub fn spawn(mut self, sender: ActionSender) -> JoinHandle<()> {
        tokio::task::spawn_blocking(move || {
            if self.pins.is_empty() {
                debug!("No GPIO buttons bound");
                return;
            }
            debug!(pins = self.pins.len(), period_ms = self.period.as_millis(), "GPIO poller started");
            loop {
                for (pin, action) in self.poll_once() {
                    if !sender.send(action, ActionSource::Gpio { pin }) {
                        return;
                    }
                }
                if sender.is_closed() {
                    debug!("GPIO poller stopped");
                    return;
                }
                std::thread::sleep(self.period);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModeKind;
    use crate::input::mock::MockPins;

    #[test]
    fn test_board_translation() {
        assert_eq!(board_to_bcm(10), Some(15));
        assert_eq!(board_to_bcm(8), Some(14));
        assert_eq!(board_to_bcm(12), Some(18));
        assert_eq!(board_to_bcm(1), None);
        assert_eq!(board_to_bcm(6), None);
        assert_eq!(board_to_bcm(41), None);
    }

    #[test]
    fn test_debounce_requires_two_samples() {
        let mut d = Debouncer::new();
        assert!(!d.update(true));
        assert!(d.update(true));
        // Sustained hold reports nothing more.
        assert!(!d.update(true));
        assert!(!d.update(true));
        // Release reports nothing.
        assert!(!d.update(false));
        assert!(!d.update(true));
        assert!(d.update(true));
    }

    #[test]
    fn test_debounce_ignores_glitch() {
        let mut d = Debouncer::new();
        assert!(!d.update(true));
        assert!(!d.update(false));
        assert!(!d.update(true));
        assert!(!d.update(false));
    }

    #[test]
    fn test_held_at_startup_must_release() {
        let mut d = Debouncer::with_initial(true);
        assert!(d.is_held());
        assert!(!d.update(true));
        assert!(!d.update(false));
        assert!(!d.update(true));
        assert!(d.update(true));
    }

    #[test]
    fn test_poller_reports_press_once() {
        let config = BoothConfig::default();
        let pins = MockPins::new();
        let mut poller = GpioPoller::from_config(&config, pins.clone()).unwrap();
        assert_eq!(poller.pins().count(), 3);

        // Board pin 8 is BCM 14, bound to snap_Four.
        pins.set_level(14, 1);
        assert!(poller.poll_once().is_empty());
        assert_eq!(poller.poll_once(), vec![(8, Action::Snap(ModeKind::Collage))]);
        assert!(poller.poll_once().is_empty());

        pins.set_level(14, 0);
        assert!(poller.poll_once().is_empty());
    }

    #[test]
    fn test_active_low_pin() {
        let mut config = BoothConfig::default();
        config.gpio.active_state = 0;
        config.gpio.pull = Pull::Up;
        let pins = MockPins::with_default_level(1);
        let mut poller = GpioPoller::from_config(&config, pins.clone()).unwrap();

        assert!(poller.pins().all(|p| p.pull == Pull::Up));
        pins.set_level(15, 0);
        poller.poll_once();
        assert_eq!(poller.poll_once(), vec![(10, Action::Snap(ModeKind::Single))]);
    }

    #[test]
    fn test_invalid_board_pin_fails_at_startup() {
        let mut config = BoothConfig::default();
        config.buttons.get_mut("snap_None").unwrap().gpio = Some(2);

        let err = GpioPoller::from_config(&config, MockPins::new()).err().unwrap();
        assert!(matches!(err, ConfigError::PinSetup { pin: 2, .. }));
    }

    #[test]
    fn test_bcm_numbering() {
        let mut config = BoothConfig::default();
        config.gpio.numbering = PinNumbering::Bcm;
        let poller = GpioPoller::from_config(&config, MockPins::new()).unwrap();
        let mut lines: Vec<u32> = poller.pins().map(|p| p.line).collect();
        lines.sort_unstable();
        assert_eq!(lines, vec![8, 10, 12]);

        config.buttons.get_mut("snap_None").unwrap().gpio = Some(30);
        assert!(GpioPoller::from_config(&config, MockPins::new()).is_err());
    }

    #[test]
    fn test_unreadable_pin_fails_at_startup() {
        let pins = MockPins::new();
        pins.fail_reads(18);
        let err = GpioPoller::from_config(&BoothConfig::default(), pins)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::PinSetup { pin: 12, .. }));
    }

    #[test]
    fn test_disabled_gpio_touches_no_pin() {
        let mut config = BoothConfig::default();
        config.gpio.enabled = false;
        let pins = MockPins::new();
        pins.fail_reads(15);
        pins.fail_setup(14);

        let mut poller = GpioPoller::from_config(&config, pins.clone()).unwrap();
        assert_eq!(poller.pins().count(), 0);
        assert!(pins.setup_calls().is_empty());
        assert!(poller.poll_once().is_empty());
        assert_eq!(pins.read_count(), 0);
    }

    #[test]
    fn test_setup_records_pull() {
        let pins = MockPins::new();
        GpioPoller::from_config(&BoothConfig::default(), pins.clone()).unwrap();
        let mut setup = pins.setup_calls();
        setup.sort_by_key(|s| s.line);
        assert_eq!(setup.len(), 3);
        assert!(setup.iter().all(|s| s.pull == Pull::Down && s.active_state == 1));
    }

    #[tokio::test]
    async fn test_spawned_poller_feeds_queue() {
        let mut config = BoothConfig::default();
        config.gpio.poll_period_millis = 5;
        let pins = MockPins::new();
        let poller = GpioPoller::from_config(&config, pins.clone()).unwrap();
        let (sender, mut rx) = crate::input::action_queue();
        let handle = poller.spawn(sender);

        pins.set_level(18, 1);
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.action, Action::Snap(ModeKind::Animation));
        assert_eq!(event.source, ActionSource::Gpio { pin: 12 });

        drop(rx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
