//! Semantic validation of a parsed configuration.
//!
//! Every failure here is fatal at startup: the booth refuses to run with an
//! ambiguous button table or a mode that names an effect nobody defined.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::schema::{BoothConfig, FrameSize};
use crate::error::ConfigError;
use crate::input::Action;

impl BoothConfig {
    /// Validate the configuration.
    ///
    /// Checks that:
    /// - every binding names a known action and no two bindings share a GPIO pin or key
    /// - modes and the palette only reference defined effects
    /// - sizes, frame counts and periods are positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        trace!(name = ?self.name, "Validating booth config");
        self.validate_bindings()?;
        self.validate_effects()?;
        self.validate_modes()?;
        self.validate_timings()?;
        debug!(
            effects = self.effects.len(),
            bindings = self.buttons.len(),
            "Configuration validated"
        );
        Ok(())
    }

    fn validate_bindings(&self) -> Result<(), ConfigError> {
        let mut pins: HashMap<u8, &str> = HashMap::new();
        let mut keys: HashMap<&str, &str> = HashMap::new();

        for (name, binding) in &self.buttons {
            let action = Action::parse(name)?;
            if let Action::SelectEffect(effect) = &action {
                self.require_effect(effect, &format!("binding '{name}'"))?;
            }

            if let Some(pin) = binding.gpio {
                if let Some(first) = pins.insert(pin, name) {
                    return Err(ConfigError::DuplicatePin {
                        pin,
                        first: first.to_string(),
                        second: name.clone(),
                    });
                }
            }
            if let Some(level) = binding.active_state {
                check_level(&format!("buttons.{name}.active_state"), level)?;
            }

            for key in &binding.keys {
                if key.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: format!("buttons.{name}.keys"),
                        reason: "empty key code".to_string(),
                    });
                }
                match keys.insert(key.as_str(), name) {
                    Some(first) if first != name.as_str() => {
                        return Err(ConfigError::DuplicateKey {
                            key: key.clone(),
                            first: first.to_string(),
                            second: name.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }

        check_level("gpio.active_state", self.gpio.active_state)?;
        trace!(pins = pins.len(), keys = keys.len(), "Bindings validated");
        Ok(())
    }

    fn validate_effects(&self) -> Result<(), ConfigError> {
        for (key, effect) in &self.effects {
            if effect.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("effects.{key}.name"),
                    reason: "effect name must not be empty".to_string(),
                });
            }
        }
        for key in &self.effect_palette {
            self.require_effect(key, "effect_palette")?;
        }
        Ok(())
    }

    fn validate_modes(&self) -> Result<(), ConfigError> {
        let modes = &self.modes;
        check_size("modes.None.snap_size", modes.single.snap_size)?;
        check_size("modes.Four.snap_size", modes.collage.snap_size)?;
        check_size("modes.Animation.snap_size", modes.animation.snap_size)?;

        if modes.single.logo.is_some() && modes.single.logo_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "modes.None.logo_size".to_string(),
                reason: "must be positive when a logo is set".to_string(),
            });
        }
        if modes.animation.frame_number == 0 {
            return Err(ConfigError::InvalidValue {
                field: "modes.Animation.frame_number".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        check_period("modes.Animation.snap_period_millis", modes.animation.snap_period_millis)?;
        check_period("modes.Animation.gif_period_millis", modes.animation.gif_period_millis)?;

        for (mode, effect) in [
            ("None", &modes.single.effect),
            ("Four", &modes.collage.effect),
            ("Animation", &modes.animation.effect),
        ] {
            if let Some(effect) = effect {
                self.require_effect(effect, &format!("mode '{mode}'"))?;
            }
        }
        Ok(())
    }

    fn validate_timings(&self) -> Result<(), ConfigError> {
        check_period("gpio.poll_period_millis", self.gpio.poll_period_millis)?;
        check_period("oauth.refresh_period_millis", self.oauth.refresh_period_millis)?;
        check_period("email.attempt_timeout_millis", self.email.attempt_timeout_millis)?;

        if self.email.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "email.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.email.backoff_factor.is_finite() && self.email.backoff_factor >= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "email.backoff_factor".to_string(),
                reason: "must be a finite number, 1.0 or greater".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.countdown.max_height_ratio) {
            return Err(ConfigError::InvalidValue {
                field: "countdown.max_height_ratio".to_string(),
                reason: "must be within 0.0-1.0".to_string(),
            });
        }
        Ok(())
    }

    fn require_effect(&self, key: &str, referrer: &str) -> Result<(), ConfigError> {
        if self.effects.contains_key(key) {
            Ok(())
        } else {
            Err(ConfigError::UnknownEffect {
                effect: key.to_string(),
                referrer: referrer.to_string(),
            })
        }
    }
}

fn check_size(field: &str, size: FrameSize) -> Result<(), ConfigError> {
    if size.width == 0 || size.height == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("{size} has a zero dimension"),
        });
    }
    Ok(())
}

fn check_period(field: &str, millis: u64) -> Result<(), ConfigError> {
    if millis == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    Ok(())
}

fn check_level(field: &str, level: u8) -> Result<(), ConfigError> {
    if level > 1 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("logic level {level} is not 0 or 1"),
        });
    }
    Ok(())
}
