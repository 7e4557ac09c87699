//! Linux sysfs GPIO backend.
//!
//! sysfs exports lines and sets direction but has no notion of bias, so pull
//! resistors are applied with the platform `pinctrl` tool when configured.
//!
//! sysfs numbers lines globally: BCM line `n` is kernel line `base + n`,
//! where `base` belongs to the gpiochip driving the 40-pin header (0 on
//! older kernels, 512 on recent Raspberry Pi kernels).

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, instrument, trace, warn};

use crate::config::{GpioSettings, Pull};
use crate::error::ConfigError;

use super::gpio::{PinReader, PinSpec};

/// udev may need a moment to create the line directory after export.
const EXPORT_SETTLE: Duration = Duration::from_millis(100);
const EXPORT_RETRIES: u32 = 5;

/// gpiochip labels of the controllers wired to the 40-pin header.
const HEADER_CHIP_LABELS: [&str; 4] = [
    "pinctrl-bcm2835",
    "pinctrl-bcm2711",
    "pinctrl-rp1",
    "pinctrl-bcm2712",
];

/// Pin access through `/sys/class/gpio`.
#[derive(Debug, Clone)]
pub struct SysfsPins {
    root: PathBuf,
    base: u32,
    bias_command: Option<String>,
}

impl SysfsPins {
    /// Backend rooted at `root`, with the line base read from its gpiochips.
    pub fn new(root: impl Into<PathBuf>, bias_command: Option<String>) -> Self {
        let root = root.into();
        let base = detect_line_base(&root).unwrap_or(0);
        Self {
            root,
            base,
            bias_command,
        }
    }

    pub fn from_settings(settings: &GpioSettings) -> Self {
        let pins = Self::new(settings.sysfs_root.clone(), settings.bias_command.clone());
        match settings.line_base {
            Some(base) => pins.with_line_base(base),
            None => pins,
        }
    }

    #[must_use]
    pub const fn with_line_base(mut self, base: u32) -> Self {
        self.base = base;
        self
    }

    pub const fn line_base(&self) -> u32 {
        self.base
    }

    /// Kernel line number of a BCM line.
    const fn kernel_line(&self, line: u32) -> u32 {
        self.base + line
    }

    fn line_dir(&self, line: u32) -> PathBuf {
        self.root.join(format!("gpio{}", self.kernel_line(line)))
    }

    fn export(&self, spec: &PinSpec) -> Result<PathBuf, ConfigError> {
        let dir = self.line_dir(spec.line);
        if dir.is_dir() {
            return Ok(dir);
        }

        let kernel_line = self.kernel_line(spec.line);
        debug!(line = spec.line, kernel_line, "Exporting GPIO line");
        write_attr(&self.root.join("export"), &kernel_line.to_string(), spec.pin)?;
        for _ in 0..EXPORT_RETRIES {
            if dir.is_dir() {
                return Ok(dir);
            }
            std::thread::sleep(EXPORT_SETTLE);
        }
        Err(ConfigError::PinSetup {
            pin: spec.pin,
            reason: format!("{} did not appear after export", dir.display()),
        })
    }

    fn apply_bias(&self, spec: &PinSpec) -> Result<(), ConfigError> {
        let Some(command) = self.bias_command.as_deref() else {
            return Ok(());
        };
        let bias = match spec.pull {
            Pull::Up => "pu",
            Pull::Down => "pd",
            Pull::Off => "pn",
        };
        let line = spec.line.to_string();
        let args = ["set", line.as_str(), "ip", bias];

        match Command::new(command).args(args).output() {
            Ok(output) if output.status.success() => {
                debug!(line = spec.line, bias, "Pull resistor set");
                Ok(())
            }
            Ok(output) => Err(ConfigError::PinSetup {
                pin: spec.pin,
                reason: format!(
                    "{command} failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }),
            // Missing tool: pulls may be wired externally.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(command, line = spec.line, "Bias tool not found, pull resistor left as is");
                Ok(())
            }
            Err(e) => Err(ConfigError::PinSetup {
                pin: spec.pin,
                reason: format!("{command}: {e}"),
            }),
        }
    }
}

impl PinReader for SysfsPins {
    #[instrument(skip(self), fields(pin = spec.pin, line = spec.line))]
    fn setup(&mut self, spec: &PinSpec) -> Result<(), ConfigError> {
        let dir = self.export(spec)?;
        write_attr(&dir.join("direction"), "in", spec.pin)?;
        self.apply_bias(spec)
    }

    fn read(&mut self, line: u32) -> std::io::Result<u8> {
        let raw = fs::read_to_string(self.line_dir(line).join("value"))?;
        match raw.trim() {
            "0" => Ok(0),
            "1" => Ok(1),
            other => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unexpected pin value '{other}'"),
            )),
        }
    }
}

/// Base of the first gpiochip whose label names a header controller.
fn detect_line_base(root: &Path) -> Option<u32> {
    let mut chips: Vec<PathBuf> = fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("gpiochip"))
        })
        .collect();
    chips.sort();

    for chip in chips {
        let Ok(label) = fs::read_to_string(chip.join("label")) else {
            continue;
        };
        let label = label.trim();
        if !HEADER_CHIP_LABELS.contains(&label) {
            trace!(chip = %chip.display(), label, "Skipping gpiochip");
            continue;
        }
        match fs::read_to_string(chip.join("base")).map(|b| b.trim().parse::<u32>()) {
            Ok(Ok(base)) => {
                debug!(chip = %chip.display(), label, base, "Header gpiochip found");
                return Some(base);
            }
            _ => warn!(chip = %chip.display(), "Unreadable gpiochip base"),
        }
    }
    None
}

fn write_attr(path: &Path, value: &str, pin: u8) -> Result<(), ConfigError> {
    fs::write(path, value).map_err(|e| ConfigError::PinSetup {
        pin,
        reason: format!("{}: {e}", path.display()),
    })
}
