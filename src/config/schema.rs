//! Configuration schema for the photobooth.
//!
//! These types are deserialized once at startup and then shared read-only as
//! `Arc<BoothConfig>`. Defaults reproduce the stock booth: a Raspberry Pi v2
//! camera, three snap buttons and the twelve-effect palette.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Frame dimensions in pixels, serialized as `[width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count.
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl From<(u32, u32)> for FrameSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl From<FrameSize> for (u32, u32) {
    fn from(size: FrameSize) -> Self {
        (size.width, size.height)
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// Sensor modes; integer divisions of the native resolution keep binning cheap.
pub const V2_FULL_SIZE: FrameSize = FrameSize::new(3280, 2464);
pub const V2_HALF_SIZE: FrameSize = FrameSize::new(1640, 1232);
pub const V2_QUARTER_SIZE: FrameSize = FrameSize::new(820, 616);
pub const V1_FULL_SIZE: FrameSize = FrameSize::new(2592, 1944);
pub const V1_HALF_SIZE: FrameSize = FrameSize::new(1296, 972);
pub const V1_QUARTER_SIZE: FrameSize = FrameSize::new(648, 486);

/// Shot pattern selected by a snap button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeKind {
    /// Single full-size shot.
    #[serde(rename = "None")]
    Single,
    /// 2x2 collage of four half-size shots.
    #[serde(rename = "Four")]
    Collage,
    /// Timed frame sequence encoded as a looping image.
    Animation,
}

impl ModeKind {
    pub const ALL: [Self; 3] = [Self::Single, Self::Collage, Self::Animation];

    /// Name used in configuration files and action names.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "None",
            Self::Collage => "Four",
            Self::Animation => "Animation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl std::fmt::Display for ModeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `None` mode: one shot, optional logo stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleMode {
    pub snap_size: FrameSize,
    /// Logo stamped in the bottom-right corner, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<PathBuf>,
    /// Logo height in pixels after thumbnailing.
    pub logo_size: u32,
    /// Bottom and right padding of the logo in pixels.
    pub logo_padding: u32,
    /// Effect applied when none is selected on screen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

impl Default for SingleMode {
    fn default() -> Self {
        Self {
            snap_size: V2_FULL_SIZE,
            logo: None,
            logo_size: 128,
            logo_padding: 32,
            effect: None,
        }
    }
}

/// `Four` mode: four shots composited under a foreground overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollageMode {
    /// Size of each of the four shots.
    pub snap_size: FrameSize,
    /// Overlay drawn on top of the assembled collage.
    pub foreground_image: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

impl Default for CollageMode {
    fn default() -> Self {
        Self {
            snap_size: V2_HALF_SIZE,
            foreground_image: PathBuf::from("resources/collage_four_square.png"),
            effect: None,
        }
    }
}

/// `Animation` mode: frames captured on a fixed timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationMode {
    pub snap_size: FrameSize,
    pub frame_number: u32,
    /// Delay between two captures.
    pub snap_period_millis: u64,
    /// Delay between two frames when the animation is played back.
    pub gif_period_millis: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

impl Default for AnimationMode {
    fn default() -> Self {
        Self {
            snap_size: FrameSize::new(500, 500),
            frame_number: 10,
            snap_period_millis: 200,
            gif_period_millis: 50,
            effect: None,
        }
    }
}

/// The three configured shot patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeTable {
    #[serde(rename = "None")]
    pub single: SingleMode,
    #[serde(rename = "Four")]
    pub collage: CollageMode,
    #[serde(rename = "Animation")]
    pub animation: AnimationMode,
}

impl ModeTable {
    /// Resolve a mode definition by kind.
    pub fn get(&self, kind: ModeKind) -> CaptureMode {
        match kind {
            ModeKind::Single => CaptureMode::Single(self.single.clone()),
            ModeKind::Collage => CaptureMode::Collage(self.collage.clone()),
            ModeKind::Animation => CaptureMode::Animation(self.animation.clone()),
        }
    }
}

/// A fully specified capture mode.
///
/// Frame count and frame size are fixed by the variant's definition; a
/// different shot pattern means a different value, never an in-place edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureMode {
    Single(SingleMode),
    Collage(CollageMode),
    Animation(AnimationMode),
}

/// Number of cells in the collage grid.
pub const COLLAGE_FRAMES: usize = 4;

impl CaptureMode {
    pub const fn kind(&self) -> ModeKind {
        match self {
            Self::Single(_) => ModeKind::Single,
            Self::Collage(_) => ModeKind::Collage,
            Self::Animation(_) => ModeKind::Animation,
        }
    }

    /// Number of raw frames a complete session of this mode holds.
    pub const fn frame_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Collage(_) => COLLAGE_FRAMES,
            Self::Animation(mode) => mode.frame_number as usize,
        }
    }

    /// Size requested from the camera for every frame.
    pub const fn snap_size(&self) -> FrameSize {
        match self {
            Self::Single(mode) => mode.snap_size,
            Self::Collage(mode) => mode.snap_size,
            Self::Animation(mode) => mode.snap_size,
        }
    }

    /// Effect used when nothing is selected on screen.
    pub fn default_effect(&self) -> Option<&str> {
        match self {
            Self::Single(mode) => mode.effect.as_deref(),
            Self::Collage(mode) => mode.effect.as_deref(),
            Self::Animation(mode) => mode.effect.as_deref(),
        }
    }
}

/// Backend-specific effect parameter.
///
/// Serialized as absent, a single integer, or a two-element array so that a
/// configuration file round-trips byte-for-byte in meaning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<RawParam>", into = "Option<RawParam>")]
pub enum EffectParam {
    #[default]
    NoParam,
    IntParam(i64),
    PairParam(i64, i64),
}

impl EffectParam {
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::NoParam)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum RawParam {
    Int(i64),
    Pair((i64, i64)),
}

impl From<Option<RawParam>> for EffectParam {
    fn from(raw: Option<RawParam>) -> Self {
        match raw {
            None => Self::NoParam,
            Some(RawParam::Int(value)) => Self::IntParam(value),
            Some(RawParam::Pair((a, b))) => Self::PairParam(a, b),
        }
    }
}

impl From<EffectParam> for Option<RawParam> {
    fn from(param: EffectParam) -> Self {
        match param {
            EffectParam::NoParam => None,
            EffectParam::IntParam(value) => Some(RawParam::Int(value)),
            EffectParam::PairParam(a, b) => Some(RawParam::Pair((a, b))),
        }
    }
}

/// A named visual filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEffect {
    /// Backend effect name; several keys may share one name with different params.
    pub name: String,
    /// Preview icon shown in the effect palette.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "EffectParam::is_none")]
    pub params: EffectParam,
}

impl ImageEffect {
    pub fn new(name: &str, icon: &str, params: EffectParam) -> Self {
        Self {
            name: name.to_string(),
            icon: Some(PathBuf::from(EFFECTS_THUMB_DIR).join(icon)),
            params,
        }
    }

    /// True for the pass-through effect.
    pub fn is_identity(&self) -> bool {
        self.name == "none"
    }
}

const EFFECTS_THUMB_DIR: &str = "resources/effects";

/// Effect table keyed by stable effect key.
pub fn default_effects() -> BTreeMap<String, ImageEffect> {
    use EffectParam::{IntParam, NoParam, PairParam};

    [
        ("none", ImageEffect::new("none", "eff_none.png", NoParam)),
        ("solarize", ImageEffect::new("solarize", "eff_solarize.png", NoParam)),
        ("oilpaint", ImageEffect::new("oilpaint", "eff_oilpaint.png", NoParam)),
        ("cartoon", ImageEffect::new("cartoon", "eff_cartoon.png", NoParam)),
        // colorswap 0 turns faces green, 1 turns them purple
        ("colorswap0", ImageEffect::new("colorswap", "eff_colorswap.png", IntParam(0))),
        ("colorswap1", ImageEffect::new("colorswap", "eff_colorswap1.png", IntParam(1))),
        ("negative", ImageEffect::new("negative", "eff_negative.png", NoParam)),
        ("pastel", ImageEffect::new("pastel", "eff_pastel.png", NoParam)),
        ("posterise", ImageEffect::new("posterise", "eff_posterise.png", IntParam(8))),
        ("gpen", ImageEffect::new("gpen", "eff_gpen.png", NoParam)),
        ("sketch", ImageEffect::new("sketch", "eff_sketch.png", NoParam)),
        (
            "watercolor1",
            ImageEffect::new("watercolor", "eff_watercolor_170_25.png", PairParam(170, 25)),
        ),
        ("colorpoint1", ImageEffect::new("colorpoint", "eff_colorpoint1.png", IntParam(1))),
    ]
    .into_iter()
    .map(|(key, effect)| (key.to_string(), effect))
    .collect()
}

/// Order of effects in the on-screen palette.
pub fn default_effect_palette() -> Vec<String> {
    [
        "none",
        "colorswap1",
        "colorswap0",
        "negative",
        "oilpaint",
        "pastel",
        "gpen",
        "sketch",
        "cartoon",
        "posterise",
        "watercolor1",
        "colorpoint1",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Pull resistor configuration of a button pin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pull {
    Up,
    #[default]
    Down,
    Off,
}

/// How pin numbers in the configuration are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinNumbering {
    /// Physical header position (1-40).
    #[default]
    Board,
    /// Broadcom GPIO line number.
    Bcm,
}

/// Physical and on-screen triggers for one logical action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonBinding {
    /// Key codes (`s`, `<F1>`, `<Escape>`) that trigger the action.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpio: Option<u8>,
    /// Overrides the global pull setting for this pin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull: Option<Pull>,
    /// Overrides the global active level (0 or 1) for this pin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_state: Option<u8>,
    /// Icon of the on-screen button.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<PathBuf>,
}

impl ButtonBinding {
    fn new(keys: &[&str], gpio: Option<u8>, icon: Option<&str>) -> Self {
        Self {
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
            gpio,
            icon: icon.map(PathBuf::from),
            ..Self::default()
        }
    }
}

/// Default action bindings keyed by action name.
pub fn default_buttons() -> BTreeMap<String, ButtonBinding> {
    [
        (
            "snap_None",
            ButtonBinding::new(&["s", "S", "<F1>"], Some(10), Some("resources/ic_photo.png")),
        ),
        (
            "snap_Four",
            ButtonBinding::new(&["f", "F", "<F2>"], Some(8), Some("resources/ic_portrait.png")),
        ),
        (
            "snap_Animation",
            ButtonBinding::new(&["a", "A", "<F3>"], Some(12), Some("resources/ic_anim.png")),
        ),
        (
            "send_email",
            ButtonBinding::new(&["e", "@"], None, Some("resources/ic_email.png")),
        ),
        (
            "print",
            ButtonBinding::new(&["p"], None, Some("resources/ic_print.png")),
        ),
        ("configure", ButtonBinding::new(&["<Escape>"], None, None)),
        ("dismiss", ButtonBinding::new(&["<Return>"], None, None)),
    ]
    .into_iter()
    .map(|(action, binding)| (action.to_string(), binding))
    .collect()
}

/// Hardware button polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioSettings {
    pub enabled: bool,
    pub numbering: PinNumbering,
    pub pull: Pull,
    /// Logic level (0 or 1) read while a button is pressed.
    pub active_state: u8,
    pub poll_period_millis: u64,
    pub sysfs_root: PathBuf,
    /// Kernel number of BCM line 0. Detected from the header's gpiochip
    /// when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_base: Option<u32>,
    /// Tool used to set pull resistors, since sysfs cannot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bias_command: Option<String>,
}

impl Default for GpioSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            numbering: PinNumbering::Board,
            pull: Pull::Down,
            active_state: 1,
            poll_period_millis: 100,
            sysfs_root: PathBuf::from("/sys/class/gpio"),
            line_base: None,
            bias_command: Some("pinctrl".to_string()),
        }
    }
}

/// Whether the countdown runs before the first Animation frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationCountdown {
    #[default]
    FirstFrame,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownSettings {
    /// Overlays in display order.
    pub overlays: Vec<PathBuf>,
    /// How long each overlay is held.
    pub step_millis: u64,
    /// Height of the overlays relative to the preview, 0.0-1.0.
    pub max_height_ratio: f32,
    pub animation: AnimationCountdown,
}

impl Default for CountdownSettings {
    fn default() -> Self {
        Self {
            overlays: [5, 4, 3, 2, 1]
                .iter()
                .map(|n| PathBuf::from(format!("resources/count_down_{n}.png")))
                .chain(std::iter::once(PathBuf::from(
                    "resources/count_down_ready.png",
                )))
                .collect(),
            step_millis: 1000,
            max_height_ratio: 0.2,
            animation: AnimationCountdown::FirstFrame,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSettings {
    /// The artifact stays on screen this long before returning to idle.
    pub timeout_secs: u64,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// External still-capture program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_millis: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            command: "rpicam-still".to_string(),
            args: vec!["--nopreview".to_string(), "--immediate".to_string()],
            timeout_millis: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effects: Option<PathBuf>,
}

impl Default for IconSettings {
    fn default() -> Self {
        Self {
            effects: Some(PathBuf::from("resources/ic_effects.png")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_recipient: Option<String>,
    pub subject: String,
    pub body: String,
    pub api_url: String,
    pub max_attempts: u32,
    pub initial_backoff_millis: u64,
    pub backoff_factor: f32,
    pub max_backoff_millis: u64,
    pub attempt_timeout_millis: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sender: None,
            default_recipient: None,
            subject: "Your photobooth picture".to_string(),
            body: "Here is your picture from the photobooth!".to_string(),
            api_url: "https://gmail.googleapis.com/gmail/v1/users/me/messages/send".to_string(),
            max_attempts: 3,
            initial_backoff_millis: 1000,
            backoff_factor: 2.0,
            max_backoff_millis: 10_000,
            attempt_timeout_millis: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub refresh_period_millis: u64,
    /// Application secret downloaded from the Google developer console.
    pub client_secret_file: PathBuf,
    /// Generated store holding the refresh and access tokens.
    pub credentials_file: PathBuf,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            refresh_period_millis: 1_800_000,
            client_secret_file: PathBuf::from("google_client_id.json"),
            credentials_file: PathBuf::from("google_credentials.dat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintSettings {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            command: "lp".to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Finished artifacts are archived here.
    pub photos_dir: PathBuf,
    /// SQLite journal of delivery outcomes.
    pub journal: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            photos_dir: PathBuf::from("photos"),
            journal: PathBuf::from("sendmail.db"),
        }
    }
}

/// Complete booth configuration.
///
/// # Example YAML
///
/// ```yaml
/// modes:
///   Animation:
///     frame_number: 8
///     snap_period_millis: 250
/// buttons:
///   snap_None:
///     keys: ["s", "<F1>"]
///     gpio: 10
/// gpio:
///   pull: down
///   active_state: 1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoothConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub camera: CameraSettings,
    pub modes: ModeTable,
    pub effects: BTreeMap<String, ImageEffect>,
    pub effect_palette: Vec<String>,
    pub buttons: BTreeMap<String, ButtonBinding>,
    pub gpio: GpioSettings,
    pub countdown: CountdownSettings,
    pub review: ReviewSettings,
    pub icons: IconSettings,
    pub email: EmailSettings,
    pub oauth: OAuthSettings,
    pub print: PrintSettings,
    pub storage: StorageSettings,
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            name: None,
            camera: CameraSettings::default(),
            modes: ModeTable::default(),
            effects: default_effects(),
            effect_palette: default_effect_palette(),
            buttons: default_buttons(),
            gpio: GpioSettings::default(),
            countdown: CountdownSettings::default(),
            review: ReviewSettings::default(),
            icons: IconSettings::default(),
            email: EmailSettings::default(),
            oauth: OAuthSettings::default(),
            print: PrintSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl BoothConfig {
    /// Look up an effect by key.
    pub fn effect(&self, key: &str) -> Option<&ImageEffect> {
        self.effects.get(key)
    }
}
