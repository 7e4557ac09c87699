//! Booth configuration.
//!
//! The configuration file is read once at startup into an immutable
//! [`BoothConfig`]. Modes, effects and button bindings are never mutated
//! afterwards; components receive them as `Arc<BoothConfig>`.

mod loader;
mod path;
mod schema;
mod validate;

pub use loader::{ConfigFormat, load_config, load_config_from_str, parse_config, save_config};
pub use path::{
    PathResolver, check_resources, default_config_path, home_dir, resolve_path, resource_files,
    validate_resource,
};
pub use schema::{
    AnimationCountdown, AnimationMode, BoothConfig, ButtonBinding, COLLAGE_FRAMES, CameraSettings,
    CaptureMode, CollageMode, CountdownSettings, EffectParam, EmailSettings, FrameSize,
    GpioSettings, IconSettings, ImageEffect, ModeKind, ModeTable, OAuthSettings, PinNumbering,
    PrintSettings, Pull, ReviewSettings, SingleMode, StorageSettings, V1_FULL_SIZE, V1_HALF_SIZE,
    V1_QUARTER_SIZE, V2_FULL_SIZE, V2_HALF_SIZE, V2_QUARTER_SIZE, default_buttons,
    default_effect_palette, default_effects,
};
