//! Configuration loading against real files, and the input table it feeds.

use std::fs;

use booth::app;
use booth::config::{ConfigFormat, ModeKind, load_config, load_config_from_str, save_config};
use booth::error::{BoothError, ConfigError};
use booth::input::mock::MockPins;
use booth::input::{Action, GpioPoller, KeyMap};

use crate::common::fixtures::Scratch;

#[test]
fn test_duplicate_gpio_pin_rejected() {
    let yaml = r#"
buttons:
  snap_None:
    keys: ["s"]
    gpio: 10
  snap_Four:
    keys: ["f"]
    gpio: 10
"#;
    let err = load_config_from_str(yaml, ConfigFormat::Yaml).unwrap_err();
    match err {
        ConfigError::DuplicatePin { pin, first, second } => {
            assert_eq!(pin, 10);
            // Bindings are checked in name order.
            assert_eq!(first, "snap_Four");
            assert_eq!(second, "snap_None");
        }
        other => panic!("expected duplicate pin, got {other:?}"),
    }
}

#[test]
fn test_duplicate_key_rejected() {
    let yaml = r#"
buttons:
  snap_None:
    keys: ["s"]
  print:
    keys: ["s"]
"#;
    let err = load_config_from_str(yaml, ConfigFormat::Yaml).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateKey { ref key, .. } if key == "s"));
}

#[test]
fn test_mode_with_unknown_effect_rejected() {
    let yaml = r#"
modes:
  None:
    effect: watercolor
"#;
    let err = load_config_from_str(yaml, ConfigFormat::Yaml).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownEffect { ref effect, .. } if effect == "watercolor"));
}

#[test]
fn test_unknown_binding_action_rejected() {
    let yaml = r#"
buttons:
  launch_rockets:
    keys: ["r"]
"#;
    let err = load_config_from_str(yaml, ConfigFormat::Yaml).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownAction(_)));
}

#[test]
fn test_empty_document_is_default() {
    let config = load_config_from_str("", ConfigFormat::Yaml).unwrap();
    assert_eq!(config.modes.get(ModeKind::Collage).frame_count(), 4);
    assert!(!config.print.enabled);
}

#[test]
fn test_initialized_config_loads_with_resolved_paths() {
    let scratch = Scratch::new();
    let path = scratch.join("booth.yaml");
    app::init(&path, false).unwrap();

    let config = load_config(&path).unwrap();
    assert!(config.modes.collage.foreground_image.is_absolute());
    assert!(config.modes.collage.foreground_image.exists());
}

#[test]
fn test_missing_resource_is_fatal() {
    let scratch = Scratch::new();
    let path = scratch.join("booth.yaml");
    app::init(&path, false).unwrap();

    let config = load_config(&path).unwrap();
    fs::remove_file(&config.modes.collage.foreground_image).unwrap();

    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::MissingResource { .. }));
    assert!(BoothError::from(err).suggestion().is_some());
}

#[test]
fn test_missing_file_reported() {
    let scratch = Scratch::new();
    let err = load_config(scratch.join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));
}

#[test]
fn test_json_and_toml_carry_the_same_tables() {
    let scratch = Scratch::new();
    let yaml = scratch.join("booth.yaml");
    app::init(&yaml, false).unwrap();
    let original = load_config(&yaml).unwrap();

    for ext in ["json", "toml"] {
        let path = scratch.join(&format!("booth.{ext}"));
        save_config(&original, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.effects.len(), original.effects.len(), "{ext}");
        assert_eq!(loaded.buttons.len(), original.buttons.len(), "{ext}");
        assert_eq!(loaded.effect_palette, original.effect_palette, "{ext}");
    }
}

#[test]
fn test_bindings_feed_pins_and_keys() {
    let yaml = r#"
buttons:
  snap_Animation:
    keys: ["a"]
    gpio: 12
  dismiss:
    keys: ["x", "<Esc>"]
"#;
    let config = load_config_from_str(yaml, ConfigFormat::Yaml).unwrap();

    let keymap = KeyMap::from_bindings(&config.buttons).unwrap();
    assert_eq!(keymap.lookup("a"), Some(&Action::Snap(ModeKind::Animation)));
    assert_eq!(keymap.lookup("<Esc>"), Some(&Action::Dismiss));
    assert_eq!(keymap.lookup("s"), None);

    let pins = MockPins::new();
    let mut poller = GpioPoller::from_config(&config, pins.clone()).unwrap();
    assert_eq!(poller.pins().count(), 1);

    // Board pin 12 is BCM 18.
    pins.set_level(18, 1);
    assert!(poller.poll_once().is_empty());
    assert_eq!(poller.poll_once(), vec![(12, Action::Snap(ModeKind::Animation))]);
}
