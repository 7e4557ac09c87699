//! Session controller behaviour on mock camera and renderer.

use std::sync::Arc;
use std::time::Duration;

use booth::camera::mock::MockCamera;
use booth::config::{AnimationCountdown, ModeKind};
use booth::error::{CaptureError, RenderError};
use booth::input::Action;
use booth::render::mock::{MockRenderer, RenderOp};
use booth::session::{AbortReason, ControllerState, DeliveryOutcome, SessionEnd, UiEvent};

use crate::common::fixtures::{Scratch, fast_config};
use crate::common::harness::Harness;
use crate::common::init_test_logging;

#[tokio::test]
async fn test_frame_counts_per_mode() {
    init_test_logging();
    let scratch = Scratch::new();
    let mut config = fast_config(&scratch);
    config.review.timeout_secs = 0;
    config.modes.animation.frame_number = 3;
    config.modes.animation.snap_period_millis = 10;
    let mut harness = Harness::start(config, MockCamera::new(), MockRenderer::new(), None);

    for (mode, expected) in [
        (ModeKind::Single, 1),
        (ModeKind::Collage, 4),
        (ModeKind::Animation, 3),
    ] {
        let before = harness.camera.call_count();
        harness.send(Action::Snap(mode));
        let outcome = harness.next_outcome().await;
        assert_eq!(outcome.mode, mode);
        assert_eq!(outcome.frames_captured, expected);
        assert_eq!(harness.camera.call_count() - before, expected);
        harness.wait_for_state(ControllerState::is_idle).await;
    }

    let kinds: Vec<_> = scratch
        .photos()
        .iter()
        .map(|p| p.extension().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(kinds, ["gif", "jpg", "jpg"]);
    assert_eq!(harness.finish().await, ControllerState::Idle);
}

#[tokio::test]
async fn test_snap_while_busy_is_ignored() {
    init_test_logging();
    let scratch = Scratch::new();
    let mut config = fast_config(&scratch);
    config.countdown.step_millis = 50;
    config.review.timeout_secs = 0;
    let mut harness = Harness::start(config, MockCamera::new(), MockRenderer::new(), None);

    harness.send(Action::Snap(ModeKind::Single));
    harness
        .wait_for_state(|s| matches!(s, ControllerState::CountingDown { .. }))
        .await;
    harness.send(Action::Snap(ModeKind::Collage));
    harness.send(Action::Snap(ModeKind::Animation));

    let outcome = harness.next_outcome().await;
    assert_eq!(outcome.mode, ModeKind::Single);
    harness.wait_for_state(ControllerState::is_idle).await;
    let camera = Arc::clone(&harness.camera);
    harness.finish().await;

    assert_eq!(camera.call_count(), 1);
    assert_eq!(scratch.photos().len(), 1);
}

#[tokio::test]
async fn test_capture_failure_aborts_without_compositing() {
    init_test_logging();
    let scratch = Scratch::new();
    let camera = MockCamera::new().failing_on(3, CaptureError::Command("sensor timeout".into()));
    let mut harness = Harness::start(fast_config(&scratch), camera, MockRenderer::new(), None);

    harness.send(Action::Snap(ModeKind::Collage));
    let outcome = harness.next_outcome().await;

    assert!(outcome.is_aborted());
    assert_eq!(outcome.frames_captured, 2);
    match &outcome.end {
        SessionEnd::Aborted {
            reason: AbortReason::Capture { frame, error },
        } => {
            assert_eq!(*frame, 2);
            assert_eq!(*error, CaptureError::Command("sensor timeout".into()));
        }
        other => panic!("expected capture abort, got {other:?}"),
    }
    assert_eq!(harness.camera.call_count(), 3);
    assert_eq!(harness.renderer.composite_calls(), 0);
    assert!(harness.renderer.operations().is_empty());
    assert!(scratch.photos().is_empty());

    harness.wait_for_state(ControllerState::is_idle).await;
    let names: Vec<&str> = harness.ui.states().iter().map(ControllerState::name).collect();
    assert_eq!(names[names.len() - 2..], ["aborted", "idle"]);
    assert!(
        harness
            .ui
            .events()
            .iter()
            .any(|e| matches!(e, UiEvent::Error(m) if m.contains("frame 3")))
    );
    assert_eq!(harness.finish().await, ControllerState::Idle);
}

#[tokio::test]
async fn test_render_failure_aborts_and_discards() {
    init_test_logging();
    let scratch = Scratch::new();
    let renderer =
        MockRenderer::new().failing_composite(RenderError::Processing("out of memory".into()));
    let mut harness = Harness::start(fast_config(&scratch), MockCamera::new(), renderer, None);

    harness.send(Action::Snap(ModeKind::Collage));
    let outcome = harness.next_outcome().await;

    assert_eq!(outcome.frames_captured, 4);
    assert!(matches!(
        outcome.end,
        SessionEnd::Aborted {
            reason: AbortReason::Render(_)
        }
    ));
    assert!(scratch.photos().is_empty());
    harness.wait_for_state(ControllerState::is_idle).await;
    harness.finish().await;
}

#[tokio::test]
async fn test_animation_frames_are_spaced_by_period() {
    init_test_logging();
    let scratch = Scratch::new();
    let mut config = fast_config(&scratch);
    config.review.timeout_secs = 0;
    let period = Duration::from_millis(config.modes.animation.snap_period_millis);
    let gif_period = config.modes.animation.gif_period_millis;
    assert_eq!(period, Duration::from_millis(200));
    let mut harness = Harness::start(config, MockCamera::new(), MockRenderer::new(), None);

    harness.send(Action::Snap(ModeKind::Animation));
    let outcome = harness.next_outcome().await;

    assert_eq!(outcome.frames_captured, 10);
    let intervals = harness.camera.intervals();
    assert_eq!(intervals.len(), 9);
    for gap in intervals {
        assert!(gap >= period, "frames only {gap:?} apart");
    }
    assert_eq!(harness.renderer.encode_calls(), 1);
    assert!(harness.renderer.operations().contains(&RenderOp::EncodeAnimation {
        frames: 10,
        delay_ms: gif_period,
    }));
    harness.finish().await;
}

#[tokio::test]
async fn test_animation_countdown_only_before_first_frame() {
    init_test_logging();
    let scratch = Scratch::new();
    let mut config = fast_config(&scratch);
    config.review.timeout_secs = 0;
    config.modes.animation.frame_number = 3;
    config.modes.animation.snap_period_millis = 10;
    let overlays = config.countdown.overlays.len();

    let mut harness = Harness::start(config.clone(), MockCamera::new(), MockRenderer::new(), None);
    harness.send(Action::Snap(ModeKind::Animation));
    harness.next_outcome().await;
    assert_eq!(harness.ui.countdowns(), overlays);
    harness.finish().await;

    config.countdown.animation = AnimationCountdown::Skip;
    let mut harness = Harness::start(config, MockCamera::new(), MockRenderer::new(), None);
    harness.send(Action::Snap(ModeKind::Animation));
    harness.next_outcome().await;
    assert_eq!(harness.ui.countdowns(), 0);
    harness.finish().await;
}

#[tokio::test]
async fn test_collage_effect_then_composite() {
    init_test_logging();
    let scratch = Scratch::new();
    let mut config = fast_config(&scratch);
    config.review.timeout_secs = 0;
    let overlay = config.modes.collage.foreground_image.clone();
    let mut harness = Harness::start(config, MockCamera::new(), MockRenderer::new(), None);

    harness.send(Action::SelectEffect("sketch".into()));
    harness.send(Action::Snap(ModeKind::Collage));
    let outcome = harness.next_outcome().await;
    assert_eq!(outcome.effect.as_deref(), Some("sketch"));

    let ops = harness.renderer.operations();
    assert_eq!(ops.len(), 5);
    for op in &ops[..4] {
        assert!(matches!(op, RenderOp::ApplyEffect { effect, .. } if effect == "sketch"));
    }
    assert!(matches!(
        &ops[4],
        RenderOp::Composite { frames: 4, overlay: o, .. } if *o == overlay
    ));
    harness.finish().await;
}

#[tokio::test]
async fn test_single_without_effect_or_logo_is_untouched() {
    init_test_logging();
    let scratch = Scratch::new();
    let mut config = fast_config(&scratch);
    config.review.timeout_secs = 0;
    config.modes.single.effect = None;
    config.modes.single.logo = None;
    let mut harness = Harness::start(config, MockCamera::new(), MockRenderer::new(), None);

    harness.send(Action::Snap(ModeKind::Single));
    let outcome = harness.next_outcome().await;
    assert!(!outcome.is_aborted());
    harness.renderer.assert_no_operations();
    harness.finish().await;
}

#[tokio::test]
async fn test_dismiss_during_countdown_cancels() {
    init_test_logging();
    let scratch = Scratch::new();
    let mut config = fast_config(&scratch);
    config.countdown.step_millis = 100;
    let mut harness = Harness::start(config, MockCamera::new(), MockRenderer::new(), None);

    harness.send(Action::Snap(ModeKind::Collage));
    harness
        .wait_for_state(|s| matches!(s, ControllerState::CountingDown { .. }))
        .await;
    harness.send(Action::Dismiss);

    let outcome = harness.next_outcome().await;
    assert!(matches!(
        outcome.end,
        SessionEnd::Aborted {
            reason: AbortReason::Cancelled(Action::Dismiss)
        }
    ));
    assert_eq!(harness.camera.call_count(), 0);
    harness.wait_for_state(ControllerState::is_idle).await;
    harness.finish().await;
}

#[tokio::test]
async fn test_configure_between_animation_frames_cancels() {
    init_test_logging();
    let scratch = Scratch::new();
    let mut config = fast_config(&scratch);
    config.countdown.animation = AnimationCountdown::Skip;
    config.modes.animation.snap_period_millis = 200;
    let mut harness = Harness::start(config, MockCamera::new(), MockRenderer::new(), None);

    harness.send(Action::Snap(ModeKind::Animation));
    harness
        .wait_for_state(|s| matches!(s, ControllerState::Capturing { frame: 2, .. }))
        .await;
    harness.send(Action::Configure);

    let outcome = harness.next_outcome().await;
    assert_eq!(outcome.mode, ModeKind::Animation);
    assert!(matches!(
        outcome.end,
        SessionEnd::Aborted {
            reason: AbortReason::Cancelled(Action::Configure)
        }
    ));
    assert_eq!(outcome.frames_captured, 2);
    assert_eq!(harness.camera.call_count(), 2);
    harness.renderer.assert_no_operations();
    harness.wait_for_state(ControllerState::is_idle).await;
    harness.finish().await;

    assert!(scratch.photos().is_empty());
}

#[tokio::test]
async fn test_snap_during_review_starts_next_session() {
    init_test_logging();
    let scratch = Scratch::new();
    let mut config = fast_config(&scratch);
    config.review.timeout_secs = 30;
    let mut harness = Harness::start(config, MockCamera::new(), MockRenderer::new(), None);

    harness.send(Action::Snap(ModeKind::Single));
    harness
        .wait_for_state(|s| matches!(s, ControllerState::ReviewOrDeliver { .. }))
        .await;
    harness.send(Action::Snap(ModeKind::Collage));

    let first = harness.next_outcome().await;
    assert!(matches!(
        first.end,
        SessionEnd::Completed {
            delivery: DeliveryOutcome::Skipped,
            ..
        }
    ));
    harness
        .wait_for_state(|s| matches!(s, ControllerState::ReviewOrDeliver { mode: ModeKind::Collage, .. }))
        .await;
    harness.send(Action::Dismiss);
    let second = harness.next_outcome().await;
    assert_eq!(second.mode, ModeKind::Collage);
    assert_eq!(harness.camera.call_count(), 5);
    harness.finish().await;
}
