//! Delivery and token refresh around running sessions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use booth::app::{self, SnapRequest};
use booth::auth::mock::MockTokenEndpoint;
use booth::auth::{AccessToken, CredentialStore, ReauthTrigger, StoredCredentials, TokenHandle, TokenRefresher};
use booth::camera::mock::MockCamera;
use booth::config::{ModeKind, PrintSettings};
use booth::delivery::mock::{MockMailer, MockPrinter};
use booth::delivery::{DeliveryKind, DeliveryQueue, DeliveryStatus, Dispatcher, Journal, RetryPolicy};
use booth::error::{AuthError, DeliveryError};
use booth::input::Action;
use booth::render::mock::MockRenderer;
use booth::session::{ControllerState, DeliveryOutcome, NullUi, SessionEnd};

use crate::common::fixtures::{Scratch, fast_config};
use crate::common::harness::{Harness, WAIT};
use crate::common::init_test_logging;

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(5),
        backoff_factor: 2.0,
        max_delay: Duration::from_millis(20),
        attempt_timeout: Duration::from_millis(500),
    }
}

fn seeded_store(scratch: &Scratch) -> CredentialStore {
    let store = CredentialStore::new(scratch.join("google_credentials.dat"));
    store.save(&StoredCredentials::new("refresh-secret")).unwrap();
    store
}

async fn wait_for_token(handle: &mut TokenHandle, secret: &str) {
    tokio::time::timeout(WAIT, async {
        while handle.current().as_ref().map(AccessToken::secret) != Some(secret) {
            assert!(handle.changed().await, "refresher stopped");
        }
    })
    .await
    .expect("token never published");
}

#[tokio::test]
async fn test_failing_token_refresh_does_not_block_sessions() {
    init_test_logging();
    let scratch = Scratch::new();
    let endpoint = MockTokenEndpoint::new()
        .failing(AuthError::Network("token endpoint down".into()))
        .with_delay(Duration::from_millis(300));
    let (refresher, tokens, reauth) =
        TokenRefresher::new(endpoint.clone(), seeded_store(&scratch), Duration::from_secs(3600));
    let refresher_task = tokio::spawn(refresher.run());

    let mailer = Arc::new(MockMailer::new());
    let dispatcher = Dispatcher::new(Arc::clone(&mailer), Arc::new(MockPrinter::new()), tokens, reauth)
        .with_policy(fast_policy());
    let mut reports = dispatcher.subscribe();
    let (queue, requests) = DeliveryQueue::channel();
    let dispatcher_task = tokio::spawn(dispatcher.run(requests));

    let mut harness = Harness::start(
        fast_config(&scratch),
        MockCamera::new(),
        MockRenderer::new(),
        Some(queue),
    );
    let started = Instant::now();
    harness.send(Action::Snap(ModeKind::Single));
    harness
        .wait_for_state(|s| matches!(s, ControllerState::ReviewOrDeliver { .. }))
        .await;
    harness.send(Action::SendEmail {
        recipient: Some("guest@example.com".into()),
    });
    let outcome = harness.next_outcome().await;
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(matches!(
        outcome.end,
        SessionEnd::Completed {
            delivery: DeliveryOutcome::Pending {
                kind: DeliveryKind::Email { .. },
                ..
            },
            ..
        }
    ));
    harness.wait_for_state(ControllerState::is_idle).await;

    let report = tokio::time::timeout(WAIT, reports.recv()).await.unwrap().unwrap();
    assert_eq!(report.session, outcome.session);
    assert!(matches!(report.status, DeliveryStatus::Failed { .. }));
    assert_eq!(mailer.call_count(), 0);

    harness.finish().await;
    dispatcher_task.await.unwrap();
    refresher_task.await.unwrap();
    assert!(!endpoint.calls().is_empty());
}

#[tokio::test]
async fn test_rejected_token_triggers_reauth_without_retry() {
    init_test_logging();
    let scratch = Scratch::new();
    let endpoint = MockTokenEndpoint::new();
    let (refresher, mut tokens, reauth) =
        TokenRefresher::new(endpoint.clone(), seeded_store(&scratch), Duration::from_secs(3600));
    let refresher_task = tokio::spawn(refresher.run());
    wait_for_token(&mut tokens, "token-1").await;

    let artifact = scratch.join("photo.jpg");
    std::fs::write(&artifact, b"jpeg").unwrap();
    let mailer = Arc::new(MockMailer::new());
    mailer.push_result(Err(DeliveryError::Auth("HTTP 401".into())));
    let dispatcher = Dispatcher::new(
        Arc::clone(&mailer),
        Arc::new(MockPrinter::new()),
        tokens.clone(),
        reauth,
    )
    .with_policy(fast_policy());

    let report = dispatcher
        .deliver(booth::delivery::DeliveryRequest::new(
            uuid::Uuid::new_v4(),
            DeliveryKind::Email {
                recipient: "guest@example.com".into(),
            },
            booth::session::ArchivedArtifact {
                path: artifact,
                kind: booth::render::ArtifactKind::Still,
                content_type: "image/jpeg".into(),
                size: booth::config::FrameSize::new(2, 2),
                bytes: 4,
            },
        ))
        .await;

    assert_eq!(report.attempts, 1);
    assert!(matches!(report.status, DeliveryStatus::Failed { .. }));
    assert_eq!(mailer.call_count(), 1);
    assert_eq!(mailer.sent()[0].token, "token-1");

    wait_for_token(&mut tokens, "token-2").await;
    assert_eq!(endpoint.calls(), ["refresh-secret", "refresh-secret"]);

    drop(dispatcher);
    drop(tokens);
    tokio::time::timeout(WAIT, refresher_task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_snap_emails_archived_artifact() {
    init_test_logging();
    let scratch = Scratch::new();
    let config = Arc::new(fast_config(&scratch));
    let mailer = Arc::new(MockMailer::new());
    let (reauth, _requests) = ReauthTrigger::channel();
    let token = AccessToken::new("tok", Utc::now() + chrono::Duration::hours(1));
    let dispatcher = Dispatcher::new(
        Arc::clone(&mailer),
        Arc::new(MockPrinter::new()),
        TokenHandle::fixed(Some(token)),
        reauth,
    )
    .with_email(config.email.clone())
    .with_policy(fast_policy());

    let report = app::snap(
        Arc::clone(&config),
        Arc::new(MockCamera::new()),
        Arc::new(MockRenderer::new()),
        dispatcher,
        SnapRequest {
            mode: Some(ModeKind::Collage),
            effect: Some("negative".into()),
            email: Some("guest@example.com".into()),
            print: false,
        },
        Arc::new(NullUi),
    )
    .await
    .unwrap();

    let artifact = report.outcome.artifact().unwrap().clone();
    assert!(artifact.path.exists());
    assert_eq!(report.outcome.effect.as_deref(), Some("negative"));
    assert_eq!(report.deliveries.len(), 1);
    assert!(report.deliveries[0].is_sent());

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].mail.to, "guest@example.com");
    assert_eq!(sent[0].mail.attachment.file_name, artifact.file_name());
    assert_eq!(sent[0].mail.attachment.data, std::fs::read(&artifact.path).unwrap());
}

#[tokio::test]
async fn test_snap_prints_and_journals() {
    init_test_logging();
    let scratch = Scratch::new();
    let mut config = fast_config(&scratch);
    config.print = PrintSettings {
        enabled: true,
        ..PrintSettings::default()
    };
    let config = Arc::new(config);
    let printer = Arc::new(MockPrinter::new());
    let (reauth, _requests) = ReauthTrigger::channel();
    let dispatcher = Dispatcher::new(
        Arc::new(MockMailer::new()),
        Arc::clone(&printer),
        TokenHandle::fixed(None),
        reauth,
    )
    .with_journal(Journal::open(&config.storage.journal).unwrap());

    let report = app::snap(
        Arc::clone(&config),
        Arc::new(MockCamera::new()),
        Arc::new(MockRenderer::new()),
        dispatcher,
        SnapRequest {
            mode: Some(ModeKind::Single),
            print: true,
            ..SnapRequest::default()
        },
        Arc::new(NullUi),
    )
    .await
    .unwrap();

    let artifact = report.outcome.artifact().unwrap();
    assert_eq!(printer.printed(), vec![artifact.path.clone()]);

    let journal = Journal::open(&config.storage.journal).unwrap();
    let entries = journal.recent(10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, "print");
    assert_eq!(entries[0].status, "sent");
    assert_eq!(entries[0].session, report.outcome.session);
}

#[tokio::test]
async fn test_snap_capture_failure_reports_abort() {
    init_test_logging();
    let scratch = Scratch::new();
    let config = Arc::new(fast_config(&scratch));
    let (reauth, _requests) = ReauthTrigger::channel();
    let dispatcher = Dispatcher::new(
        Arc::new(MockMailer::new()),
        Arc::new(MockPrinter::new()),
        TokenHandle::fixed(None),
        reauth,
    );

    let report = app::snap(
        config,
        Arc::new(MockCamera::new().failing_on(1, booth::error::CaptureError::Unavailable("no camera".into()))),
        Arc::new(MockRenderer::new()),
        dispatcher,
        SnapRequest::default(),
        Arc::new(NullUi),
    )
    .await
    .unwrap();

    assert!(report.outcome.is_aborted());
    assert!(report.deliveries.is_empty());
    assert!(scratch.photos().is_empty());
}
