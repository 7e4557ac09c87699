//! A session controller running on mock collaborators.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use booth::camera::mock::MockCamera;
use booth::config::BoothConfig;
use booth::delivery::DeliveryQueue;
use booth::input::{Action, ActionSender, action_queue};
use booth::render::mock::MockRenderer;
use booth::session::{ControllerState, RecordingUi, SessionController, SessionOutcome};

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(10);

pub struct Harness {
    pub config: Arc<BoothConfig>,
    pub camera: Arc<MockCamera>,
    pub renderer: Arc<MockRenderer>,
    pub ui: Arc<RecordingUi>,
    pub states: watch::Receiver<ControllerState>,
    pub outcomes: broadcast::Receiver<SessionOutcome>,
    sender: Option<ActionSender>,
    task: JoinHandle<()>,
}

impl Harness {
    /// Spawn a controller. Must be called inside a runtime.
    pub fn start(
        config: BoothConfig,
        camera: MockCamera,
        renderer: MockRenderer,
        deliveries: Option<DeliveryQueue>,
    ) -> Self {
        let config = Arc::new(config);
        let camera = Arc::new(camera);
        let renderer = Arc::new(renderer);
        let ui = Arc::new(RecordingUi::new());
        let (sender, rx) = action_queue();

        let mut controller = SessionController::new(
            Arc::clone(&config),
            Arc::clone(&camera),
            Arc::clone(&renderer),
            rx,
        )
        .with_ui(ui.clone());
        if let Some(queue) = deliveries {
            controller = controller.with_deliveries(queue);
        }
        let states = controller.subscribe_state();
        let outcomes = controller.subscribe_outcomes();
        let task = tokio::spawn(controller.run());

        Self {
            config,
            camera,
            renderer,
            ui,
            states,
            outcomes,
            sender: Some(sender),
            task,
        }
    }

    /// Inject an on-screen action.
    ///
    /// # Panics
    ///
    /// Panics after [`Harness::finish`] has closed the queue.
    pub fn send(&self, action: Action) {
        let sender = self.sender.as_ref().expect("queue already closed");
        assert!(sender.tap(action), "controller has stopped");
    }

    /// Wait until the published state matches.
    ///
    /// # Panics
    ///
    /// Panics on timeout.
    pub async fn wait_for_state<F>(&mut self, predicate: F) -> ControllerState
    where
        F: Fn(&ControllerState) -> bool,
    {
        let states = &mut self.states;
        tokio::time::timeout(WAIT, async {
            loop {
                {
                    let state = states.borrow_and_update();
                    if predicate(&state) {
                        return state.clone();
                    }
                }
                states.changed().await.expect("controller stopped");
            }
        })
        .await
        .expect("timed out waiting for controller state")
    }

    /// Wait for the next finished session.
    ///
    /// # Panics
    ///
    /// Panics on timeout or if the controller stopped.
    pub async fn next_outcome(&mut self) -> SessionOutcome {
        tokio::time::timeout(WAIT, self.outcomes.recv())
            .await
            .expect("timed out waiting for session outcome")
            .expect("controller stopped")
    }

    /// Close the action queue and wait for the controller to stop.
    ///
    /// # Panics
    ///
    /// Panics if the controller task panicked or does not stop.
    pub async fn finish(mut self) -> ControllerState {
        self.sender.take();
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("controller did not stop")
            .expect("controller task panicked");
        self.states.borrow().clone()
    }
}
