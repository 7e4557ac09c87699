//! Input source: hardware buttons, keyboard and on-screen taps.
//!
//! Every trigger is reduced to an [`ActionEvent`] and pushed onto one bounded,
//! ordered queue read by the session controller. Producers never wait on the
//! controller: when the queue is full the event is dropped and logged.

mod action;
pub mod gpio;
mod keymap;
pub mod mock;
mod sysfs;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub use action::{Action, ActionEvent, ActionSource};
pub use gpio::{Debouncer, GpioPoller, PinReader, PinSpec, board_to_bcm};
pub use keymap::KeyMap;
pub use sysfs::SysfsPins;

/// Capacity of the action queue.
pub const ACTION_QUEUE_CAPACITY: usize = 64;

/// Create the action queue shared by all input sources.
pub fn action_queue() -> (ActionSender, mpsc::Receiver<ActionEvent>) {
    let (tx, rx) = mpsc::channel(ACTION_QUEUE_CAPACITY);
    (ActionSender { tx }, rx)
}

/// Producer side of the action queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ActionSender {
    tx: mpsc::Sender<ActionEvent>,
}

impl ActionSender {
    /// Enqueue an action without waiting.
    ///
    /// Returns `false` once the controller has gone away.
    pub fn send(&self, action: Action, source: ActionSource) -> bool {
        let event = ActionEvent::new(action, source);
        trace!(action = %event.action, source = ?event.source, "Enqueue action");
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(action = %event.action, "Action queue full, dropping event");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// On-screen button tap.
    pub fn tap(&self, action: Action) -> bool {
        self.send(action, ActionSource::Touch)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read key codes line by line and forward the bound actions.
///
/// A line holding a bound key code (`s`, `<F1>`) becomes a key event. A line
/// holding an action name (`send_email:guest@example.com`) stands in for the
/// matching on-screen button. Anything else is ignored.
pub fn spawn_key_reader<R>(reader: R, keymap: KeyMap, sender: ActionSender) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Key input failed");
                    break;
                }
            };
            let code = line.trim();
            if code.is_empty() {
                continue;
            }

            let delivered = if let Some(action) = keymap.lookup(code) {
                sender.send(
                    action.clone(),
                    ActionSource::Key {
                        code: code.to_string(),
                    },
                )
            } else if let Ok(action) = Action::parse(code) {
                sender.tap(action)
            } else {
                trace!(code, "Unbound key ignored");
                continue;
            };

            if !delivered {
                break;
            }
        }
        debug!("Key reader stopped");
    })
}
