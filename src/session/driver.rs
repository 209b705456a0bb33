//! Async driver for a shared controller
//!
//! One task owns the encoder event receiver and the timer interval, and
//! applies both to the controller under its lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;

use super::controller::RecordingController;
use super::state::SessionPhase;
use crate::errors::RecorderError;
use crate::media::TrackEvent;

pub type SharedController = Arc<Mutex<RecordingController>>;

/// Drive `controller` until its event channel closes.
///
/// The timer interval restarts whenever a take enters Recording, so ticks
/// land on whole seconds after the take's start.
///
/// The channel closes when the controller is dropped, so hosts that keep a
/// [`SharedController`] alive for the whole process abort the task instead.
pub async fn run_session_loop(
    controller: SharedController,
    mut events: mpsc::UnboundedReceiver<TrackEvent>,
    tick: Duration,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut phases = controller.lock().await.subscribe();
    let mut last_phase = *phases.borrow_and_update();
    let mut watching = true;

    loop {
        tokio::select! {
            changed = phases.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                } else {
                    // Every commit republishes the phase; only a new take restarts the timer.
                    let phase = *phases.borrow_and_update();
                    if phase == SessionPhase::Recording && last_phase != SessionPhase::Recording {
                        interval.reset();
                    }
                    last_phase = phase;
                }
            }
            event = events.recv() => match event {
                Some(event) => {
                    let mut controller = controller.lock().await;
                    if let Err(e) = controller.handle_event(event) {
                        log::error!("Failed to apply track event: {}", e);
                    }
                }
                None => {
                    log::debug!("Track event channel closed; session loop exiting");
                    break;
                }
            },
            _ = interval.tick() => {
                controller.lock().await.tick();
            }
        }
    }
}

/// Wait until the watched phase is one of `targets`.
pub async fn wait_for_phase(
    phases: &mut watch::Receiver<SessionPhase>,
    targets: &[SessionPhase],
    timeout: Duration,
) -> Result<SessionPhase, RecorderError> {
    let wait = async {
        loop {
            let current = *phases.borrow_and_update();
            if targets.contains(&current) {
                return Ok(current);
            }
            if phases.changed().await.is_err() {
                return Err(RecorderError::InvalidState {
                    action: "wait for the session",
                    state: "controller was dropped",
                });
            }
        }
    };
    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(RecorderError::InvalidState {
            action: "wait for the session",
            state: "timed out",
        }),
    }
}
