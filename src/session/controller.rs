//! The recording controller
//!
//! Owns the capture source, the running track recorders, the exercise store
//! and the current [`SessionState`]. Every public action computes the next
//! state with a pure transition and commits it only when the whole action
//! succeeded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::state::{
    ControlState, FormPolicy, SessionForm, SessionPhase, SessionState, StopOutcome, TrackLayout,
};
use crate::capture::{CaptureBackend, CaptureConstraints, CaptureSource};
use crate::config::RecorderConfig;
use crate::errors::{ErrorResponse, RecorderError};
use crate::media::{
    create_encoder, select_format, EncoderSettings, EventSink, TrackEncoder, TrackEvent,
    TrackInput, TrackRecorder,
};
use crate::storage::ExerciseStore;
use crate::timing::Clock;
use crate::types::{ExerciseRecord, MediaPayload, TrackKind, VideoDevice};

pub struct RecordingController {
    config: RecorderConfig,
    backend: Arc<dyn CaptureBackend>,
    store: ExerciseStore,
    clock: Arc<dyn Clock>,
    state: SessionState,
    source: Option<CaptureSource>,
    recorders: Vec<TrackRecorder>,
    events: mpsc::UnboundedSender<TrackEvent>,
    phase: watch::Sender<SessionPhase>,
    last_error: Option<ErrorResponse>,
}

impl RecordingController {
    /// Build a controller and the receiving end of its encoder event channel.
    ///
    /// The receiver must be drained by exactly one consumer, normally
    /// [`run_session_loop`](super::run_session_loop).
    pub fn new(
        config: RecorderConfig,
        backend: Arc<dyn CaptureBackend>,
        store: ExerciseStore,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<TrackEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (phase, _) = watch::channel(SessionPhase::Idle);
        log::info!(
            "Recording controller ready (backend: {}, {} saved exercises)",
            backend.name(),
            store.len()
        );
        (
            Self {
                config,
                backend,
                store,
                clock,
                state: SessionState::Idle,
                source: None,
                recorders: Vec::new(),
                events,
                phase,
                last_error: None,
            },
            events_rx,
        )
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Watch phase changes as they are committed
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    pub fn controls(&self) -> ControlState {
        ControlState::derive(&self.state, self.has_source())
    }

    /// Video payload of the take under review
    pub fn preview(&self) -> Option<&MediaPayload> {
        self.state.preview()
    }

    pub fn store(&self) -> &ExerciseStore {
        &self.store
    }

    pub fn has_source(&self) -> bool {
        self.source.as_ref().is_some_and(|s| !s.is_released())
    }

    pub fn current_device(&self) -> Option<&VideoDevice> {
        self.source.as_ref().map(CaptureSource::device)
    }

    /// Last failure that happened outside a caller's action, e.g. a track
    /// failing while flushing.
    pub fn last_error(&self) -> Option<&ErrorResponse> {
        self.last_error.as_ref()
    }

    pub fn take_last_error(&mut self) -> Option<ErrorResponse> {
        self.last_error.take()
    }

    fn policy(&self) -> FormPolicy {
        FormPolicy {
            require_label: self.config.recording.require_label,
            require_kind: self.config.recording.require_kind,
        }
    }

    fn commit(&mut self, next: SessionState) {
        let before = self.state.phase();
        self.state = next;
        let after = self.state.phase();
        if before != after {
            log::info!("Session {} -> {}", before.as_str(), after.as_str());
        }
        self.phase.send_replace(after);
    }

    fn sink(&self) -> EventSink {
        let tx = self.events.clone();
        Arc::new(move |event| {
            if tx.send(event).is_err() {
                log::debug!("Event channel closed; dropping track event");
            }
        })
    }

    fn ensure_can_switch(&self, action: &'static str) -> Result<(), RecorderError> {
        if self.state.can_switch_source() {
            Ok(())
        } else {
            Err(RecorderError::InvalidState {
                action,
                state: self.state.phase().as_str(),
            })
        }
    }

    pub fn list_cameras(&self) -> Result<Vec<VideoDevice>, RecorderError> {
        self.backend.enumerate_video_inputs()
    }

    /// Replace the capture source with one for `device_id` (or the first
    /// camera). The previous source is released before acquiring.
    pub fn select_camera(&mut self, device_id: Option<&str>) -> Result<VideoDevice, RecorderError> {
        self.ensure_can_switch("switch camera")?;
        self.release_source();

        let constraints = CaptureConstraints::from(&self.config.capture)
            .with_device(device_id.map(str::to_string));
        match self.backend.acquire(&constraints) {
            Ok(source) => {
                let device = source.device().clone();
                log::info!(
                    "Selected camera {} ({}){}",
                    device.label,
                    device.id,
                    if source.has_audio() { "" } else { " without microphone" }
                );
                self.source = Some(source);
                Ok(device)
            }
            Err(e) => {
                log::error!("Failed to acquire camera: {}", e);
                Err(e)
            }
        }
    }

    pub fn release_camera(&mut self) -> Result<(), RecorderError> {
        self.ensure_can_switch("release camera")?;
        self.release_source();
        Ok(())
    }

    fn release_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
        }
        let next = self.state.after_source_released();
        self.commit(next);
    }

    /// Validate the form against the attached source without starting.
    pub fn arm(&mut self, form: SessionForm) -> Result<(), RecorderError> {
        let next = self.state.arm(form, self.has_source(), &self.policy())?;
        self.commit(next);
        Ok(())
    }

    /// Arm with `form` and start every track recorder.
    pub fn start_recording(&mut self, form: SessionForm) -> Result<Uuid, RecorderError> {
        let armed = self.state.arm(form, self.has_source(), &self.policy())?;
        let source = self.source.as_ref().ok_or_else(|| {
            RecorderError::CaptureUnavailable("no camera selected".to_string())
        })?;

        let tracks = source.split()?;
        let layout = if self.config.recording.split_tracks && tracks.audio.is_none() {
            log::warn!("Camera has no microphone; recording video only");
            TrackLayout::Combined
        } else {
            TrackLayout::from_split(self.config.recording.split_tracks)
        };

        let settings = EncoderSettings::from(&self.config);
        let video_format = select_format(TrackKind::Video, &self.config.recording.video_formats);
        let mut inputs: Vec<(TrackInput, Box<dyn TrackEncoder>)> =
            vec![(tracks.video.into(), create_encoder(&video_format.mime_type, &settings)?)];
        if layout == TrackLayout::Split {
            if let Some(audio) = tracks.audio {
                let audio_format =
                    select_format(TrackKind::Audio, &self.config.recording.audio_formats);
                inputs.push((audio.into(), create_encoder(&audio_format.mime_type, &settings)?));
            }
        }

        // Encoders exist before any recorder starts; starts are back to back.
        let id = Uuid::new_v4();
        let timeslice = Duration::from_millis(self.config.recording.timeslice_ms);
        let mut recorders = Vec::with_capacity(inputs.len());
        for (input, encoder) in inputs {
            // On failure the recorders already started are dropped, which
            // stops them; their completions carry a session id nobody waits on.
            recorders.push(TrackRecorder::start(id, input, encoder, timeslice, self.sink())?);
        }
        let started_at = self.clock.now();

        let next = armed.begin(id, layout, started_at)?;
        self.recorders = recorders;
        self.commit(next);
        log::info!(
            "Recording session {} started with {} track(s): {}",
            id,
            self.recorders.len(),
            self.recorders
                .iter()
                .map(|r| r.mime_type())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(id)
    }

    /// Refresh the elapsed timer. Returns true when the label changed.
    pub fn tick(&mut self) -> bool {
        match self.state.tick(self.clock.now()) {
            Some(next) => {
                self.commit(next);
                true
            }
            None => false,
        }
    }

    /// Ask every recorder to flush. The session reaches Reviewing once all
    /// of them have reported through [`handle_event`](Self::handle_event).
    pub fn stop_recording(&mut self) -> Result<(), RecorderError> {
        let next = self.state.request_stop()?;
        for recorder in self.recorders.iter_mut() {
            recorder.stop();
        }
        self.commit(next);
        Ok(())
    }

    /// Apply one encoder event.
    pub fn handle_event(&mut self, event: TrackEvent) -> Result<(), RecorderError> {
        if Some(event.session()) != self.state.session_id() {
            log::debug!("Ignoring event from stale session {}", event.session());
            return Ok(());
        }

        match event {
            TrackEvent::Data { track, bytes, .. } => {
                log::trace!("{} slice: {} bytes", track, bytes);
                Ok(())
            }
            TrackEvent::Stopped {
                session,
                track,
                outcome,
            } => match self.state.track_stopped(session, track, outcome)? {
                StopOutcome::Pending(next) => {
                    self.commit(next);
                    Ok(())
                }
                StopOutcome::Ready(next) => {
                    self.join_recorders();
                    self.commit(next);
                    Ok(())
                }
                StopOutcome::Failed { next, error } => {
                    self.join_recorders();
                    self.commit(next);
                    log::error!("Recording failed: {}", error);
                    self.last_error = Some(ErrorResponse::from(&error));
                    Err(error)
                }
            },
        }
    }

    fn join_recorders(&mut self) {
        for mut recorder in self.recorders.drain(..) {
            recorder.join();
        }
    }

    /// Persist the take under review and reset to Idle.
    ///
    /// If the store refuses the record, the take stays under review.
    pub fn save(&mut self, form: SessionForm) -> Result<ExerciseRecord, RecorderError> {
        let take = self.state.prepare_save(form, &self.policy())?;
        let now = self.clock.wall_now();
        let record = ExerciseRecord {
            id: self.store.next_id(now),
            name: take.form.label,
            kind: take.form.kind,
            created_at: now,
            duration_label: take.duration_label,
            video_payload: take.video,
            audio_payload: take.audio,
        };
        self.store.append(record.clone())?;
        self.commit(SessionState::Idle);
        log::info!("Saved exercise '{}' ({})", record.name, record.id);
        Ok(record)
    }

    pub fn discard(&mut self, confirmed: bool) -> Result<(), RecorderError> {
        let next = self.state.discard(confirmed)?;
        self.commit(next);
        log::info!("Discarded recording");
        Ok(())
    }

    /// Returns false when no record had `id`.
    pub fn delete_exercise(&mut self, id: u64, confirmed: bool) -> Result<bool, RecorderError> {
        if !confirmed {
            return Err(RecorderError::ConfirmationRequired(
                "Are you sure you want to delete this exercise?".to_string(),
            ));
        }
        self.store.remove_by_id(id)
    }

    pub fn clear_exercises(&mut self, confirmed: bool) -> Result<(), RecorderError> {
        if self.store.is_empty() {
            return Err(RecorderError::validation("No exercises to delete"));
        }
        if !confirmed {
            return Err(RecorderError::ConfirmationRequired(format!(
                "Are you sure you want to delete all {} exercises?",
                self.store.len()
            )));
        }
        self.store.clear()
    }

    /// Stop any running recorders and release the capture source.
    pub fn shutdown(&mut self) {
        for recorder in self.recorders.iter_mut() {
            recorder.stop();
        }
        self.join_recorders();
        if let Some(mut source) = self.source.take() {
            source.release();
        }
        if matches!(
            self.state.phase(),
            SessionPhase::Armed | SessionPhase::Recording | SessionPhase::Stopping
        ) {
            self.commit(SessionState::Idle);
        }
        log::info!("Recording controller shut down");
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        if self.source.is_some() || !self.recorders.is_empty() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{SyntheticBackend, SyntheticFailure};
    use crate::storage::MemoryStorage;
    use crate::testing::SyntheticProfile;
    use crate::timing::ManualClock;

    fn controller_with(backend: SyntheticBackend) -> (RecordingController, mpsc::UnboundedReceiver<TrackEvent>) {
        let store = ExerciseStore::load(Box::new(MemoryStorage::new()), "exercises").unwrap();
        RecordingController::new(
            RecorderConfig::default(),
            Arc::new(backend.with_profile(SyntheticProfile::tiny())),
            store,
            Arc::new(ManualClock::new()),
        )
    }

    #[test]
    fn test_start_requires_camera() {
        let (mut controller, _rx) = controller_with(SyntheticBackend::new());
        let err = controller
            .start_recording(SessionForm::new("Squat", None))
            .unwrap_err();
        assert!(matches!(err, RecorderError::CaptureUnavailable(_)));
        assert_eq!(controller.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_failed_acquisition_leaves_no_source() {
        let (mut controller, _rx) =
            controller_with(SyntheticBackend::new().with_failure(SyntheticFailure::PermissionDenied));
        assert!(matches!(
            controller.select_camera(None),
            Err(RecorderError::PermissionDenied(_))
        ));
        assert!(!controller.has_source());
        assert!(!controller.controls().start_enabled);
    }

    #[test]
    fn test_camera_switch_refused_while_recording() {
        let (mut controller, _rx) = controller_with(SyntheticBackend::new());
        controller.select_camera(None).unwrap();
        controller
            .start_recording(SessionForm::new("Squat", None))
            .unwrap();
        assert!(matches!(
            controller.select_camera(Some("synthetic-1")),
            Err(RecorderError::InvalidState { .. })
        ));
        assert_eq!(controller.current_device().unwrap().id, "synthetic-0");
        controller.shutdown();
    }

    #[test]
    fn test_clear_empty_library_is_validation_error() {
        let (mut controller, _rx) = controller_with(SyntheticBackend::new());
        assert!(matches!(
            controller.clear_exercises(true),
            Err(RecorderError::Validation(_))
        ));
        assert!(matches!(
            controller.delete_exercise(1, false),
            Err(RecorderError::ConfirmationRequired(_))
        ));
    }
}
