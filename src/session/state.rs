//! Recording session state and its pure transitions
//!
//! Every transition borrows the current state and returns the next one (or
//! an error). The controller commits the returned state only on success, so
//! a rejected action leaves the session exactly where it was.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::join::{JoinProgress, TrackJoin};
use crate::errors::RecorderError;
use crate::timing::elapsed_label;
use crate::types::{ExerciseKind, MediaPayload, TrackKind};

pub const TIMER_RESET_LABEL: &str = "00:00";

/// What the user typed about the take
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionForm {
    pub label: String,
    pub kind: Option<ExerciseKind>,
}

impl SessionForm {
    pub fn new(label: impl Into<String>, kind: Option<ExerciseKind>) -> Self {
        Self {
            label: label.into(),
            kind,
        }
    }

    pub fn trimmed_label(&self) -> &str {
        self.label.trim()
    }
}

/// Rules the form must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormPolicy {
    /// Require a label before recording starts (always required to save)
    pub require_label: bool,
    /// Require a kind before recording starts and before saving
    pub require_kind: bool,
}

impl FormPolicy {
    pub fn check_before_start(&self, form: &SessionForm) -> Result<(), RecorderError> {
        if self.require_label && form.trimmed_label().is_empty() {
            return Err(RecorderError::validation("Please enter an exercise name"));
        }
        if self.require_kind && form.kind.is_none() {
            return Err(RecorderError::validation("Please select an exercise type"));
        }
        Ok(())
    }

    pub fn check_before_save(&self, form: &SessionForm) -> Result<(), RecorderError> {
        if form.trimmed_label().is_empty() {
            return Err(RecorderError::validation("Please enter an exercise name"));
        }
        if self.require_kind && form.kind.is_none() {
            return Err(RecorderError::validation("Please select an exercise type"));
        }
        Ok(())
    }
}

/// How the capture is split into encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackLayout {
    /// One video encoder, no separate audio payload
    Combined,
    /// Independent video and audio encoders joined on stop
    Split,
}

impl TrackLayout {
    pub fn from_split(split: bool) -> Self {
        if split {
            TrackLayout::Split
        } else {
            TrackLayout::Combined
        }
    }

    pub fn tracks(&self) -> Vec<TrackKind> {
        match self {
            TrackLayout::Combined => vec![TrackKind::Video],
            TrackLayout::Split => vec![TrackKind::Video, TrackKind::Audio],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Armed,
    Recording,
    Stopping,
    Reviewing,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Armed => "armed",
            SessionPhase::Recording => "recording",
            SessionPhase::Stopping => "stopping",
            SessionPhase::Reviewing => "reviewing",
        }
    }
}

/// A take whose encoders are (or were) running
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTake {
    pub id: Uuid,
    pub form: SessionForm,
    pub layout: TrackLayout,
    pub started_at: Instant,
    pub elapsed_label: String,
}

/// A flushed take awaiting save or discard
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewTake {
    pub id: Uuid,
    pub form: SessionForm,
    pub layout: TrackLayout,
    pub duration_label: String,
    pub video: MediaPayload,
    pub audio: Option<MediaPayload>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Armed {
        form: SessionForm,
    },
    Recording(ActiveTake),
    Stopping {
        take: ActiveTake,
        join: TrackJoin,
    },
    Reviewing(ReviewTake),
}

/// Result of feeding one stop completion into a stopping session
#[derive(Debug)]
pub enum StopOutcome {
    /// Other tracks are still flushing
    Pending(SessionState),
    /// Every track flushed; the take is ready for review
    Ready(SessionState),
    /// Every track signalled but at least one failed
    Failed {
        next: SessionState,
        error: RecorderError,
    },
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Armed { .. } => SessionPhase::Armed,
            SessionState::Recording(_) => SessionPhase::Recording,
            SessionState::Stopping { .. } => SessionPhase::Stopping,
            SessionState::Reviewing(_) => SessionPhase::Reviewing,
        }
    }

    fn invalid(&self, action: &'static str) -> RecorderError {
        RecorderError::InvalidState {
            action,
            state: self.phase().as_str(),
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            SessionState::Recording(take) | SessionState::Stopping { take, .. } => Some(take.id),
            SessionState::Reviewing(take) => Some(take.id),
            _ => None,
        }
    }

    pub fn form(&self) -> Option<&SessionForm> {
        match self {
            SessionState::Armed { form } => Some(form),
            SessionState::Recording(take) | SessionState::Stopping { take, .. } => Some(&take.form),
            SessionState::Reviewing(take) => Some(&take.form),
            SessionState::Idle => None,
        }
    }

    /// Label the timer shows in this state
    pub fn timer_label(&self) -> &str {
        match self {
            SessionState::Recording(take) | SessionState::Stopping { take, .. } => {
                &take.elapsed_label
            }
            SessionState::Reviewing(take) => &take.duration_label,
            _ => TIMER_RESET_LABEL,
        }
    }

    /// Video of the take under review; audio is never part of the preview.
    pub fn preview(&self) -> Option<&MediaPayload> {
        match self {
            SessionState::Reviewing(take) => Some(&take.video),
            _ => None,
        }
    }

    /// Capture sources may only be swapped while no encoder is running.
    pub fn can_switch_source(&self) -> bool {
        !matches!(
            self,
            SessionState::Recording(_) | SessionState::Stopping { .. }
        )
    }

    /// Idle/Armed → Armed, once a source is attached and the form passes.
    pub fn arm(
        &self,
        form: SessionForm,
        source_attached: bool,
        policy: &FormPolicy,
    ) -> Result<SessionState, RecorderError> {
        match self {
            SessionState::Idle | SessionState::Armed { .. } => {}
            _ => return Err(self.invalid("prepare a new recording")),
        }
        if !source_attached {
            return Err(RecorderError::CaptureUnavailable(
                "no camera selected".to_string(),
            ));
        }
        policy.check_before_start(&form)?;
        Ok(SessionState::Armed { form })
    }

    /// Armed → Recording
    pub fn begin(
        &self,
        id: Uuid,
        layout: TrackLayout,
        started_at: Instant,
    ) -> Result<SessionState, RecorderError> {
        match self {
            SessionState::Armed { form } => Ok(SessionState::Recording(ActiveTake {
                id,
                form: form.clone(),
                layout,
                started_at,
                elapsed_label: TIMER_RESET_LABEL.to_string(),
            })),
            _ => Err(self.invalid("start recording")),
        }
    }

    /// Recompute the timer while recording. `None` when nothing changes.
    pub fn tick(&self, now: Instant) -> Option<SessionState> {
        match self {
            SessionState::Recording(take) => {
                let label = elapsed_label(take.started_at, now);
                if label == take.elapsed_label {
                    return None;
                }
                Some(SessionState::Recording(ActiveTake {
                    elapsed_label: label,
                    ..take.clone()
                }))
            }
            _ => None,
        }
    }

    /// Recording → Stopping, waiting on every active track
    pub fn request_stop(&self) -> Result<SessionState, RecorderError> {
        match self {
            SessionState::Recording(take) => Ok(SessionState::Stopping {
                take: take.clone(),
                join: TrackJoin::new(take.layout.tracks()),
            }),
            _ => Err(self.invalid("stop recording")),
        }
    }

    /// Feed one track's stop completion into a stopping session.
    pub fn track_stopped(
        &self,
        session: Uuid,
        track: TrackKind,
        outcome: Result<MediaPayload, String>,
    ) -> Result<StopOutcome, RecorderError> {
        let (take, join) = match self {
            SessionState::Stopping { take, join } if take.id == session => (take, join),
            SessionState::Stopping { .. } => {
                return Err(RecorderError::validation(format!(
                    "stop signal from another session ({})",
                    session
                )))
            }
            _ => return Err(self.invalid("finish a track")),
        };

        let mut join = join.clone();
        match join.signal(track, outcome)? {
            JoinProgress::Pending(_) => Ok(StopOutcome::Pending(SessionState::Stopping {
                take: take.clone(),
                join,
            })),
            JoinProgress::Complete => match join.into_tracks() {
                Ok(tracks) => Ok(StopOutcome::Ready(SessionState::Reviewing(ReviewTake {
                    id: take.id,
                    form: take.form.clone(),
                    layout: take.layout,
                    duration_label: take.elapsed_label.clone(),
                    video: tracks.video,
                    audio: tracks.audio,
                }))),
                Err(error) => Ok(StopOutcome::Failed {
                    next: SessionState::Armed {
                        form: take.form.clone(),
                    },
                    error,
                }),
            },
        }
    }

    /// Validate a save from review, returning the take with the final form.
    pub fn prepare_save(
        &self,
        form: SessionForm,
        policy: &FormPolicy,
    ) -> Result<ReviewTake, RecorderError> {
        let take = match self {
            SessionState::Reviewing(take) => take,
            _ => return Err(self.invalid("save")),
        };
        policy.check_before_save(&form)?;
        if take.video.is_empty() {
            return Err(RecorderError::validation("No recording to save"));
        }
        if take.layout == TrackLayout::Split && take.audio.as_ref().map_or(true, |a| a.is_empty()) {
            return Err(RecorderError::validation(
                "Recording is missing its audio track",
            ));
        }
        Ok(ReviewTake {
            form: SessionForm::new(form.trimmed_label().to_string(), form.kind),
            ..take.clone()
        })
    }

    /// Reviewing → Idle without persisting
    pub fn discard(&self, confirmed: bool) -> Result<SessionState, RecorderError> {
        match self {
            SessionState::Reviewing(_) if !confirmed => Err(RecorderError::ConfirmationRequired(
                "Discard this recording?".to_string(),
            )),
            SessionState::Reviewing(_) => Ok(SessionState::Idle),
            _ => Err(self.invalid("discard")),
        }
    }

    /// State after the capture source goes away
    pub fn after_source_released(&self) -> SessionState {
        match self {
            SessionState::Armed { .. } => SessionState::Idle,
            other => other.clone(),
        }
    }
}

/// What the live view shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    None,
    Live,
    Playback,
}

/// Enablement and visibility of every control, derived from session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlState {
    pub phase: SessionPhase,
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub camera_select_enabled: bool,
    pub form_enabled: bool,
    pub save_visible: bool,
    pub discard_visible: bool,
    pub timer_visible: bool,
    pub timer_label: String,
    pub preview: PreviewMode,
}

impl ControlState {
    pub fn derive(state: &SessionState, source_attached: bool) -> Self {
        let phase = state.phase();
        let busy = matches!(phase, SessionPhase::Recording | SessionPhase::Stopping);
        let reviewing = phase == SessionPhase::Reviewing;

        let preview = if reviewing {
            PreviewMode::Playback
        } else if source_attached {
            PreviewMode::Live
        } else {
            PreviewMode::None
        };

        Self {
            phase,
            start_enabled: source_attached
                && matches!(phase, SessionPhase::Idle | SessionPhase::Armed),
            stop_enabled: phase == SessionPhase::Recording,
            camera_select_enabled: !busy,
            form_enabled: !busy,
            save_visible: reviewing,
            discard_visible: reviewing,
            timer_visible: busy,
            timer_label: state.timer_label().to_string(),
            preview,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const POLICY: FormPolicy = FormPolicy {
        require_label: true,
        require_kind: false,
    };

    fn recording(layout: TrackLayout) -> (SessionState, Instant) {
        let start = Instant::now();
        let armed = SessionState::Idle
            .arm(SessionForm::new("Squat", None), true, &POLICY)
            .unwrap();
        (armed.begin(Uuid::new_v4(), layout, start).unwrap(), start)
    }

    #[test]
    fn test_arm_requires_source_and_label() {
        let idle = SessionState::Idle;
        assert!(matches!(
            idle.arm(SessionForm::new("Squat", None), false, &POLICY),
            Err(RecorderError::CaptureUnavailable(_))
        ));
        assert!(matches!(
            idle.arm(SessionForm::new("  ", None), true, &POLICY),
            Err(RecorderError::Validation(_))
        ));
        let strict = FormPolicy {
            require_label: true,
            require_kind: true,
        };
        assert!(idle.arm(SessionForm::new("Squat", None), true, &strict).is_err());
        assert_eq!(
            idle.arm(SessionForm::new("Squat", Some(ExerciseKind::Strength)), true, &strict)
                .unwrap()
                .phase(),
            SessionPhase::Armed
        );
    }

    #[test]
    fn test_begin_only_from_armed() {
        assert!(SessionState::Idle
            .begin(Uuid::new_v4(), TrackLayout::Split, Instant::now())
            .is_err());
        let (rec, _) = recording(TrackLayout::Split);
        assert_eq!(rec.phase(), SessionPhase::Recording);
        assert_eq!(rec.timer_label(), "00:00");
        assert!(!rec.can_switch_source());
    }

    #[test]
    fn test_tick_updates_label_only_when_changed() {
        let (rec, start) = recording(TrackLayout::Split);
        assert!(rec.tick(start + Duration::from_millis(400)).is_none());
        let next = rec.tick(start + Duration::from_millis(2_100)).unwrap();
        assert_eq!(next.timer_label(), "00:02");
        assert!(SessionState::Idle.tick(start).is_none());
    }

    #[test]
    fn test_stop_waits_for_every_track() {
        let (rec, _) = recording(TrackLayout::Split);
        let id = rec.session_id().unwrap();
        let stopping = rec.request_stop().unwrap();

        let after_video = match stopping
            .track_stopped(id, TrackKind::Video, Ok(MediaPayload::new("video/x", vec![1u8])))
            .unwrap()
        {
            StopOutcome::Pending(state) => state,
            other => panic!("expected pending, got {:?}", other),
        };
        assert_eq!(after_video.phase(), SessionPhase::Stopping);
        assert!(after_video.preview().is_none());

        match after_video
            .track_stopped(id, TrackKind::Audio, Ok(MediaPayload::new("audio/wav", vec![2u8])))
            .unwrap()
        {
            StopOutcome::Ready(state) => {
                assert_eq!(state.phase(), SessionPhase::Reviewing);
                assert_eq!(state.preview().unwrap().mime_type, "video/x");
            }
            other => panic!("expected ready, got {:?}", other),
        }
    }

    #[test]
    fn test_stale_session_signal_rejected() {
        let (rec, _) = recording(TrackLayout::Combined);
        let stopping = rec.request_stop().unwrap();
        assert!(stopping
            .track_stopped(Uuid::new_v4(), TrackKind::Video, Ok(MediaPayload::new("v/x", vec![1u8])))
            .is_err());
    }

    #[test]
    fn test_failed_track_returns_to_armed() {
        let (rec, _) = recording(TrackLayout::Combined);
        let id = rec.session_id().unwrap();
        let stopping = rec.request_stop().unwrap();
        match stopping
            .track_stopped(id, TrackKind::Video, Err("encoder crashed".into()))
            .unwrap()
        {
            StopOutcome::Failed { next, error } => {
                assert_eq!(next.phase(), SessionPhase::Armed);
                assert_eq!(next.form().unwrap().label, "Squat");
                assert!(matches!(error, RecorderError::Encoding(_)));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_discard_needs_confirmation() {
        let review = SessionState::Reviewing(ReviewTake {
            id: Uuid::new_v4(),
            form: SessionForm::new("Row", None),
            layout: TrackLayout::Combined,
            duration_label: "00:04".into(),
            video: MediaPayload::new("video/x", vec![1u8]),
            audio: None,
        });
        assert!(matches!(
            review.discard(false),
            Err(RecorderError::ConfirmationRequired(_))
        ));
        assert_eq!(review.discard(true).unwrap(), SessionState::Idle);
        assert!(SessionState::Idle.discard(true).is_err());
    }

    #[test]
    fn test_split_save_needs_audio() {
        let review = SessionState::Reviewing(ReviewTake {
            id: Uuid::new_v4(),
            form: SessionForm::new("Row", None),
            layout: TrackLayout::Split,
            duration_label: "00:04".into(),
            video: MediaPayload::new("video/x", vec![1u8]),
            audio: None,
        });
        assert!(review
            .prepare_save(SessionForm::new("Row", None), &POLICY)
            .is_err());
    }

    #[test]
    fn test_save_trims_edited_label() {
        let review = SessionState::Reviewing(ReviewTake {
            id: Uuid::new_v4(),
            form: SessionForm::new("Row", None),
            layout: TrackLayout::Combined,
            duration_label: "00:04".into(),
            video: MediaPayload::new("video/x", vec![1u8]),
            audio: None,
        });
        let take = review
            .prepare_save(
                SessionForm::new("  Bent row ", Some(ExerciseKind::Strength)),
                &POLICY,
            )
            .unwrap();
        assert_eq!(take.form.label, "Bent row");
        assert_eq!(take.form.kind, Some(ExerciseKind::Strength));
        assert!(review.prepare_save(SessionForm::new(" ", None), &POLICY).is_err());
    }

    #[test]
    fn test_controls_derived_from_state() {
        let idle = ControlState::derive(&SessionState::Idle, true);
        assert!(idle.start_enabled);
        assert!(!idle.stop_enabled);
        assert!(idle.camera_select_enabled);
        assert_eq!(idle.timer_label, "00:00");
        assert_eq!(idle.preview, PreviewMode::Live);

        let no_camera = ControlState::derive(&SessionState::Idle, false);
        assert!(!no_camera.start_enabled);
        assert_eq!(no_camera.preview, PreviewMode::None);

        let (rec, _) = recording(TrackLayout::Split);
        let busy = ControlState::derive(&rec, true);
        assert!(!busy.start_enabled);
        assert!(busy.stop_enabled);
        assert!(!busy.camera_select_enabled);
        assert!(!busy.form_enabled);
        assert!(busy.timer_visible);

        let stopping = ControlState::derive(&rec.request_stop().unwrap(), true);
        assert!(!stopping.stop_enabled);
        assert!(!stopping.save_visible);
    }
}
