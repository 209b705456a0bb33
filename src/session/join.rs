//! Completion join for independently stopping tracks
//!
//! A take is only usable once every active track has reported its own stop
//! completion. `TrackJoin` counts those signals, ignores repeats, and
//! refuses signals from tracks that were never started.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::RecorderError;
use crate::types::{MediaPayload, TrackKind};

#[derive(Debug, Clone, PartialEq)]
pub enum JoinProgress {
    /// Still waiting on this many tracks
    Pending(usize),
    /// Every track has signalled
    Complete,
}

/// Payloads of a completed take
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTracks {
    pub video: MediaPayload,
    pub audio: Option<MediaPayload>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackJoin {
    expected: BTreeSet<TrackKind>,
    completed: BTreeMap<TrackKind, MediaPayload>,
    failed: BTreeMap<TrackKind, String>,
}

impl TrackJoin {
    pub fn new(tracks: impl IntoIterator<Item = TrackKind>) -> Self {
        Self {
            expected: tracks.into_iter().collect(),
            completed: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected.len()
    }

    pub fn signalled(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.signalled() == self.expected()
    }

    pub fn has_signalled(&self, track: TrackKind) -> bool {
        self.completed.contains_key(&track) || self.failed.contains_key(&track)
    }

    /// Failures reported so far, in track order
    pub fn failures(&self) -> Vec<(TrackKind, String)> {
        self.failed.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    /// Record one track's stop completion.
    pub fn signal(
        &mut self,
        track: TrackKind,
        outcome: Result<MediaPayload, String>,
    ) -> Result<JoinProgress, RecorderError> {
        if !self.expected.contains(&track) {
            return Err(RecorderError::validation(format!(
                "{} track was not part of this recording",
                track
            )));
        }

        if self.has_signalled(track) {
            log::warn!("Ignoring repeated stop signal from {} track", track);
        } else {
            match outcome {
                Ok(payload) => {
                    self.completed.insert(track, payload);
                }
                Err(reason) => {
                    self.failed.insert(track, reason);
                }
            }
        }

        let remaining = self.expected() - self.signalled();
        log::debug!(
            "{} track stopped; {}/{} tracks done",
            track,
            self.signalled(),
            self.expected()
        );
        Ok(if remaining == 0 {
            JoinProgress::Complete
        } else {
            JoinProgress::Pending(remaining)
        })
    }

    /// Take the joined payloads. Only valid once complete without failures.
    pub fn into_tracks(mut self) -> Result<JoinedTracks, RecorderError> {
        if !self.is_complete() {
            return Err(RecorderError::InvalidState {
                action: "read the recording",
                state: "tracks are still flushing",
            });
        }
        if let Some((track, reason)) = self.failed.iter().next() {
            return Err(RecorderError::encoding(format!("{} track failed: {}", track, reason)));
        }
        let video = self
            .completed
            .remove(&TrackKind::Video)
            .ok_or_else(|| RecorderError::encoding("recording has no video track"))?;
        let audio = self.completed.remove(&TrackKind::Audio);
        Ok(JoinedTracks { video, audio })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(mime: &str) -> MediaPayload {
        MediaPayload::new(mime, vec![1u8])
    }

    #[test]
    fn test_counts_to_expected() {
        let mut join = TrackJoin::new([TrackKind::Video, TrackKind::Audio]);
        assert_eq!(
            join.signal(TrackKind::Audio, Ok(payload("audio/wav"))).unwrap(),
            JoinProgress::Pending(1)
        );
        assert!(!join.is_complete());
        assert!(join.clone().into_tracks().is_err());

        assert_eq!(
            join.signal(TrackKind::Video, Ok(payload("video/x-motion-jpeg"))).unwrap(),
            JoinProgress::Complete
        );
        let tracks = join.into_tracks().unwrap();
        assert_eq!(tracks.video.mime_type, "video/x-motion-jpeg");
        assert_eq!(tracks.audio.unwrap().mime_type, "audio/wav");
    }

    #[test]
    fn test_repeated_signal_not_counted_twice() {
        let mut join = TrackJoin::new([TrackKind::Video, TrackKind::Audio]);
        join.signal(TrackKind::Video, Ok(payload("video/a"))).unwrap();
        assert_eq!(
            join.signal(TrackKind::Video, Ok(payload("video/b"))).unwrap(),
            JoinProgress::Pending(1)
        );
        assert_eq!(join.signalled(), 1);
    }

    #[test]
    fn test_unknown_track_rejected() {
        let mut join = TrackJoin::new([TrackKind::Video]);
        assert!(join.signal(TrackKind::Audio, Ok(payload("audio/wav"))).is_err());
        assert_eq!(join.signalled(), 0);
    }

    #[test]
    fn test_failure_completes_but_yields_error() {
        let mut join = TrackJoin::new([TrackKind::Video, TrackKind::Audio]);
        join.signal(TrackKind::Audio, Err("device lost".into())).unwrap();
        join.signal(TrackKind::Video, Ok(payload("video/a"))).unwrap();
        assert!(join.is_complete());
        assert_eq!(join.failures().len(), 1);
        assert!(matches!(join.into_tracks(), Err(RecorderError::Encoding(_))));
    }
}
