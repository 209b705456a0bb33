//! Synthetic capture backend
//!
//! Generates gradient video and a sine tone on producer threads that share
//! one presentation clock. Useful offline and in tests, and able to simulate
//! the two acquisition failures a real device can produce.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;

use super::{
    resolve_device, CaptureBackend, CaptureConstraints, CaptureSource, ThreadProducer,
    TrackProducer, AUDIO_QUEUE_FRAMES, VIDEO_QUEUE_FRAMES,
};
use crate::errors::RecorderError;
use crate::testing::{synthetic_audio_frame, synthetic_video_frame, SyntheticProfile};
use crate::timing::PTSClock;
use crate::types::{TrackKind, VideoDevice};

/// Failure to simulate on the next acquisitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticFailure {
    NoDevices,
    PermissionDenied,
}

pub struct SyntheticBackend {
    devices: Vec<VideoDevice>,
    profile: Option<SyntheticProfile>,
    with_audio: bool,
    failure: Option<SyntheticFailure>,
    live_sources: Arc<AtomicUsize>,
    acquisitions: Arc<AtomicUsize>,
}

impl SyntheticBackend {
    /// Two synthetic cameras with microphones, honouring requested constraints
    pub fn new() -> Self {
        Self {
            devices: vec![
                VideoDevice::new("synthetic-0", Some("Synthetic Camera".to_string()), 0),
                VideoDevice::new("synthetic-1", None, 1),
            ],
            profile: None,
            with_audio: true,
            failure: None,
            live_sources: Arc::new(AtomicUsize::new(0)),
            acquisitions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Override the generated frame shape instead of following constraints
    pub fn with_profile(mut self, profile: SyntheticProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.with_audio = false;
        self
    }

    pub fn with_failure(mut self, failure: SyntheticFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Sources acquired and not yet released
    pub fn live_sources(&self) -> usize {
        self.live_sources.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    fn profile_for(&self, constraints: &CaptureConstraints) -> SyntheticProfile {
        self.profile.unwrap_or(SyntheticProfile {
            width: constraints.ideal_width,
            height: constraints.ideal_height,
            frame_rate: constraints.frame_rate,
            sample_rate: constraints.sample_rate,
            channels: constraints.channels,
            ..SyntheticProfile::default()
        })
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks how many sources are held at once.
struct Lease {
    live: Arc<AtomicUsize>,
    held: bool,
}

impl TrackProducer for Lease {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn stop(&mut self) {
        if self.held {
            self.held = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.stop();
    }
}

impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn enumerate_video_inputs(&self) -> Result<Vec<VideoDevice>, RecorderError> {
        if self.failure == Some(SyntheticFailure::NoDevices) {
            return Ok(Vec::new());
        }
        Ok(self.devices.clone())
    }

    fn acquire(&self, constraints: &CaptureConstraints) -> Result<CaptureSource, RecorderError> {
        match self.failure {
            Some(SyntheticFailure::PermissionDenied) => {
                return Err(RecorderError::PermissionDenied(
                    "synthetic device refused access".to_string(),
                ))
            }
            Some(SyntheticFailure::NoDevices) => {
                return Err(RecorderError::CaptureUnavailable(
                    "no video input devices found".to_string(),
                ))
            }
            None => {}
        }

        let device = resolve_device(&self.devices, constraints.device_id.as_deref())?;
        let profile = self.profile_for(constraints);
        let clock = PTSClock::new();
        let mut producers: Vec<Box<dyn TrackProducer>> = Vec::new();

        self.live_sources.fetch_add(1, Ordering::SeqCst);
        producers.push(Box::new(Lease {
            live: self.live_sources.clone(),
            held: true,
        }));

        let (video_tx, video_rx) = bounded(VIDEO_QUEUE_FRAMES);
        let video_clock = clock.clone();
        let frame_interval = Duration::from_secs_f64(1.0 / profile.frame_rate.max(1) as f64);
        producers.push(Box::new(ThreadProducer::spawn(
            TrackKind::Video,
            "synthetic-video",
            move |running: Arc<AtomicBool>| {
                let mut frame_number = 0u64;
                while running.load(Ordering::SeqCst) {
                    let frame = synthetic_video_frame(
                        frame_number,
                        profile.width,
                        profile.height,
                        video_clock.pts(),
                    );
                    // Full queue means nobody is consuming; drop the frame.
                    let _ = video_tx.try_send(frame);
                    frame_number += 1;
                    std::thread::sleep(frame_interval);
                }
            },
        )?));

        let audio_rx = if self.with_audio {
            let (audio_tx, audio_rx) = bounded(AUDIO_QUEUE_FRAMES);
            let audio_clock = clock.clone();
            let chunk = Duration::from_millis(profile.audio_chunk_ms as u64);
            producers.push(Box::new(ThreadProducer::spawn(
                TrackKind::Audio,
                "synthetic-audio",
                move |running: Arc<AtomicBool>| {
                    let mut chunk_number = 0u64;
                    while running.load(Ordering::SeqCst) {
                        let mut frame = synthetic_audio_frame(
                            chunk_number,
                            profile.samples_per_chunk(),
                            profile.sample_rate,
                            profile.channels,
                        );
                        frame.timestamp = audio_clock.pts();
                        let _ = audio_tx.try_send(frame);
                        chunk_number += 1;
                        std::thread::sleep(chunk);
                    }
                },
            )?));
            Some(audio_rx)
        } else {
            None
        };

        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        log::info!(
            "Acquired synthetic source {} at {}x{}@{} (audio: {})",
            device.id,
            profile.width,
            profile.height,
            profile.frame_rate,
            self.with_audio
        );

        Ok(CaptureSource::new(device, video_rx, audio_rx, producers))
    }
}
