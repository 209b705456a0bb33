//! Capture sources and the backends that acquire them
//!
//! A [`CaptureSource`] is the combined live video+audio handle for one
//! device. Producers push frames into bounded channels; the session splits
//! the source into single-track sub-streams before building encoders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};

use crate::config::CaptureConfig;
use crate::errors::RecorderError;
use crate::types::{TrackKind, VideoDevice};

#[cfg(feature = "native")]
pub mod native;
pub mod synthetic;

#[cfg(feature = "native")]
pub use native::NativeBackend;
pub use synthetic::{SyntheticBackend, SyntheticFailure};

/// Frames buffered per video track before new frames are dropped.
pub const VIDEO_QUEUE_FRAMES: usize = 8;
/// Audio chunks buffered per audio track, roughly five seconds of 20ms chunks.
pub const AUDIO_QUEUE_FRAMES: usize = 256;

/// Quality hints for acquiring a capture source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConstraints {
    pub device_id: Option<String>,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub frame_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub sample_rate: u32,
    pub channels: u16,
}

impl CaptureConstraints {
    pub fn with_device(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }
}

impl From<&CaptureConfig> for CaptureConstraints {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            device_id: None,
            ideal_width: config.ideal_width,
            ideal_height: config.ideal_height,
            frame_rate: config.frame_rate,
            echo_cancellation: config.echo_cancellation,
            noise_suppression: config.noise_suppression,
            sample_rate: config.sample_rate,
            channels: config.channels,
        }
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::from(&crate::config::RecorderConfig::default().capture)
    }
}

/// RGB24 video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp in seconds
    pub timestamp: f64,
}

impl VideoFrame {
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }
}

/// Interleaved f32 PCM chunk
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Presentation timestamp in seconds
    pub timestamp: f64,
}

/// Something feeding frames into a capture source.
pub trait TrackProducer: Send {
    fn kind(&self) -> TrackKind;
    /// Stop producing and release the underlying device. Must be idempotent.
    fn stop(&mut self);
}

/// Producer backed by a dedicated thread polling a shared running flag.
pub struct ThreadProducer {
    kind: TrackKind,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadProducer {
    pub fn spawn<F>(kind: TrackKind, name: &str, body: F) -> Result<Self, RecorderError>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))?;
        Ok(Self {
            kind,
            running,
            handle: Some(handle),
        })
    }
}

impl TrackProducer for ThreadProducer {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("{} producer thread panicked", self.kind);
            }
        }
    }
}

impl Drop for ThreadProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Video-only sub-stream of a capture source
#[derive(Clone)]
pub struct VideoTrack {
    pub frames: Receiver<VideoFrame>,
}

/// Audio-only sub-stream of a capture source
#[derive(Clone)]
pub struct AudioTrack {
    pub frames: Receiver<AudioFrame>,
}

/// Result of splitting a combined source
pub struct SplitTracks {
    pub video: VideoTrack,
    pub audio: Option<AudioTrack>,
}

/// Combined live video+audio handle for one device.
///
/// Dropping the source releases it.
pub struct CaptureSource {
    device: VideoDevice,
    video: Receiver<VideoFrame>,
    audio: Option<Receiver<AudioFrame>>,
    producers: Vec<Box<dyn TrackProducer>>,
    released: bool,
}

impl CaptureSource {
    pub fn new(
        device: VideoDevice,
        video: Receiver<VideoFrame>,
        audio: Option<Receiver<AudioFrame>>,
        producers: Vec<Box<dyn TrackProducer>>,
    ) -> Self {
        Self {
            device,
            video,
            audio,
            producers,
            released: false,
        }
    }

    pub fn device(&self) -> &VideoDevice {
        &self.device
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Split into single-track sub-streams.
    ///
    /// Frames queued before the split belong to no recording and are dropped.
    pub fn split(&self) -> Result<SplitTracks, RecorderError> {
        if self.released {
            return Err(RecorderError::CaptureUnavailable(format!(
                "capture source for {} was released",
                self.device.label
            )));
        }

        let stale_video = self.video.try_iter().count();
        let stale_audio = self.audio.as_ref().map_or(0, |rx| rx.try_iter().count());
        if stale_video + stale_audio > 0 {
            log::debug!(
                "Dropped {} queued video and {} queued audio frames before split",
                stale_video,
                stale_audio
            );
        }

        Ok(SplitTracks {
            video: VideoTrack {
                frames: self.video.clone(),
            },
            audio: self.audio.as_ref().map(|rx| AudioTrack { frames: rx.clone() }),
        })
    }

    /// Stop every producer and release the device. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        for producer in self.producers.iter_mut() {
            producer.stop();
        }
        self.producers.clear();
        self.released = true;
        log::info!("Released capture source {} ({})", self.device.label, self.device.id);
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSource")
            .field("device", &self.device)
            .field("has_audio", &self.has_audio())
            .field("released", &self.released)
            .finish()
    }
}

/// Platform capture access
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &str;

    /// List available video inputs for selection.
    fn enumerate_video_inputs(&self) -> Result<Vec<VideoDevice>, RecorderError>;

    /// Acquire a combined video+audio source.
    ///
    /// Fails immediately with `CaptureUnavailable` or `PermissionDenied`;
    /// there is no retry.
    fn acquire(&self, constraints: &CaptureConstraints) -> Result<CaptureSource, RecorderError>;
}

/// Pick the requested device, or the first one when none is requested.
pub(crate) fn resolve_device(
    devices: &[VideoDevice],
    requested: Option<&str>,
) -> Result<VideoDevice, RecorderError> {
    match requested {
        Some(id) => devices.iter().find(|d| d.id == id).cloned().ok_or_else(|| {
            RecorderError::CaptureUnavailable(format!("camera '{}' not found", id))
        }),
        None => devices.first().cloned().ok_or_else(|| {
            RecorderError::CaptureUnavailable("no video input devices found".to_string())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<VideoDevice> {
        vec![
            VideoDevice::new("0", Some("Front".into()), 0),
            VideoDevice::new("1", None, 1),
        ]
    }

    #[test]
    fn test_resolve_device_defaults_to_first() {
        assert_eq!(resolve_device(&devices(), None).unwrap().id, "0");
        assert_eq!(resolve_device(&devices(), Some("1")).unwrap().label, "Camera 2");
    }

    #[test]
    fn test_resolve_device_errors() {
        assert!(matches!(
            resolve_device(&devices(), Some("9")),
            Err(RecorderError::CaptureUnavailable(_))
        ));
        assert!(matches!(
            resolve_device(&[], None),
            Err(RecorderError::CaptureUnavailable(_))
        ));
    }

    #[test]
    fn test_split_drops_stale_frames_and_release_is_idempotent() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        tx.send(VideoFrame {
            data: vec![0; 3],
            width: 1,
            height: 1,
            timestamp: 0.0,
        })
        .unwrap();

        let mut source = CaptureSource::new(devices().remove(0), rx, None, Vec::new());
        let tracks = source.split().unwrap();
        assert!(tracks.video.frames.try_recv().is_err());
        assert!(tracks.audio.is_none());

        source.release();
        source.release();
        assert!(source.is_released());
        assert!(source.split().is_err());
    }

    #[test]
    fn test_thread_producer_stops() {
        let mut producer = ThreadProducer::spawn(TrackKind::Audio, "test-producer", |running| {
            while running.load(Ordering::SeqCst) {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        })
        .unwrap();
        producer.stop();
        producer.stop();
        assert_eq!(producer.kind(), TrackKind::Audio);
    }
}
