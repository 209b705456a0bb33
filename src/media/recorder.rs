//! Time-sliced track recorder
//!
//! Each recorder owns one encoder on a dedicated thread. Output is collected
//! every timeslice; on stop the worker drains queued input, flushes, and
//! reports one payload through the event sink. Completion is only ever
//! signalled through the sink, never by the `stop` call itself.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use uuid::Uuid;

use super::encoder::{EncoderInput, TrackEncoder};
use crate::capture::{AudioFrame, AudioTrack, VideoFrame, VideoTrack};
use crate::errors::RecorderError;
use crate::types::{MediaPayload, TrackKind};

/// Notification from a running recorder
#[derive(Debug, Clone)]
pub enum TrackEvent {
    /// A non-empty slice was collected
    Data {
        session: Uuid,
        track: TrackKind,
        bytes: usize,
    },
    /// The recorder flushed and exited
    Stopped {
        session: Uuid,
        track: TrackKind,
        outcome: Result<MediaPayload, String>,
    },
}

impl TrackEvent {
    pub fn session(&self) -> Uuid {
        match self {
            TrackEvent::Data { session, .. } | TrackEvent::Stopped { session, .. } => *session,
        }
    }
}

pub type EventSink = Arc<dyn Fn(TrackEvent) + Send + Sync>;

/// Single-track input for a recorder
pub enum TrackInput {
    Video(Receiver<VideoFrame>),
    Audio(Receiver<AudioFrame>),
}

impl From<VideoTrack> for TrackInput {
    fn from(track: VideoTrack) -> Self {
        TrackInput::Video(track.frames)
    }
}

impl From<AudioTrack> for TrackInput {
    fn from(track: AudioTrack) -> Self {
        TrackInput::Audio(track.frames)
    }
}

impl TrackInput {
    pub fn track(&self) -> TrackKind {
        match self {
            TrackInput::Video(_) => TrackKind::Video,
            TrackInput::Audio(_) => TrackKind::Audio,
        }
    }
}

enum OwnedFrame {
    Video(VideoFrame),
    Audio(AudioFrame),
}

impl OwnedFrame {
    fn as_input(&self) -> EncoderInput<'_> {
        match self {
            OwnedFrame::Video(frame) => EncoderInput::Video(frame),
            OwnedFrame::Audio(frame) => EncoderInput::Audio(frame),
        }
    }
}

enum Wake {
    Frame(OwnedFrame),
    InputEnded,
    Timeout,
    Stop,
}

/// Input side of the worker; becomes `Ended` once the producer goes away.
enum Feed {
    Live(TrackInput),
    Ended,
}

impl Feed {
    fn wait(&self, stop: &Receiver<()>, timeout: Duration) -> Wake {
        use crossbeam_channel::select;
        match self {
            Feed::Live(TrackInput::Video(rx)) => select! {
                recv(rx) -> msg => msg.map_or(Wake::InputEnded, |f| Wake::Frame(OwnedFrame::Video(f))),
                recv(stop) -> _ => Wake::Stop,
                default(timeout) => Wake::Timeout,
            },
            Feed::Live(TrackInput::Audio(rx)) => select! {
                recv(rx) -> msg => msg.map_or(Wake::InputEnded, |f| Wake::Frame(OwnedFrame::Audio(f))),
                recv(stop) -> _ => Wake::Stop,
                default(timeout) => Wake::Timeout,
            },
            Feed::Ended => select! {
                recv(stop) -> _ => Wake::Stop,
                default(timeout) => Wake::Timeout,
            },
        }
    }

    fn drain(&self) -> Vec<OwnedFrame> {
        match self {
            Feed::Live(TrackInput::Video(rx)) => rx.try_iter().map(OwnedFrame::Video).collect(),
            Feed::Live(TrackInput::Audio(rx)) => rx.try_iter().map(OwnedFrame::Audio).collect(),
            Feed::Ended => Vec::new(),
        }
    }
}

pub struct TrackRecorder {
    session: Uuid,
    track: TrackKind,
    mime_type: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TrackRecorder {
    /// Start recording `input` with `encoder`, collecting output every `timeslice`.
    pub fn start(
        session: Uuid,
        input: TrackInput,
        encoder: Box<dyn TrackEncoder>,
        timeslice: Duration,
        sink: EventSink,
    ) -> Result<Self, RecorderError> {
        let track = input.track();
        if encoder.track() != track {
            return Err(RecorderError::encoding(format!(
                "{} encoder cannot record a {} track",
                encoder.track(),
                track
            )));
        }
        let mime_type = encoder.mime_type().to_string();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let worker = Worker {
            session,
            track,
            mime_type: mime_type.clone(),
            timeslice,
            sink,
        };
        let handle = std::thread::Builder::new()
            .name(format!("{}-recorder", track))
            .spawn(move || worker.run(Feed::Live(input), encoder, stop_rx))?;

        log::debug!("Started {} recorder ({}) for session {}", track, mime_type, session);
        Ok(Self {
            session,
            track,
            mime_type,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn track(&self) -> TrackKind {
        self.track
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Ask the worker to flush. Returns immediately; completion arrives as
    /// `TrackEvent::Stopped`. Idempotent.
    pub fn stop(&mut self) {
        // Disconnecting the channel wakes the worker.
        self.stop_tx.take();
    }

    /// Wait for the worker thread to exit.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{} recorder thread panicked", self.track);
            }
        }
    }
}

impl Drop for TrackRecorder {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

/// Sends the track's `Stopped` event exactly once. If the worker unwinds
/// before completing, the drop reports a failed track so the join still
/// resolves.
struct Completion {
    session: Uuid,
    track: TrackKind,
    sink: EventSink,
    sent: bool,
}

impl Completion {
    fn send(&mut self, outcome: Result<MediaPayload, String>) {
        self.sent = true;
        (self.sink)(TrackEvent::Stopped {
            session: self.session,
            track: self.track,
            outcome,
        });
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.sent {
            log::error!("{} recorder thread panicked before flushing", self.track);
            self.send(Err(format!("{} recorder thread panicked", self.track)));
        }
    }
}

struct Worker {
    session: Uuid,
    track: TrackKind,
    mime_type: String,
    timeslice: Duration,
    sink: EventSink,
}

impl Worker {
    fn run(self, mut feed: Feed, mut encoder: Box<dyn TrackEncoder>, stop: Receiver<()>) {
        let mut completion = Completion {
            session: self.session,
            track: self.track,
            sink: self.sink.clone(),
            sent: false,
        };
        let mut slices: Vec<Bytes> = Vec::new();
        let mut failure: Option<String> = None;
        let mut next_slice = Instant::now() + self.timeslice;

        loop {
            let wait = next_slice.saturating_duration_since(Instant::now());
            match feed.wait(&stop, wait) {
                Wake::Frame(frame) => self.encode(&mut encoder, &frame, &mut failure),
                Wake::InputEnded => {
                    log::warn!("{} input ended before stop", self.track);
                    feed = Feed::Ended;
                }
                Wake::Timeout => {}
                Wake::Stop => break,
            }

            let now = Instant::now();
            if now >= next_slice {
                self.collect_slice(&mut encoder, &mut slices, &mut failure);
                next_slice += self.timeslice;
                if next_slice <= now {
                    next_slice = now + self.timeslice;
                }
            }
        }

        for frame in feed.drain() {
            self.encode(&mut encoder, &frame, &mut failure);
        }
        self.collect_slice(&mut encoder, &mut slices, &mut failure);

        let outcome = match failure {
            Some(reason) => Err(reason),
            None => encoder
                .finish(slices)
                .map(|data| MediaPayload::new(self.mime_type.clone(), data))
                .map_err(|e| e.to_string()),
        };
        match &outcome {
            Ok(payload) => log::info!(
                "{} track flushed: {} bytes of {}",
                self.track,
                payload.len(),
                payload.mime_type
            ),
            Err(reason) => log::error!("{} track failed: {}", self.track, reason),
        }

        completion.send(outcome);
    }

    fn encode(&self, encoder: &mut Box<dyn TrackEncoder>, frame: &OwnedFrame, failure: &mut Option<String>) {
        if failure.is_some() {
            return;
        }
        if let Err(e) = encoder.encode(frame.as_input()) {
            log::error!("{} encoder error: {}", self.track, e);
            *failure = Some(e.to_string());
        }
    }

    fn collect_slice(
        &self,
        encoder: &mut Box<dyn TrackEncoder>,
        slices: &mut Vec<Bytes>,
        failure: &mut Option<String>,
    ) {
        if failure.is_some() {
            return;
        }
        match encoder.take_slice() {
            Ok(slice) if slice.is_empty() => {}
            Ok(slice) => {
                let bytes = slice.len();
                slices.push(Bytes::from(slice));
                (self.sink)(TrackEvent::Data {
                    session: self.session,
                    track: self.track,
                    bytes,
                });
            }
            Err(e) => {
                log::error!("{} slice collection failed: {}", self.track, e);
                *failure = Some(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::encoder::{create_encoder, EncoderSettings};
    use crate::media::format;
    use crate::testing::{synthetic_audio_frame, synthetic_video_frame};
    use std::sync::Mutex;

    fn collecting_sink() -> (EventSink, Arc<Mutex<Vec<TrackEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let store = events.clone();
        let sink: EventSink = Arc::new(move |event| store.lock().unwrap().push(event));
        (sink, events)
    }

    fn wait_for_stop(events: &Arc<Mutex<Vec<TrackEvent>>>) -> TrackEvent {
        for _ in 0..200 {
            if let Some(event) = events
                .lock()
                .unwrap()
                .iter()
                .find(|e| matches!(e, TrackEvent::Stopped { .. }))
            {
                return event.clone();
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("recorder never stopped");
    }

    #[test]
    fn test_video_recorder_flushes_payload() {
        let (tx, rx) = crossbeam_channel::bounded(16);
        let (sink, events) = collecting_sink();
        let session = Uuid::new_v4();
        let encoder = create_encoder(format::MOTION_JPEG, &EncoderSettings::default()).unwrap();
        let mut recorder = TrackRecorder::start(
            session,
            TrackInput::Video(rx),
            encoder,
            Duration::from_millis(20),
            sink,
        )
        .unwrap();

        for n in 0..5 {
            tx.send(synthetic_video_frame(n, 16, 16, n as f64 / 30.0)).unwrap();
            std::thread::sleep(Duration::from_millis(15));
        }
        recorder.stop();

        match wait_for_stop(&events) {
            TrackEvent::Stopped {
                session: s,
                track,
                outcome,
            } => {
                assert_eq!(s, session);
                assert_eq!(track, TrackKind::Video);
                let payload = outcome.unwrap();
                assert_eq!(payload.mime_type, format::MOTION_JPEG);
                let frames = payload.data.windows(2).filter(|w| *w == [0xFF, 0xD8]).count();
                assert!(frames >= 5, "expected 5 JPEG frames, found {}", frames);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let data_events = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, TrackEvent::Data { bytes, .. } if *bytes > 0))
            .count();
        assert!(data_events >= 1);
    }

    #[test]
    fn test_stop_drains_queued_frames() {
        let (tx, rx) = crossbeam_channel::bounded(16);
        let (sink, events) = collecting_sink();
        let encoder = create_encoder(format::WAV, &EncoderSettings::default()).unwrap();
        let mut recorder = TrackRecorder::start(
            Uuid::new_v4(),
            TrackInput::Audio(rx),
            encoder,
            Duration::from_secs(10),
            sink,
        )
        .unwrap();

        for n in 0..3 {
            tx.send(synthetic_audio_frame(n, 100, 44100, 1)).unwrap();
        }
        recorder.stop();
        recorder.join();

        match wait_for_stop(&events) {
            TrackEvent::Stopped { outcome, .. } => {
                let payload = outcome.unwrap();
                // 44-byte header plus 300 16-bit samples
                assert_eq!(payload.len(), 44 + 600);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_encoder_rejected() {
        let (_tx, rx) = crossbeam_channel::bounded::<VideoFrame>(1);
        let (sink, _) = collecting_sink();
        let encoder = create_encoder(format::WAV, &EncoderSettings::default()).unwrap();
        let result = TrackRecorder::start(
            Uuid::new_v4(),
            TrackInput::Video(rx),
            encoder,
            Duration::from_millis(100),
            sink,
        );
        assert!(result.is_err());
    }

    struct PanickingEncoder;

    impl TrackEncoder for PanickingEncoder {
        fn track(&self) -> TrackKind {
            TrackKind::Video
        }

        fn mime_type(&self) -> &str {
            format::MOTION_JPEG
        }

        fn encode(&mut self, _input: EncoderInput<'_>) -> Result<(), RecorderError> {
            panic!("encoder blew up");
        }

        fn take_slice(&mut self) -> Result<Vec<u8>, RecorderError> {
            Ok(Vec::new())
        }

        fn finish(self: Box<Self>, _slices: Vec<Bytes>) -> Result<Bytes, RecorderError> {
            Ok(Bytes::new())
        }
    }

    #[test]
    fn test_encoder_panic_reports_failed_track() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let (sink, events) = collecting_sink();
        let session = Uuid::new_v4();
        let mut recorder = TrackRecorder::start(
            session,
            TrackInput::Video(rx),
            Box::new(PanickingEncoder),
            Duration::from_millis(20),
            sink,
        )
        .unwrap();
        tx.send(synthetic_video_frame(0, 8, 8, 0.0)).unwrap();
        recorder.stop();
        recorder.join();

        let stopped: Vec<TrackEvent> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, TrackEvent::Stopped { .. }))
            .cloned()
            .collect();
        assert_eq!(stopped.len(), 1);
        match &stopped[0] {
            TrackEvent::Stopped {
                session: s,
                track,
                outcome,
            } => {
                assert_eq!(*s, session);
                assert_eq!(*track, TrackKind::Video);
                assert!(outcome.as_ref().unwrap_err().contains("panicked"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_producer_gone_still_completes_on_stop() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let (sink, events) = collecting_sink();
        let encoder = create_encoder(format::MOTION_JPEG, &EncoderSettings::default()).unwrap();
        let mut recorder = TrackRecorder::start(
            Uuid::new_v4(),
            TrackInput::Video(rx),
            encoder,
            Duration::from_millis(10),
            sink,
        )
        .unwrap();
        tx.send(synthetic_video_frame(0, 8, 8, 0.0)).unwrap();
        drop(tx);
        std::thread::sleep(Duration::from_millis(30));
        recorder.stop();

        assert!(matches!(
            wait_for_stop(&events),
            TrackEvent::Stopped { outcome: Ok(_), .. }
        ));
    }
}
