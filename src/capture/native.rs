//! Native capture: cameras through nokhwa, microphones through cpal.

use std::sync::{Arc, Mutex};

use crossbeam_channel::bounded;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::CallbackCamera;

use super::{
    resolve_device, CaptureBackend, CaptureConstraints, CaptureSource, TrackProducer,
    VideoFrame, VIDEO_QUEUE_FRAMES,
};
use crate::errors::RecorderError;
use crate::timing::PTSClock;
use crate::types::{TrackKind, VideoDevice};

#[derive(Debug, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

fn map_camera_error(err: nokhwa::NokhwaError) -> RecorderError {
    let text = err.to_string();
    if text.to_lowercase().contains("permission") {
        RecorderError::PermissionDenied(text)
    } else {
        RecorderError::CaptureUnavailable(text)
    }
}

/// Streaming nokhwa camera
struct CameraProducer {
    camera: Arc<Mutex<CallbackCamera>>,
    stopped: bool,
}

// CallbackCamera is only touched behind the mutex, from whichever thread owns the producer.
unsafe impl Send for CameraProducer {}

impl TrackProducer for CameraProducer {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        match self.camera.lock() {
            Ok(mut camera) => {
                if let Err(e) = camera.stop_stream() {
                    log::warn!("Failed to stop camera stream: {}", e);
                }
            }
            Err(_) => log::warn!("Camera lock poisoned while stopping stream"),
        }
    }
}

impl Drop for CameraProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl CaptureBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn enumerate_video_inputs(&self) -> Result<Vec<VideoDevice>, RecorderError> {
        let cameras = nokhwa::query(ApiBackend::Auto).map_err(map_camera_error)?;
        Ok(cameras
            .iter()
            .enumerate()
            .map(|(position, info)| {
                VideoDevice::new(info.index().to_string(), Some(info.human_name()), position)
            })
            .collect())
    }

    fn acquire(&self, constraints: &CaptureConstraints) -> Result<CaptureSource, RecorderError> {
        let devices = self.enumerate_video_inputs()?;
        let device = resolve_device(&devices, constraints.device_id.as_deref())?;
        let index = device.id.parse::<u32>().map(CameraIndex::Index).unwrap_or_else(|_| {
            CameraIndex::String(device.id.clone())
        });

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(constraints.ideal_width, constraints.ideal_height),
                FrameFormat::MJPEG,
                constraints.frame_rate,
            ),
        ));

        let clock = PTSClock::new();
        let (video_tx, video_rx) = bounded(VIDEO_QUEUE_FRAMES);
        let frame_clock = clock.clone();
        let mut camera = CallbackCamera::new(index, requested, move |buffer| {
            match buffer.decode_image::<RgbFormat>() {
                Ok(image) => {
                    let frame = VideoFrame {
                        width: image.width(),
                        height: image.height(),
                        data: image.into_raw(),
                        timestamp: frame_clock.pts(),
                    };
                    let _ = video_tx.try_send(frame);
                }
                Err(e) => log::debug!("Dropping undecodable camera frame: {}", e),
            }
        })
        .map_err(map_camera_error)?;
        camera.open_stream().map_err(map_camera_error)?;

        let mut producers: Vec<Box<dyn TrackProducer>> = vec![Box::new(CameraProducer {
            camera: Arc::new(Mutex::new(camera)),
            stopped: false,
        })];

        let audio_rx = open_microphone(constraints, &clock, &mut producers)?;

        log::info!(
            "Acquired camera {} ({}) with ideal {}x{}@{}",
            device.label,
            device.id,
            constraints.ideal_width,
            constraints.ideal_height,
            constraints.frame_rate
        );
        Ok(CaptureSource::new(device, video_rx, audio_rx, producers))
    }
}

#[cfg(feature = "audio")]
fn open_microphone(
    constraints: &CaptureConstraints,
    clock: &PTSClock,
    producers: &mut Vec<Box<dyn TrackProducer>>,
) -> Result<Option<crossbeam_channel::Receiver<super::AudioFrame>>, RecorderError> {
    let (producer, rx) = microphone::start(constraints, clock.clone())?;
    producers.push(Box::new(producer));
    Ok(Some(rx))
}

#[cfg(not(feature = "audio"))]
fn open_microphone(
    _constraints: &CaptureConstraints,
    _clock: &PTSClock,
    _producers: &mut Vec<Box<dyn TrackProducer>>,
) -> Result<Option<crossbeam_channel::Receiver<super::AudioFrame>>, RecorderError> {
    log::warn!("Built without the audio feature; capturing video only");
    Ok(None)
}

#[cfg(feature = "audio")]
mod microphone {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::StreamConfig;
    use crossbeam_channel::{bounded, Receiver};

    use crate::capture::{AudioFrame, CaptureConstraints, ThreadProducer, AUDIO_QUEUE_FRAMES};
    use crate::errors::RecorderError;
    use crate::timing::PTSClock;
    use crate::types::TrackKind;

    /// Open the default input on a dedicated thread that owns the cpal stream.
    ///
    /// The stream is built on that thread, so the handle itself never has to
    /// cross threads. Build errors are reported back before returning.
    pub(super) fn start(
        constraints: &CaptureConstraints,
        clock: PTSClock,
    ) -> Result<(ThreadProducer, Receiver<AudioFrame>), RecorderError> {
        if constraints.echo_cancellation || constraints.noise_suppression {
            log::debug!("Echo cancellation and noise suppression are not available through cpal; capturing raw input");
        }

        let (frame_tx, frame_rx) = bounded(AUDIO_QUEUE_FRAMES);
        let (ready_tx, ready_rx) = bounded::<Result<(), RecorderError>>(1);
        let requested_rate = constraints.sample_rate;
        let requested_channels = constraints.channels;

        let producer = ThreadProducer::spawn(
            TrackKind::Audio,
            "microphone",
            move |running: Arc<AtomicBool>| {
                let host = cpal::default_host();
                let device = match host.default_input_device() {
                    Some(device) => device,
                    None => {
                        let _ = ready_tx.send(Err(RecorderError::CaptureUnavailable(
                            "no audio input device found".to_string(),
                        )));
                        return;
                    }
                };

                let config = StreamConfig {
                    channels: requested_channels,
                    sample_rate: cpal::SampleRate(requested_rate),
                    buffer_size: cpal::BufferSize::Default,
                };
                let stream_running = running.clone();
                let stream = device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if !stream_running.load(Ordering::Relaxed) {
                            return;
                        }
                        let frame = AudioFrame {
                            samples: data.to_vec(),
                            sample_rate: requested_rate,
                            channels: requested_channels,
                            timestamp: clock.pts(),
                        };
                        let _ = frame_tx.try_send(frame);
                    },
                    move |err| log::error!("Audio capture error: {}", err),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(map_stream_error(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(map_stream_error(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while running.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(20));
                }
                if let Err(e) = stream.pause() {
                    log::debug!("Failed to pause audio stream: {}", e);
                }
            },
        )?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok((producer, frame_rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RecorderError::CaptureUnavailable(
                "audio input did not start".to_string(),
            )),
        }
    }

    fn map_stream_error(text: String) -> RecorderError {
        if text.to_lowercase().contains("permission") {
            RecorderError::PermissionDenied(text)
        } else {
            RecorderError::CaptureUnavailable(text)
        }
    }
}
