//! Track encoders
//!
//! An encoder consumes frames of one track and hands its output over in
//! slices. At stop the recorder gives every slice back so the encoder can
//! assemble one payload (some containers need a header that is only known
//! at the end).

use bytes::Bytes;

use super::format;
use super::mjpeg::MotionJpegEncoder;
use super::wav::WavEncoder;
use crate::capture::{AudioFrame, VideoFrame};
use crate::config::RecorderConfig;
use crate::errors::RecorderError;
use crate::types::TrackKind;

/// One unit of encoder input
#[derive(Debug, Clone, Copy)]
pub enum EncoderInput<'a> {
    Video(&'a VideoFrame),
    Audio(&'a AudioFrame),
}

impl EncoderInput<'_> {
    pub fn track(&self) -> TrackKind {
        match self {
            EncoderInput::Video(_) => TrackKind::Video,
            EncoderInput::Audio(_) => TrackKind::Audio,
        }
    }
}

pub trait TrackEncoder: Send {
    fn track(&self) -> TrackKind;

    fn mime_type(&self) -> &str;

    fn encode(&mut self, input: EncoderInput<'_>) -> Result<(), RecorderError>;

    /// Output produced since the previous call; empty when there is none.
    fn take_slice(&mut self) -> Result<Vec<u8>, RecorderError>;

    /// Flush and assemble the final payload from every slice handed out.
    fn finish(self: Box<Self>, slices: Vec<Bytes>) -> Result<Bytes, RecorderError>;
}

/// Encoder parameters derived from configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderSettings {
    pub frame_rate: u32,
    pub video_bitrate: u32,
    pub jpeg_quality: u8,
    pub sample_rate: u32,
    pub channels: u16,
}

impl From<&RecorderConfig> for EncoderSettings {
    fn from(config: &RecorderConfig) -> Self {
        Self {
            frame_rate: config.capture.frame_rate,
            video_bitrate: config.recording.video_bitrate,
            jpeg_quality: config.recording.jpeg_quality,
            sample_rate: config.capture.sample_rate,
            channels: config.capture.channels,
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self::from(&RecorderConfig::default())
    }
}

/// Build an encoder for a MIME type that passed [`format::is_type_supported`].
pub fn create_encoder(
    mime_type: &str,
    settings: &EncoderSettings,
) -> Result<Box<dyn TrackEncoder>, RecorderError> {
    let normalized = format::normalize(mime_type);

    if normalized == format::normalize(format::MOTION_JPEG) {
        return Ok(Box::new(MotionJpegEncoder::new(settings.jpeg_quality)));
    }
    if normalized == format::normalize(format::WAV) {
        return Ok(Box::new(WavEncoder::new(settings.sample_rate, settings.channels)));
    }
    #[cfg(feature = "recording")]
    if normalized == format::normalize(format::H264_MP4) {
        return Ok(Box::new(super::h264::H264Mp4Encoder::new(
            settings.frame_rate,
            settings.video_bitrate,
        )));
    }
    #[cfg(feature = "audio")]
    if normalized == format::normalize(format::OGG_OPUS) {
        return Ok(Box::new(super::opus::OggOpusEncoder::new(settings.channels)?));
    }

    Err(RecorderError::UnsupportedFormat(mime_type.to_string()))
}

/// Concatenate slices into one buffer.
pub(crate) fn concat(slices: &[Bytes]) -> Vec<u8> {
    let total = slices.iter().map(Bytes::len).sum();
    let mut out = Vec::with_capacity(total);
    for slice in slices {
        out.extend_from_slice(slice);
    }
    out
}

pub(crate) fn wrong_track(expected: TrackKind, input: &EncoderInput<'_>) -> RecorderError {
    RecorderError::encoding(format!(
        "{} encoder received {} input",
        expected,
        input.track()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_baseline_encoders() {
        let settings = EncoderSettings::default();
        let video = create_encoder(format::MOTION_JPEG, &settings).unwrap();
        assert_eq!(video.track(), TrackKind::Video);
        let audio = create_encoder("audio/WAV", &settings).unwrap();
        assert_eq!(audio.track(), TrackKind::Audio);
        assert_eq!(audio.mime_type(), format::WAV);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let result = create_encoder("video/webm;codecs=vp9", &EncoderSettings::default());
        assert!(matches!(result, Err(RecorderError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_concat_preserves_order() {
        let slices = vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")];
        assert_eq!(concat(&slices), b"abcd");
    }
}
