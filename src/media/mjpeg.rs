//! Motion-JPEG video: each frame is compressed to a standalone JPEG and the
//! payload is the frames back to back.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;

use super::encoder::{concat, wrong_track, EncoderInput, TrackEncoder};
use super::format::MOTION_JPEG;
use crate::errors::RecorderError;
use crate::types::TrackKind;

pub struct MotionJpegEncoder {
    quality: u8,
    pending: Vec<u8>,
    frames: u64,
}

impl MotionJpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            pending: Vec::new(),
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl TrackEncoder for MotionJpegEncoder {
    fn track(&self) -> TrackKind {
        TrackKind::Video
    }

    fn mime_type(&self) -> &str {
        MOTION_JPEG
    }

    fn encode(&mut self, input: EncoderInput<'_>) -> Result<(), RecorderError> {
        let frame = match input {
            EncoderInput::Video(frame) => frame,
            other => return Err(wrong_track(TrackKind::Video, &other)),
        };
        if !frame.is_well_formed() {
            return Err(RecorderError::encoding(format!(
                "Invalid frame: {}x{} with {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }

        let img = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| RecorderError::encoding("Failed to create image from frame data"))?;
        let mut cursor = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut cursor, self.quality);
        image::DynamicImage::ImageRgb8(img)
            .write_with_encoder(encoder)
            .map_err(|e| RecorderError::encoding(format!("JPEG encoding failed: {}", e)))?;

        self.pending.extend_from_slice(cursor.get_ref());
        self.frames += 1;
        Ok(())
    }

    fn take_slice(&mut self) -> Result<Vec<u8>, RecorderError> {
        Ok(std::mem::take(&mut self.pending))
    }

    fn finish(mut self: Box<Self>, mut slices: Vec<Bytes>) -> Result<Bytes, RecorderError> {
        let tail = std::mem::take(&mut self.pending);
        if !tail.is_empty() {
            slices.push(Bytes::from(tail));
        }
        log::debug!("Motion-JPEG track finished with {} frames", self.frames);
        Ok(Bytes::from(concat(&slices)))
    }
}
