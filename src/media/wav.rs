//! Uncompressed audio: slices carry raw little-endian 16-bit PCM and the
//! final payload wraps all of it in a WAV header written by hound.

use std::io::Cursor;

use bytes::Bytes;

use super::encoder::{wrong_track, EncoderInput, TrackEncoder};
use super::format::WAV;
use crate::errors::RecorderError;
use crate::types::TrackKind;

pub struct WavEncoder {
    sample_rate: u32,
    channels: u16,
    /// Set by the first frame; later frames must match it.
    locked: bool,
    pending: Vec<u8>,
}

impl WavEncoder {
    /// `sample_rate` and `channels` are used only if no audio ever arrives.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            locked: false,
            pending: Vec::new(),
        }
    }

    fn spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

impl TrackEncoder for WavEncoder {
    fn track(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn mime_type(&self) -> &str {
        WAV
    }

    fn encode(&mut self, input: EncoderInput<'_>) -> Result<(), RecorderError> {
        let frame = match input {
            EncoderInput::Audio(frame) => frame,
            other => return Err(wrong_track(TrackKind::Audio, &other)),
        };

        if !self.locked {
            self.sample_rate = frame.sample_rate;
            self.channels = frame.channels;
            self.locked = true;
        } else if frame.sample_rate != self.sample_rate || frame.channels != self.channels {
            return Err(RecorderError::encoding(format!(
                "Audio format changed mid-recording: {} Hz x{} -> {} Hz x{}",
                self.sample_rate, self.channels, frame.sample_rate, frame.channels
            )));
        }

        self.pending.reserve(frame.samples.len() * 2);
        for &sample in &frame.samples {
            self.pending.extend_from_slice(&to_i16(sample).to_le_bytes());
        }
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

        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, self.spec())
            .map_err(|e| RecorderError::encoding(format!("Failed to start WAV: {}", e)))?;

        let mut carry: Option<u8> = None;
        for slice in &slices {
            for &byte in slice.iter() {
                match carry.take() {
                    None => carry = Some(byte),
                    Some(low) => writer
                        .write_sample(i16::from_le_bytes([low, byte]))
                        .map_err(|e| RecorderError::encoding(format!("WAV write failed: {}", e)))?,
                }
            }
        }
        if carry.is_some() {
            log::warn!("Dropping trailing odd byte from PCM stream");
        }

        writer
            .finalize()
            .map_err(|e| RecorderError::encoding(format!("Failed to finalize WAV: {}", e)))?;
        Ok(Bytes::from(cursor.into_inner()))
    }
}
