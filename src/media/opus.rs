//! Opus audio in an Ogg container
//!
//! Compressed fallback for the audio track. Opus only runs at a handful of
//! rates, so input is linearly resampled to 48 kHz first.

use bytes::Bytes;
use ogg::writing::{PacketWriteEndInfo, PacketWriter};

use super::encoder::{concat, wrong_track, EncoderInput, TrackEncoder};
use super::format::OGG_OPUS;
use crate::errors::RecorderError;
use crate::types::TrackKind;

const OPUS_RATE: u32 = 48000;
/// 20ms at 48kHz
const OPUS_FRAME_SAMPLES: usize = 960;
/// OPUS_APPLICATION_AUDIO
const OPUS_APPLICATION_AUDIO: i32 = 2049;
const OPUS_BITRATE: i32 = 64_000;
const PRE_SKIP: u16 = 312;
const STREAM_SERIAL: u32 = 0x4558_5243;
/// Packets per Ogg page, 100ms of audio
const PACKETS_PER_PAGE: u64 = 5;

/// Thin owner of a libopus encoder
///
/// Only ever used from the recorder thread it was moved to.
struct RawOpus {
    encoder: *mut libopus_sys::OpusEncoder,
}

// SAFETY: the pointer is owned exclusively and never shared; libopus encoders
// may be used from any single thread.
unsafe impl Send for RawOpus {}

impl RawOpus {
    fn new(channels: u16) -> Result<Self, RecorderError> {
        let mut error: i32 = 0;
        let encoder = unsafe {
            libopus_sys::opus_encoder_create(
                OPUS_RATE as i32,
                channels as i32,
                OPUS_APPLICATION_AUDIO,
                &mut error,
            )
        };
        if encoder.is_null() || error != 0 {
            return Err(RecorderError::encoding(format!(
                "Failed to create Opus encoder: error code {}",
                error
            )));
        }

        let result = unsafe {
            libopus_sys::opus_encoder_ctl(
                encoder,
                libopus_sys::OPUS_SET_BITRATE_REQUEST as i32,
                OPUS_BITRATE,
            )
        };
        if result != 0 {
            unsafe { libopus_sys::opus_encoder_destroy(encoder) };
            return Err(RecorderError::encoding(format!(
                "Failed to set Opus bitrate: error code {}",
                result
            )));
        }
        Ok(Self { encoder })
    }

    fn encode(&mut self, frame: &[f32]) -> Result<Vec<u8>, RecorderError> {
        let mut output = vec![0u8; 4000];
        let len = unsafe {
            libopus_sys::opus_encode_float(
                self.encoder,
                frame.as_ptr(),
                OPUS_FRAME_SAMPLES as i32,
                output.as_mut_ptr(),
                output.len() as i32,
            )
        };
        if len < 0 {
            return Err(RecorderError::encoding(format!(
                "Opus encoding failed: error code {}",
                len
            )));
        }
        output.truncate(len as usize);
        Ok(output)
    }
}

impl Drop for RawOpus {
    fn drop(&mut self) {
        if !self.encoder.is_null() {
            unsafe { libopus_sys::opus_encoder_destroy(self.encoder) };
        }
    }
}

/// Streaming linear resampler for interleaved audio
struct LinearResampler {
    step: f64,
    position: f64,
    channels: usize,
    previous: Option<Vec<f32>>,
}

impl LinearResampler {
    fn new(input_rate: u32, output_rate: u32, channels: u16) -> Self {
        Self {
            step: input_rate as f64 / output_rate as f64,
            position: 0.0,
            channels: channels as usize,
            previous: None,
        }
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let ch = self.channels;
        let mut frames: Vec<&[f32]> = Vec::with_capacity(input.len() / ch + 1);
        if let Some(prev) = self.previous.as_deref() {
            frames.push(prev);
        }
        frames.extend(input.chunks_exact(ch));
        let count = frames.len();
        if count < 2 {
            self.previous = frames.last().map(|f| f.to_vec());
            return Vec::new();
        }

        let mut out = Vec::with_capacity(((count as f64 / self.step) as usize + 1) * ch);
        while self.position + 1.0 < count as f64 {
            let index = self.position.floor() as usize;
            let frac = (self.position - index as f64) as f32;
            for c in 0..ch {
                let a = frames[index][c];
                let b = frames[index + 1][c];
                out.push(a + (b - a) * frac);
            }
            self.position += self.step;
        }
        self.position -= (count - 1) as f64;
        self.previous = frames.last().map(|f| f.to_vec());
        out
    }
}

pub struct OggOpusEncoder {
    opus: RawOpus,
    channels: u16,
    resampler: Option<LinearResampler>,
    input_rate: Option<u32>,
    buffer: Vec<f32>,
    writer: PacketWriter<'static, Vec<u8>>,
    held: Option<Vec<u8>>,
    granule: u64,
    packets: u64,
}

impl OggOpusEncoder {
    pub fn new(channels: u16) -> Result<Self, RecorderError> {
        if channels != 1 && channels != 2 {
            return Err(RecorderError::UnsupportedFormat(format!(
                "Opus supports mono or stereo, not {} channels",
                channels
            )));
        }
        let mut writer = PacketWriter::new(Vec::new());
        write_headers(&mut writer, channels)?;
        Ok(Self {
            opus: RawOpus::new(channels)?,
            channels,
            resampler: None,
            input_rate: None,
            buffer: Vec::new(),
            writer,
            held: None,
            granule: PRE_SKIP as u64,
            packets: 0,
        })
    }

    /// Write the previously held packet; the newest is held back so the
    /// final one can carry the end-of-stream flag.
    fn push_packet(&mut self, packet: Vec<u8>) -> Result<(), RecorderError> {
        if let Some(previous) = self.held.replace(packet) {
            self.write_packet(previous, false)?;
        }
        Ok(())
    }

    fn write_packet(&mut self, packet: Vec<u8>, last: bool) -> Result<(), RecorderError> {
        self.granule += OPUS_FRAME_SAMPLES as u64;
        self.packets += 1;
        let info = if last {
            PacketWriteEndInfo::EndStream
        } else if self.packets % PACKETS_PER_PAGE == 0 {
            PacketWriteEndInfo::EndPage
        } else {
            PacketWriteEndInfo::NormalPacket
        };
        self.writer
            .write_packet(packet, STREAM_SERIAL, info, self.granule)
            .map_err(|e| RecorderError::encoding(format!("Ogg write failed: {}", e)))
    }

    fn encode_buffered(&mut self, pad: bool) -> Result<(), RecorderError> {
        let per_frame = OPUS_FRAME_SAMPLES * self.channels as usize;
        if pad && !self.buffer.is_empty() && self.buffer.len() % per_frame != 0 {
            let padded = self.buffer.len().div_ceil(per_frame) * per_frame;
            self.buffer.resize(padded, 0.0);
        }
        while self.buffer.len() >= per_frame {
            let frame: Vec<f32> = self.buffer.drain(..per_frame).collect();
            let packet = self.opus.encode(&frame)?;
            self.push_packet(packet)?;
        }
        Ok(())
    }
}

fn write_headers(writer: &mut PacketWriter<'static, Vec<u8>>, channels: u16) -> Result<(), RecorderError> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1);
    head.push(channels as u8);
    head.extend_from_slice(&PRE_SKIP.to_le_bytes());
    head.extend_from_slice(&OPUS_RATE.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes());
    head.push(0);

    let vendor = concat!("exercise-recorder ", env!("CARGO_PKG_VERSION"));
    let mut tags = Vec::new();
    tags.extend_from_slice(b"OpusTags");
    tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    tags.extend_from_slice(vendor.as_bytes());
    tags.extend_from_slice(&0u32.to_le_bytes());

    for packet in [head, tags] {
        writer
            .write_packet(packet, STREAM_SERIAL, PacketWriteEndInfo::EndPage, 0)
            .map_err(|e| RecorderError::encoding(format!("Ogg header write failed: {}", e)))?;
    }
    Ok(())
}

impl TrackEncoder for OggOpusEncoder {
    fn track(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn mime_type(&self) -> &str {
        OGG_OPUS
    }

    fn encode(&mut self, input: EncoderInput<'_>) -> Result<(), RecorderError> {
        let frame = match input {
            EncoderInput::Audio(frame) => frame,
            other => return Err(wrong_track(TrackKind::Audio, &other)),
        };
        if frame.channels != self.channels {
            return Err(RecorderError::encoding(format!(
                "Channel count mismatch: expected {}, got {}",
                self.channels, frame.channels
            )));
        }
        match self.input_rate {
            None => {
                self.input_rate = Some(frame.sample_rate);
                if frame.sample_rate != OPUS_RATE {
                    self.resampler = Some(LinearResampler::new(
                        frame.sample_rate,
                        OPUS_RATE,
                        frame.channels,
                    ));
                }
            }
            Some(rate) if rate != frame.sample_rate => {
                return Err(RecorderError::encoding(format!(
                    "Sample rate changed mid-recording: {} -> {}",
                    rate, frame.sample_rate
                )));
            }
            Some(_) => {}
        }

        match self.resampler.as_mut() {
            Some(resampler) => {
                let resampled = resampler.process(&frame.samples);
                self.buffer.extend_from_slice(&resampled);
            }
            None => self.buffer.extend_from_slice(&frame.samples),
        }
        self.encode_buffered(false)
    }

    fn take_slice(&mut self) -> Result<Vec<u8>, RecorderError> {
        Ok(std::mem::take(self.writer.inner_mut()))
    }

    fn finish(mut self: Box<Self>, mut slices: Vec<Bytes>) -> Result<Bytes, RecorderError> {
        self.encode_buffered(true)?;
        if self.held.is_none() {
            // The end-of-stream flag rides on a packet, so a take with no
            // audio still gets one frame of silence.
            let silence = vec![0.0f32; OPUS_FRAME_SAMPLES * self.channels as usize];
            self.held = Some(self.opus.encode(&silence)?);
        }
        if let Some(last) = self.held.take() {
            self.write_packet(last, true)?;
        }
        log::debug!("Opus track finished with {} packets", self.packets);

        let tail = std::mem::take(self.writer.inner_mut());
        if !tail.is_empty() {
            slices.push(Bytes::from(tail));
        }
        Ok(Bytes::from(concat(&slices)))
    }
}
