//! H.264 video muxed into MP4
//!
//! Frames are converted to YUV420, encoded with openh264 and written to a
//! muxide MP4 muxer whose output lands in a shared in-memory buffer. Slices
//! are whatever the muxer has written so far; finishing the muxer writes the
//! remaining boxes, which become the tail of the payload.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use muxide::api::{Metadata, Muxer, MuxerBuilder, VideoCodec};
use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate, FrameType};
use openh264::OpenH264API;
use openh264::formats::YUVBuffer;

use super::encoder::{concat, wrong_track, EncoderInput, TrackEncoder};
use super::format::H264_MP4;
use crate::errors::RecorderError;
use crate::types::TrackKind;

/// Writer handing bytes to whoever holds the other clone
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn drain(&self) -> Vec<u8> {
        match self.0.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "output buffer poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Session {
    encoder: Encoder,
    muxer: Muxer<SharedBuffer>,
    width: u32,
    height: u32,
}

pub struct H264Mp4Encoder {
    frame_rate: u32,
    bitrate: u32,
    output: SharedBuffer,
    session: Option<Session>,
    frame_count: u64,
    skipped: u64,
}

impl H264Mp4Encoder {
    /// The encoder and muxer are created on the first frame, once the frame
    /// size is known.
    pub fn new(frame_rate: u32, bitrate: u32) -> Self {
        Self {
            frame_rate: frame_rate.max(1),
            bitrate,
            output: SharedBuffer::default(),
            session: None,
            frame_count: 0,
            skipped: 0,
        }
    }

    fn open(&mut self, width: u32, height: u32) -> Result<(), RecorderError> {
        let config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(self.bitrate))
            .max_frame_rate(FrameRate::from_hz(self.frame_rate as f32));
        let encoder = Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|e| RecorderError::encoding(format!("Failed to create encoder: {}", e)))?;
        let muxer = MuxerBuilder::new(self.output.clone())
            .video(VideoCodec::H264, width, height, self.frame_rate as f64)
            .with_fast_start(false)
            .with_metadata(Metadata::new().with_current_time())
            .build()
            .map_err(|e| RecorderError::encoding(format!("Failed to create muxer: {}", e)))?;

        log::debug!(
            "Opened H.264 track at {}x{}@{}, target {} bps",
            width,
            height,
            self.frame_rate,
            self.bitrate
        );
        self.session = Some(Session {
            encoder,
            muxer,
            width,
            height,
        });
        Ok(())
    }
}

impl TrackEncoder for H264Mp4Encoder {
    fn track(&self) -> TrackKind {
        TrackKind::Video
    }

    fn mime_type(&self) -> &str {
        H264_MP4
    }

    fn encode(&mut self, input: EncoderInput<'_>) -> Result<(), RecorderError> {
        let frame = match input {
            EncoderInput::Video(frame) => frame,
            other => return Err(wrong_track(TrackKind::Video, &other)),
        };
        if !frame.is_well_formed() {
            return Err(RecorderError::encoding("Invalid frame size"));
        }
        if self.session.is_none() {
            self.open(frame.width, frame.height)?;
        }
        let frame_duration = 1.0 / self.frame_rate as f64;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| RecorderError::encoding("H.264 session not open"))?;

        if frame.width != session.width || frame.height != session.height {
            return Err(RecorderError::encoding(format!(
                "Frame dimensions {}x{} don't match track {}x{}",
                frame.width, frame.height, session.width, session.height
            )));
        }

        let yuv = rgb_to_yuv420(&frame.data, frame.width, frame.height);
        let yuv_buffer = YUVBuffer::from_vec(yuv, frame.width as usize, frame.height as usize);
        let bitstream = session
            .encoder
            .encode(&yuv_buffer)
            .map_err(|e| RecorderError::encoding(format!("Encoding failed: {}", e)))?;
        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let data = bitstream.to_vec();

        if data.is_empty() {
            self.skipped += 1;
            return Ok(());
        }

        let pts = self.frame_count as f64 * frame_duration;
        session
            .muxer
            .write_video(pts, &data, is_keyframe)
            .map_err(|e| RecorderError::encoding(format!("Failed to write frame: {}", e)))?;
        self.frame_count += 1;
        Ok(())
    }

    fn take_slice(&mut self) -> Result<Vec<u8>, RecorderError> {
        Ok(self.output.drain())
    }

    fn finish(self: Box<Self>, mut slices: Vec<Bytes>) -> Result<Bytes, RecorderError> {
        let this = *self;
        if let Some(session) = this.session {
            let stats = session
                .muxer
                .finish_with_stats()
                .map_err(|e| RecorderError::encoding(format!("Failed to finalize MP4: {}", e)))?;
            log::debug!(
                "H.264 track finished: {} frames, {} skipped, {:.2}s",
                stats.video_frames,
                this.skipped,
                stats.duration_secs
            );
        }
        let tail = this.output.drain();
        if !tail.is_empty() {
            slices.push(Bytes::from(tail));
        }
        Ok(Bytes::from(concat(&slices)))
    }
}

/// Convert RGB24 to planar YUV420 (BT.601)
fn rgb_to_yuv420(rgb: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) * 3;
            let r = rgb[idx] as i32;
            let g = rgb[idx + 1] as i32;
            let b = rgb[idx + 2] as i32;

            y_plane[y * w + x] = (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8;

            if y % 2 == 0 && x % 2 == 0 && x / 2 < w / 2 && y / 2 < h / 2 {
                let uv_idx = (y / 2) * (w / 2) + (x / 2);
                u_plane[uv_idx] = (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
                v_plane[uv_idx] = (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
            }
        }
    }

    yuv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::VideoFrame;
    use crate::testing::synthetic_video_frame;

    #[test]
    fn test_rgb_to_yuv420_size() {
        let rgb = vec![128u8; 64 * 48 * 3];
        assert_eq!(rgb_to_yuv420(&rgb, 64, 48).len(), 64 * 48 * 3 / 2);
    }

    fn noise_frame(seed: u64, width: u32, height: u32) -> VideoFrame {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let data = (0..width * height * 3)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 56) as u8
            })
            .collect();
        VideoFrame {
            data,
            width,
            height,
            timestamp: 0.0,
        }
    }

    fn encoded_size(bitrate: u32) -> usize {
        let mut encoder = Box::new(H264Mp4Encoder::new(30, bitrate));
        for n in 0..30 {
            encoder
                .encode(EncoderInput::Video(&noise_frame(n, 160, 120)))
                .unwrap();
        }
        encoder.finish(Vec::new()).unwrap().len()
    }

    #[test]
    fn test_bitrate_target_limits_output() {
        let low = encoded_size(64_000);
        let high = encoded_size(4_000_000);
        assert!(low < high, "64 kbps gave {} bytes, 4 Mbps gave {}", low, high);
    }

    #[test]
    fn test_payload_is_mp4() {
        let mut encoder = Box::new(H264Mp4Encoder::new(30, 1_000_000));
        let mut slices = Vec::new();
        for n in 0..10 {
            let frame = synthetic_video_frame(n, 64, 48, n as f64 / 30.0);
            encoder.encode(EncoderInput::Video(&frame)).unwrap();
            let slice = encoder.take_slice().unwrap();
            if !slice.is_empty() {
                slices.push(Bytes::from(slice));
            }
        }
        let payload = encoder.finish(slices).unwrap();
        assert!(payload.len() > 8);
        assert_eq!(&payload[4..8], b"ftyp");
    }
}
