//! Synthetic camera and microphone output
//!
//! Gradient video that shifts every frame (so encoders see motion) and a
//! 440 Hz tone at modest amplitude.

use crate::capture::{AudioFrame, VideoFrame};

/// Build an RGB24 gradient frame whose colours shift with `frame_number`.
pub fn synthetic_video_frame(frame_number: u64, width: u32, height: u32, timestamp: f64) -> VideoFrame {
    let mut data = vec![0u8; (width as usize) * (height as usize) * 3];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }

    VideoFrame {
        data,
        width,
        height,
        timestamp,
    }
}

/// Build an interleaved sine-tone chunk continuing from chunk `frame_number`.
pub fn synthetic_audio_frame(
    frame_number: u64,
    samples_per_channel: usize,
    sample_rate: u32,
    channels: u16,
) -> AudioFrame {
    let frequency = 440.0;
    let rate = sample_rate as f64;
    let channels_usize = channels as usize;
    let mut samples = vec![0.0f32; samples_per_channel * channels_usize];

    for i in 0..samples_per_channel {
        let t = (frame_number as f64 * samples_per_channel as f64 + i as f64) / rate;
        let value = (2.0 * std::f64::consts::PI * frequency * t).sin() as f32 * 0.3;
        for c in 0..channels_usize {
            samples[i * channels_usize + c] = value;
        }
    }

    AudioFrame {
        samples,
        sample_rate,
        channels,
        timestamp: (frame_number as f64 * samples_per_channel as f64) / rate,
    }
}

/// Shape of the synthetic device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticProfile {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub sample_rate: u32,
    pub channels: u16,
    /// Duration of one audio chunk in milliseconds
    pub audio_chunk_ms: u32,
}

impl Default for SyntheticProfile {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
            sample_rate: 44100,
            channels: 1,
            audio_chunk_ms: 20,
        }
    }
}

impl SyntheticProfile {
    /// Small frames for fast tests.
    pub fn tiny() -> Self {
        Self {
            width: 32,
            height: 24,
            frame_rate: 30,
            ..Self::default()
        }
    }

    pub fn samples_per_chunk(&self) -> usize {
        (self.sample_rate as usize * self.audio_chunk_ms as usize) / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_video_frame_correct_size() {
        let frame = synthetic_video_frame(0, 64, 48, 0.0);
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn test_synthetic_video_frames_differ() {
        let frame0 = synthetic_video_frame(0, 32, 24, 0.0);
        let frame1 = synthetic_video_frame(1, 32, 24, 0.033);
        assert_ne!(frame0.data[0], frame1.data[0]);
    }

    #[test]
    fn test_synthetic_audio_frame_layout() {
        let frame = synthetic_audio_frame(0, 882, 44100, 2);
        assert_eq!(frame.sample_rate, 44100);
        assert_eq!(frame.samples.len(), 882 * 2);
        assert_eq!(frame.samples[10], frame.samples[11]);
    }

    #[test]
    fn test_synthetic_audio_has_signal_without_clipping() {
        let frame = synthetic_audio_frame(0, 882, 44100, 1);
        let peak = frame.samples.iter().map(|s| s.abs()).fold(0.0, f32::max);
        assert!(peak > 0.1, "expected signal, got {}", peak);
        assert!(peak < 0.5, "unexpected clipping, got {}", peak);
    }

    #[test]
    fn test_synthetic_audio_timestamps_increase() {
        let a = synthetic_audio_frame(0, 882, 44100, 1);
        let b = synthetic_audio_frame(1, 882, 44100, 1);
        assert!(b.timestamp > a.timestamp);
    }

    #[test]
    fn test_profile_chunk_size() {
        assert_eq!(SyntheticProfile::default().samples_per_chunk(), 882);
    }
}
