//! Testing utilities
//!
//! Deterministic synthetic media used by the synthetic capture backend,
//! the benchmarks and the integration tests.

pub mod synthetic_data;

pub use synthetic_data::{synthetic_audio_frame, synthetic_video_frame, SyntheticProfile};
