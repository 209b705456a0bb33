//! Media encoding: format probing, per-track encoders and the time-sliced
//! recorder that drives them.

pub mod encoder;
pub mod format;
#[cfg(feature = "recording")]
pub mod h264;
pub mod mjpeg;
#[cfg(feature = "audio")]
pub mod opus;
pub mod recorder;
pub mod wav;

pub use encoder::{create_encoder, EncoderInput, EncoderSettings, TrackEncoder};
pub use format::{is_type_supported, select_format, FormatChoice};
pub use recorder::{EventSink, TrackEvent, TrackInput, TrackRecorder};
