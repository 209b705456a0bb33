//! Runtime format probing and fallback selection
//!
//! Which MIME types can be encoded depends on the features this build was
//! compiled with, so selection always goes through [`is_type_supported`].

use serde::Serialize;

use crate::types::TrackKind;

/// H.264 in MP4, requires the `recording` feature
pub const H264_MP4: &str = "video/mp4;codecs=avc1";
/// Concatenated JPEG frames, always available
pub const MOTION_JPEG: &str = "video/x-motion-jpeg";
/// 16-bit PCM WAV, always available
pub const WAV: &str = "audio/wav";
/// Opus in Ogg, requires the `audio` feature
pub const OGG_OPUS: &str = "audio/ogg;codecs=opus";

/// Formats every build can produce
pub fn baseline(track: TrackKind) -> &'static str {
    match track {
        TrackKind::Video => MOTION_JPEG,
        TrackKind::Audio => WAV,
    }
}

/// Lowercase and strip whitespace so `Video/MP4; codecs=avc1` matches.
pub fn normalize(mime: &str) -> String {
    mime.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Every MIME type this build can encode, per track
pub fn supported_types(track: TrackKind) -> Vec<&'static str> {
    let mut types = Vec::new();
    match track {
        TrackKind::Video => {
            if cfg!(feature = "recording") {
                types.push(H264_MP4);
            }
            types.push(MOTION_JPEG);
        }
        TrackKind::Audio => {
            types.push(WAV);
            if cfg!(feature = "audio") {
                types.push(OGG_OPUS);
            }
        }
    }
    types
}

pub fn track_of(mime: &str) -> Option<TrackKind> {
    let normalized = normalize(mime);
    if normalized.starts_with("video/") {
        Some(TrackKind::Video)
    } else if normalized.starts_with("audio/") {
        Some(TrackKind::Audio)
    } else {
        None
    }
}

/// Capability query: can this build encode `mime`?
pub fn is_type_supported(mime: &str) -> bool {
    let normalized = normalize(mime);
    match track_of(&normalized) {
        Some(track) => supported_types(track)
            .iter()
            .any(|candidate| normalize(candidate) == normalized),
        None => false,
    }
}

/// Outcome of walking a preference list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatChoice {
    pub track: TrackKind,
    pub mime_type: String,
    /// True when the first preference was not usable
    pub fell_back: bool,
}

/// Pick the first supported preference, or the baseline when none is.
pub fn select_format(track: TrackKind, preferences: &[String]) -> FormatChoice {
    for (position, candidate) in preferences.iter().enumerate() {
        if track_of(candidate) == Some(track) && is_type_supported(candidate) {
            if position > 0 {
                log::debug!(
                    "{} format {:?} unsupported, falling back to {}",
                    track,
                    preferences.first(),
                    candidate
                );
            }
            return FormatChoice {
                track,
                mime_type: candidate.clone(),
                fell_back: position > 0,
            };
        }
    }

    let fallback = baseline(track);
    log::debug!(
        "No preferred {} format supported ({:?}); using {}",
        track,
        preferences,
        fallback
    );
    FormatChoice {
        track,
        mime_type: fallback.to_string(),
        fell_back: true,
    }
}

/// Encoders this build can construct, per track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportedFormats {
    pub video: Vec<String>,
    pub audio: Vec<String>,
}

impl SupportedFormats {
    pub fn probe() -> Self {
        let list = |track| {
            supported_types(track)
                .into_iter()
                .map(str::to_string)
                .collect()
        };
        Self {
            video: list(TrackKind::Video),
            audio: list(TrackKind::Audio),
        }
    }
}

/// File extension for a downloaded payload
pub fn extension_for(mime: &str) -> &'static str {
    let normalized = normalize(mime);
    let essence = normalized.split(';').next().unwrap_or_default();
    match essence {
        "video/mp4" => "mp4",
        "video/x-motion-jpeg" => "mjpeg",
        "video/webm" | "audio/webm" => "webm",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        _ => "bin",
    }
}
