//! Core data types shared by the session controller, the store and the hosts.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use data_encoding::BASE64;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::RecorderError;

/// Which half of a split capture a stream or payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrackKind::Video => write!(f, "video"),
            TrackKind::Audio => write!(f, "audio"),
        }
    }
}

/// Classification tag for a saved exercise.
///
/// The known kinds cover the common cases; anything else is kept verbatim
/// as a custom tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExerciseKind {
    Strength,
    Cardio,
    Mobility,
    Balance,
    Technique,
    Custom(String),
}

impl ExerciseKind {
    pub fn as_str(&self) -> &str {
        match self {
            ExerciseKind::Strength => "strength",
            ExerciseKind::Cardio => "cardio",
            ExerciseKind::Mobility => "mobility",
            ExerciseKind::Balance => "balance",
            ExerciseKind::Technique => "technique",
            ExerciseKind::Custom(tag) => tag,
        }
    }

    /// Built-in kinds, in the order a picker should show them.
    pub fn builtin() -> [ExerciseKind; 5] {
        [
            ExerciseKind::Strength,
            ExerciseKind::Cardio,
            ExerciseKind::Mobility,
            ExerciseKind::Balance,
            ExerciseKind::Technique,
        ]
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseKind {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RecorderError::validation("Please select an exercise type"));
        }
        Ok(match trimmed.to_lowercase().as_str() {
            "strength" => ExerciseKind::Strength,
            "cardio" => ExerciseKind::Cardio,
            "mobility" => ExerciseKind::Mobility,
            "balance" => ExerciseKind::Balance,
            "technique" => ExerciseKind::Technique,
            _ => ExerciseKind::Custom(trimmed.to_string()),
        })
    }
}

impl Serialize for ExerciseKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExerciseKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Encoded media blob tagged with its MIME type.
///
/// Persisted as a base64 data URL so the whole record stays text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub mime_type: String,
    pub data: Bytes,
}

impl MediaPayload {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.data))
    }

    pub fn from_data_url(url: &str) -> Result<Self, RecorderError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| RecorderError::validation("payload is not a data URL"))?;
        let (header, encoded) = rest
            .split_once(',')
            .ok_or_else(|| RecorderError::validation("data URL has no payload section"))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| RecorderError::validation("data URL is not base64 encoded"))?;
        let data = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| RecorderError::validation(format!("invalid base64 payload: {}", e)))?;
        Ok(Self::new(mime_type, data))
    }
}

impl Serialize for MediaPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for MediaPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MediaPayload::from_data_url(&raw).map_err(serde::de::Error::custom)
    }
}

/// One saved, labeled recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseRecord {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ExerciseKind>,
    #[serde(alias = "date")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "duration")]
    pub duration_label: String,
    #[serde(alias = "videoData")]
    pub video_payload: MediaPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_payload: Option<MediaPayload>,
}

impl ExerciseRecord {
    /// Total encoded bytes held by this record.
    pub fn payload_bytes(&self) -> usize {
        self.video_payload.len() + self.audio_payload.as_ref().map_or(0, MediaPayload::len)
    }
}

/// A selectable video input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDevice {
    pub id: String,
    pub label: String,
}

impl VideoDevice {
    /// Build a device entry, falling back to a positional label when the
    /// platform reports no name.
    pub fn new(id: impl Into<String>, label: Option<String>, position: usize) -> Self {
        let label = label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| format!("Camera {}", position + 1));
        Self {
            id: id.into(),
            label,
        }
    }
}
