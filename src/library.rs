//! Browsing saved exercises: ordering, filtering, playback and export.
//!
//! Display order is always derived here and never persisted.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::RecorderError;
use crate::media::format::extension_for;
use crate::types::{ExerciseKind, ExerciseRecord, MediaPayload, TrackKind};

/// Newest first; records saved in the same instant fall back to id order.
pub fn sort_newest_first(records: &[ExerciseRecord]) -> Vec<&ExerciseRecord> {
    let mut sorted: Vec<&ExerciseRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    sorted
}

pub fn filter_by_kind<'a>(
    records: impl IntoIterator<Item = &'a ExerciseRecord>,
    kind: Option<&ExerciseKind>,
) -> Vec<&'a ExerciseRecord> {
    records
        .into_iter()
        .filter(|r| kind.map_or(true, |k| r.kind.as_ref() == Some(k)))
        .collect()
}

/// List entry without the payload bytes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSummary {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<ExerciseKind>,
    pub created_at: DateTime<Utc>,
    pub duration_label: String,
    pub video_mime_type: String,
    pub audio_mime_type: Option<String>,
    pub payload_bytes: usize,
}

impl From<&ExerciseRecord> for ExerciseSummary {
    fn from(record: &ExerciseRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            kind: record.kind.clone(),
            created_at: record.created_at,
            duration_label: record.duration_label.clone(),
            video_mime_type: record.video_payload.mime_type.clone(),
            audio_mime_type: record.audio_payload.as_ref().map(|a| a.mime_type.clone()),
            payload_bytes: record.payload_bytes(),
        }
    }
}

/// Sorted, optionally filtered summaries ready for display
pub fn summarize(records: &[ExerciseRecord], kind: Option<&ExerciseKind>) -> Vec<ExerciseSummary> {
    filter_by_kind(sort_newest_first(records), kind)
        .into_iter()
        .map(ExerciseSummary::from)
        .collect()
}

/// Data URLs a host player recombines for playback
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSource {
    pub video: String,
    pub audio: Option<String>,
}

impl From<&ExerciseRecord> for PlaybackSource {
    fn from(record: &ExerciseRecord) -> Self {
        Self {
            video: record.video_payload.to_data_url(),
            audio: record.audio_payload.as_ref().map(MediaPayload::to_data_url),
        }
    }
}

/// File name for downloading one track of `record`.
///
/// Whitespace runs become `_`, the save date is appended and the extension
/// follows the payload's MIME type.
pub fn download_file_name(record: &ExerciseRecord, track: TrackKind) -> String {
    let stem = record
        .name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace(['/', '\\'], "-");
    let date = record.created_at.format("%Y-%m-%d");
    match (track, record.audio_payload.as_ref()) {
        (TrackKind::Audio, Some(audio)) => {
            format!("{}_{}_audio.{}", stem, date, extension_for(&audio.mime_type))
        }
        _ => format!(
            "{}_{}.{}",
            stem,
            date,
            extension_for(&record.video_payload.mime_type)
        ),
    }
}

/// Write every payload of `record` into `dir`, returning the created paths.
pub fn export_record<P: AsRef<Path>>(
    record: &ExerciseRecord,
    dir: P,
) -> Result<Vec<PathBuf>, RecorderError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    let video_path = dir.join(download_file_name(record, TrackKind::Video));
    fs::write(&video_path, &record.video_payload.data)?;
    written.push(video_path);

    if let Some(audio) = &record.audio_payload {
        let audio_path = dir.join(download_file_name(record, TrackKind::Audio));
        fs::write(&audio_path, &audio.data)?;
        written.push(audio_path);
    }

    log::info!("Exported exercise '{}' to {:?}", record.name, dir);
    Ok(written)
}
