//! Saved exercise commands

use tauri::{command, State};

use super::RecorderState;
use crate::errors::{ErrorResponse, RecorderError};
use crate::library::{export_record, summarize, ExerciseSummary, PlaybackSource};
use crate::types::ExerciseKind;

fn parse_kind(kind: Option<String>) -> Result<Option<ExerciseKind>, RecorderError> {
    kind.as_deref().map(str::parse::<ExerciseKind>).transpose()
}

fn not_found(id: u64) -> RecorderError {
    RecorderError::validation(format!("Exercise {} not found", id))
}

/// Saved exercises, newest first, optionally of one kind
#[command]
pub async fn list_exercises(
    state: State<'_, RecorderState>,
    kind: Option<String>,
) -> Result<Vec<ExerciseSummary>, ErrorResponse> {
    let kind = parse_kind(kind)?;
    let controller = state.controller.lock().await;
    Ok(summarize(controller.store().list(), kind.as_ref()))
}

#[command]
pub async fn get_playback(
    state: State<'_, RecorderState>,
    id: u64,
) -> Result<PlaybackSource, ErrorResponse> {
    let controller = state.controller.lock().await;
    let record = controller.store().get(id).ok_or_else(|| not_found(id))?;
    Ok(PlaybackSource::from(record))
}

/// Write the exercise's payload files into `directory`.
#[command]
pub async fn export_exercise(
    state: State<'_, RecorderState>,
    id: u64,
    directory: String,
) -> Result<Vec<String>, ErrorResponse> {
    let controller = state.controller.lock().await;
    let record = controller.store().get(id).ok_or_else(|| not_found(id))?;
    let paths = export_record(record, &directory)?;
    Ok(paths
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect())
}

#[command]
pub async fn delete_exercise(
    state: State<'_, RecorderState>,
    id: u64,
    confirmed: bool,
) -> Result<bool, ErrorResponse> {
    let mut controller = state.controller.lock().await;
    Ok(controller.delete_exercise(id, confirmed)?)
}

#[command]
pub async fn clear_exercises(
    state: State<'_, RecorderState>,
    confirmed: bool,
) -> Result<(), ErrorResponse> {
    let mut controller = state.controller.lock().await;
    Ok(controller.clear_exercises(confirmed)?)
}
