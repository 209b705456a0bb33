use tauri::{command, State};

use super::RecorderState;
use crate::config::RecorderConfig;
use crate::errors::ErrorResponse;
use crate::media::format::SupportedFormats;
use crate::types::ExerciseKind;

/// Get the configuration the controller is running with
#[command]
pub async fn get_config(state: State<'_, RecorderState>) -> Result<RecorderConfig, ErrorResponse> {
    let controller = state.controller.lock().await;
    Ok(controller.config().clone())
}

#[command]
pub async fn get_supported_formats() -> Result<SupportedFormats, ErrorResponse> {
    Ok(SupportedFormats::probe())
}

/// Built-in exercise kinds for a picker
#[command]
pub async fn get_exercise_kinds() -> Result<Vec<String>, ErrorResponse> {
    Ok(ExerciseKind::builtin()
        .iter()
        .map(|k| k.as_str().to_string())
        .collect())
}
