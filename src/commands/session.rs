//! Camera selection and the record/review cycle

use tauri::{command, State};

use super::RecorderState;
use crate::errors::ErrorResponse;
use crate::library::ExerciseSummary;
use crate::session::{ControlState, SessionForm};
use crate::types::VideoDevice;

#[command]
pub async fn list_cameras(state: State<'_, RecorderState>) -> Result<Vec<VideoDevice>, ErrorResponse> {
    let controller = state.controller.lock().await;
    Ok(controller.list_cameras()?)
}

/// Switch to `device_id`, or the first camera when none is given.
#[command]
pub async fn select_camera(
    state: State<'_, RecorderState>,
    device_id: Option<String>,
) -> Result<VideoDevice, ErrorResponse> {
    let mut controller = state.controller.lock().await;
    Ok(controller.select_camera(device_id.as_deref())?)
}

#[command]
pub async fn release_camera(state: State<'_, RecorderState>) -> Result<(), ErrorResponse> {
    let mut controller = state.controller.lock().await;
    Ok(controller.release_camera()?)
}

/// Start recording; returns the session id.
#[command]
pub async fn start_recording(
    state: State<'_, RecorderState>,
    form: SessionForm,
) -> Result<String, ErrorResponse> {
    let mut controller = state.controller.lock().await;
    let id = controller.start_recording(form)?;
    Ok(id.to_string())
}

/// Request a stop. Poll `get_controls` (or listen for phase changes) until
/// the phase reads `reviewing`.
#[command]
pub async fn stop_recording(state: State<'_, RecorderState>) -> Result<(), ErrorResponse> {
    let mut controller = state.controller.lock().await;
    Ok(controller.stop_recording()?)
}

#[command]
pub async fn get_controls(state: State<'_, RecorderState>) -> Result<ControlState, ErrorResponse> {
    let controller = state.controller.lock().await;
    Ok(controller.controls())
}

/// Video data URL of the take under review
#[command]
pub async fn get_preview(state: State<'_, RecorderState>) -> Result<Option<String>, ErrorResponse> {
    let controller = state.controller.lock().await;
    Ok(controller.preview().map(|p| p.to_data_url()))
}

#[command]
pub async fn save_recording(
    state: State<'_, RecorderState>,
    form: SessionForm,
) -> Result<ExerciseSummary, ErrorResponse> {
    let mut controller = state.controller.lock().await;
    let record = controller.save(form)?;
    Ok(ExerciseSummary::from(&record))
}

#[command]
pub async fn discard_recording(
    state: State<'_, RecorderState>,
    confirmed: bool,
) -> Result<(), ErrorResponse> {
    let mut controller = state.controller.lock().await;
    Ok(controller.discard(confirmed)?)
}

/// Failure raised in the background (a track failing to flush), if any.
#[command]
pub async fn take_last_error(
    state: State<'_, RecorderState>,
) -> Result<Option<ErrorResponse>, ErrorResponse> {
    let mut controller = state.controller.lock().await;
    Ok(controller.take_last_error())
}
