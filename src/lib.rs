//! exercise-recorder: record labeled exercise clips from a camera and keep
//! them in a local library.
//!
//! A recording captures video and audio as two independently encoded tracks
//! that are started together and joined on stop; the take is only usable once
//! both have flushed. Saved takes live in a flat collection persisted under a
//! single storage key.
//!
//! # Features
//! - `plugin`: Tauri 2 plugin exposing the recorder as commands
//! - `native`: real cameras through nokhwa
//! - `recording`: H.264/MP4 video encoding
//! - `audio`: microphone capture and Ogg/Opus audio encoding
//!
//! # Usage
//! ```rust,ignore
//! fn main() {
//!     tauri::Builder::default()
//!         .plugin(exercise_recorder::init())
//!         .run(tauri::generate_context!())
//!         .expect("error while running tauri application");
//! }
//! ```
pub mod capture;
#[cfg(feature = "plugin")]
pub mod commands;
pub mod config;
pub mod errors;
pub mod library;
pub mod media;
pub mod session;
pub mod storage;
pub mod testing;
pub mod timing;
pub mod types;

use std::sync::Arc;

use tokio::sync::mpsc;

pub use capture::{CaptureBackend, CaptureConstraints, CaptureSource, SyntheticBackend};
pub use config::RecorderConfig;
pub use errors::{ErrorCategory, ErrorResponse, RecorderError};
pub use media::TrackEvent;
pub use session::{
    run_session_loop, ControlState, RecordingController, SessionForm, SessionPhase, SessionState,
    SharedController,
};
pub use storage::{ExerciseStore, FileStorage, KeyValueStorage, MemoryStorage};
pub use timing::{Clock, ManualClock, SystemClock};
pub use types::{ExerciseKind, ExerciseRecord, MediaPayload, TrackKind, VideoDevice};

#[cfg(feature = "plugin")]
use tauri::{
    plugin::{Builder, TauriPlugin},
    Manager, Runtime,
};

/// Camera backend for this build: nokhwa with `native`, synthetic otherwise.
pub fn default_backend() -> Arc<dyn CaptureBackend> {
    #[cfg(feature = "native")]
    {
        Arc::new(capture::NativeBackend::new())
    }
    #[cfg(not(feature = "native"))]
    {
        log::warn!("Built without the native feature; using synthetic capture");
        Arc::new(SyntheticBackend::new())
    }
}

/// Open the configured file storage and build a controller over it.
pub fn build_controller(
    config: RecorderConfig,
    backend: Arc<dyn CaptureBackend>,
) -> Result<(RecordingController, mpsc::UnboundedReceiver<TrackEvent>), RecorderError> {
    let quota = usize::try_from(config.storage.quota_bytes).unwrap_or(usize::MAX);
    let storage = FileStorage::open(config.storage_dir(), Some(quota))?;
    let store = ExerciseStore::load(Box::new(storage), config.storage.key.clone())?;
    Ok(RecordingController::new(
        config,
        backend,
        store,
        Arc::new(SystemClock),
    ))
}

/// Initialize the plugin with configuration from `exercise-recorder.toml`
/// and the environment
#[cfg(feature = "plugin")]
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    init_with_config(RecorderConfig::load_or_default())
}

#[cfg(feature = "plugin")]
pub fn init_with_config<R: Runtime>(config: RecorderConfig) -> TauriPlugin<R> {
    Builder::new("exercise-recorder")
        .invoke_handler(tauri::generate_handler![
            // Camera and session commands
            commands::session::list_cameras,
            commands::session::select_camera,
            commands::session::release_camera,
            commands::session::start_recording,
            commands::session::stop_recording,
            commands::session::get_controls,
            commands::session::get_preview,
            commands::session::save_recording,
            commands::session::discard_recording,
            commands::session::take_last_error,
            // Library commands
            commands::library::list_exercises,
            commands::library::get_playback,
            commands::library::export_exercise,
            commands::library::delete_exercise,
            commands::library::clear_exercises,
            // Configuration commands
            commands::config::get_config,
            commands::config::get_supported_formats,
            commands::config::get_exercise_kinds,
        ])
        .setup(move |app, _api| {
            let tick = std::time::Duration::from_millis(config.recording.tick_ms);
            let (controller, events) = build_controller(config, default_backend())?;
            let shared: SharedController = Arc::new(tokio::sync::Mutex::new(controller));
            tauri::async_runtime::spawn(run_session_loop(shared.clone(), events, tick));
            app.manage(commands::RecorderState::new(shared));
            log::info!("exercise-recorder plugin initialized");
            Ok(())
        })
        .on_drop(|app| {
            if let Some(state) = app.try_state::<commands::RecorderState>() {
                match state.controller.try_lock() {
                    Ok(mut controller) => controller.shutdown(),
                    Err(_) => log::warn!("Controller busy on shutdown; camera released on drop"),
                }
            }
        })
        .build()
}

/// Initialize logging. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("exercise_recorder=info");
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_init_logging_is_repeatable() {
        init_logging();
        init_logging();
    }

    #[test]
    fn test_build_controller_uses_configured_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RecorderConfig::default();
        config.storage.directory = dir.path().join("lib").to_string_lossy().into_owned();

        let (controller, _events) =
            build_controller(config, Arc::new(SyntheticBackend::new())).unwrap();
        assert!(controller.store().is_empty());
        assert_eq!(controller.store().key(), "exercises");
        assert!(dir.path().join("lib").is_dir());
    }
}
