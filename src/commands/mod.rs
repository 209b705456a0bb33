//! Tauri commands over the shared recording controller
//!
//! Every command returns `ErrorResponse` on failure so the frontend can
//! branch on a stable code and show the user message as-is.

pub mod config;
pub mod library;
pub mod session;

pub use config::*;
pub use library::*;
pub use session::*;

use crate::session::SharedController;

/// Managed plugin state
pub struct RecorderState {
    pub controller: SharedController,
}

impl RecorderState {
    pub fn new(controller: SharedController) -> Self {
        Self { controller }
    }
}
