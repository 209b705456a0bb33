//! Recording sessions: the state machine, the dual-track join, the
//! controller that owns capture and encoders, and its async driver.

pub mod controller;
pub mod driver;
pub mod join;
pub mod state;

pub use controller::RecordingController;
pub use driver::{run_session_loop, wait_for_phase, SharedController};
pub use join::{JoinProgress, JoinedTracks, TrackJoin};
pub use state::{
    ControlState, FormPolicy, PreviewMode, SessionForm, SessionPhase, SessionState, StopOutcome,
    TrackLayout,
};
