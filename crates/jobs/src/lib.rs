//! Lifecycle control for long-running stitch jobs driven by an external engine.

use thiserror::Error;

mod controller;
mod engine;
pub mod preview;
pub mod realtime;

pub use controller::{
    JobCallbacks, JobController, JobEvent, JobState, JobStatus, Phase, TerminalStatus,
};
pub use engine::{CompletionSignal, EngineError, FrameEvent, PixelFormat, StitchEngine};
pub use uuid::Uuid as JobId;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("job already submitted")]
    AlreadySubmitted,
    #[error("job not submitted")]
    NotSubmitted,
    #[error(transparent)]
    Engine(#[from] EngineError),
}
