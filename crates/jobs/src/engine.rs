use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stitch_config::JobConfiguration;
use thiserror::Error;

use crate::controller::JobCallbacks;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("engine error {code}: {message}")]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// How an engine tells the controller that a job finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionSignal {
    /// A progress report of 100% is the completion signal. Compatibility
    /// mode for engines that never send an explicit done.
    #[default]
    ProgressComplete,
    /// Only `on_done` completes the job; 100% is ordinary progress.
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba,
    Bgra,
    Nv12,
    Yuv420p,
    Other(i32),
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Rgba | PixelFormat::Bgra => Some(4),
            _ => None,
        }
    }
}

/// One stitched frame handed out by a realtime engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEvent {
    pub planes: Vec<Vec<u8>>,
    pub strides: Vec<usize>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub timestamp: i64,
}

/// The external component that performs a stitch.
///
/// `start` hands the engine its configuration and the callback slots. The
/// engine may call back from any thread, any number of times, including from
/// inside `start` itself for one-shot work. Callbacks never block.
pub trait StitchEngine: Send + Sync {
    fn name(&self) -> &str;

    fn completion_signal(&self) -> CompletionSignal {
        CompletionSignal::ProgressComplete
    }

    fn start(
        &self,
        config: Arc<JobConfiguration>,
        callbacks: JobCallbacks,
    ) -> Result<(), EngineError>;

    /// Ask the engine to stop. Advisory: the outcome still arrives through
    /// the callbacks.
    fn cancel(&self);
}
