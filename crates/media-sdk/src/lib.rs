//! Engine adapters for the panoramic stitching SDK.
//!
//! The SDK itself is closed; [`ProcessEngine`] drives its command-line
//! stitcher as a child process, while [`SimulatedEngine`] and
//! [`SimulatedCamera`] stand in for it when it is not installed.

use std::path::PathBuf;
use thiserror::Error;

mod args;
mod camera;
mod process;
mod simulated;

pub use args::sdk_args;
pub use camera::{SimulatedCamera, SimulatedRealtimeStitcher};
pub use process::{parse_output_line, OutputLine, ProcessEngine};
pub use simulated::{SimulatedEngine, SimulationScript};

/// Name of the SDK's demo stitcher binary when looked up on `PATH`.
pub const DEFAULT_BINARY: &str = "MediaSDKTest";

/// Error code reported for failures the SDK printed itself.
pub const REPORTED_ERROR: i32 = -1;
/// Error code for a stitcher process that could not be started.
pub const SPAWN_FAILED: i32 = -100;
/// Error code for a job the adapter cannot express to the SDK.
pub const UNSUPPORTED_JOB: i32 = -101;
/// Error code used by the simulated engine's scripted failure.
pub const SIMULATED_FAILURE: i32 = -200;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("stitcher binary not found: {0}")]
    BinaryNotFound(String),
    #[error("failed to start stitcher: {0}")]
    Spawn(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Find the stitcher binary: an explicit path wins, otherwise search `PATH`.
pub fn locate_binary(explicit: Option<&std::path::Path>) -> Result<PathBuf, SdkError> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(SdkError::BinaryNotFound(path.display().to_string())),
        None => which::which(DEFAULT_BINARY)
            .map_err(|_| SdkError::BinaryNotFound(DEFAULT_BINARY.to_string())),
    }
}
