use jobs::{CompletionSignal, EngineError, JobCallbacks, StitchEngine};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use stitch_config::{JobConfiguration, ProcessingMode};
use tracing::{debug, info, trace, warn};

use crate::{sdk_args, REPORTED_ERROR, SPAWN_FAILED, UNSUPPORTED_JOB};

cfg_if::cfg_if! {
    if #[cfg(target_os = "windows")] {
        const LIBRARY_PATH_VAR: &str = "PATH";
    } else if #[cfg(target_os = "macos")] {
        const LIBRARY_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
    } else {
        const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Progress(i32),
    Error(String),
    Other(String),
}

/// Classify one line of stitcher output.
pub fn parse_output_line(line: &str) -> OutputLine {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("process = ") {
        if let Ok(value) = rest.trim_end_matches('%').trim().parse::<i32>() {
            return OutputLine::Progress(value);
        }
    }
    if let Some(message) = line.strip_prefix("error: ") {
        return OutputLine::Error(message.to_string());
    }
    OutputLine::Other(line.to_string())
}

/// Runs the SDK's command-line stitcher for one job.
///
/// Completion is the child's exit status, so 100% progress alone does not
/// finish the job.
pub struct ProcessEngine {
    binary: PathBuf,
    library_dirs: Vec<PathBuf>,
    working_dir: Option<PathBuf>,
    child: Arc<Mutex<Option<Child>>>,
    cancelled: Arc<AtomicBool>,
    reader: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ProcessEngine {
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            library_dirs: Vec::new(),
            working_dir: None,
            child: Arc::new(Mutex::new(None)),
            cancelled: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        }
    }

    pub fn with_library_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.library_dirs = dirs;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    fn library_path(&self) -> Option<OsString> {
        if self.library_dirs.is_empty() {
            return None;
        }
        let existing = std::env::var_os(LIBRARY_PATH_VAR);
        let inherited = existing
            .iter()
            .flat_map(|value| std::env::split_paths(value).collect::<Vec<_>>());
        std::env::join_paths(self.library_dirs.iter().cloned().chain(inherited)).ok()
    }

    /// Wait for the reader thread of the last job to finish.
    pub fn join(&self) {
        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }
    }
}

impl StitchEngine for ProcessEngine {
    fn name(&self) -> &str {
        "media-sdk-process"
    }

    fn completion_signal(&self) -> CompletionSignal {
        CompletionSignal::Explicit
    }

    fn start(
        &self,
        config: Arc<JobConfiguration>,
        callbacks: JobCallbacks,
    ) -> Result<(), EngineError> {
        if config.mode == ProcessingMode::LivePreview {
            return Err(EngineError::new(
                UNSUPPORTED_JOB,
                "live preview needs the realtime stitcher, not the command-line one",
            ));
        }

        let mut cmd = Command::new(&self.binary);
        cmd.args(sdk_args(&config))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(path) = self.library_path() {
            cmd.env(LIBRARY_PATH_VAR, path);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            EngineError::new(
                SPAWN_FAILED,
                format!("failed to start {}: {e}", self.binary.display()),
            )
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            EngineError::new(SPAWN_FAILED, "stitcher stdout was not captured")
        })?;
        info!(pid = child.id(), binary = %self.binary.display(), "stitcher started");

        self.cancelled.store(false, Ordering::SeqCst);
        *self.child.lock() = Some(child);

        let child = self.child.clone();
        let cancelled = self.cancelled.clone();
        let handle = thread::Builder::new()
            .name("stitcher-output".into())
            .spawn(move || {
                let reported_error = pump_output(stdout, &callbacks);
                let Some(mut child) = child.lock().take() else {
                    return;
                };
                match child.wait() {
                    Ok(status) if status.success() => callbacks.on_done(),
                    _ if cancelled.load(Ordering::SeqCst) => callbacks.on_cancelled(),
                    Ok(status) if !reported_error => {
                        warn!(%status, "stitcher exited abnormally");
                        callbacks.on_error(
                            status.code().unwrap_or(REPORTED_ERROR),
                            &format!("stitcher exited with {status}"),
                        );
                    }
                    Ok(_) => {}
                    Err(e) => callbacks.on_error(REPORTED_ERROR, &e.to_string()),
                }
            })
            .map_err(|e| EngineError::new(SPAWN_FAILED, e.to_string()))?;
        *self.reader.lock() = Some(handle);
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(child) = self.child.lock().as_mut() {
            debug!(pid = child.id(), "killing stitcher");
            if let Err(e) = child.kill() {
                warn!("failed to kill stitcher: {e}");
            }
        }
    }
}

/// Forward stitcher output to the callbacks until EOF. Progress lines are
/// terminated by `\r`, everything else by `\n`. Returns whether the
/// stitcher reported an error.
fn pump_output<R: Read>(mut stdout: R, callbacks: &JobCallbacks) -> bool {
    let mut reported_error = false;
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    let handle_line = |raw: &[u8], reported_error: &mut bool| {
        if raw.is_empty() {
            return;
        }
        match parse_output_line(&String::from_utf8_lossy(raw)) {
            OutputLine::Progress(p) => callbacks.on_progress(p),
            OutputLine::Error(message) => {
                *reported_error = true;
                callbacks.on_error(REPORTED_ERROR, &message);
            }
            OutputLine::Other(line) if !line.is_empty() => trace!(target: "stitcher", "{line}"),
            OutputLine::Other(_) => {}
        }
    };

    loop {
        let n = match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("reading stitcher output failed: {e}");
                break;
            }
        };
        pending.extend_from_slice(&buf[..n]);
        while let Some(pos) = pending.iter().position(|b| *b == b'\r' || *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            handle_line(&line[..line.len() - 1], &mut reported_error);
        }
    }
    handle_line(&pending, &mut reported_error);
    reported_error
}
