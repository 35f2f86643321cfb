use jobs::{CompletionSignal, EngineError, JobCallbacks, StitchEngine};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use stitch_config::{JobConfiguration, ProcessingMode};
use tracing::debug;

use crate::{SIMULATED_FAILURE, SPAWN_FAILED, UNSUPPORTED_JOB};

#[derive(Debug, Clone)]
pub struct SimulationScript {
    /// Percent added per tick.
    pub step: u8,
    pub interval: Duration,
    /// Report an engine error once progress reaches this value.
    pub fail_at: Option<u8>,
    pub completion: CompletionSignal,
}

impl Default for SimulationScript {
    fn default() -> Self {
        Self {
            step: 5,
            interval: Duration::from_millis(50),
            fail_at: None,
            completion: CompletionSignal::ProgressComplete,
        }
    }
}

/// Pretends to stitch: ticks progress on a worker thread. Still images are
/// stitched synchronously inside `start`, like the SDK's one-shot call.
pub struct SimulatedEngine {
    script: SimulationScript,
    cancelled: Arc<AtomicBool>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SimulatedEngine {
    pub fn new(script: SimulationScript) -> Self {
        Self {
            script,
            cancelled: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn join(&self) {
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    fn finish(script: &SimulationScript, callbacks: &JobCallbacks) {
        callbacks.on_progress(100);
        if script.completion == CompletionSignal::Explicit {
            callbacks.on_done();
        }
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new(SimulationScript::default())
    }
}

impl StitchEngine for SimulatedEngine {
    fn name(&self) -> &str {
        "simulated"
    }

    fn completion_signal(&self) -> CompletionSignal {
        self.script.completion
    }

    fn start(
        &self,
        config: Arc<JobConfiguration>,
        callbacks: JobCallbacks,
    ) -> Result<(), EngineError> {
        self.cancelled.store(false, Ordering::SeqCst);
        match config.mode {
            ProcessingMode::LivePreview => {
                return Err(EngineError::new(
                    UNSUPPORTED_JOB,
                    "use the simulated realtime stitcher for live preview",
                ));
            }
            ProcessingMode::ImageStitch => {
                thread::sleep(self.script.interval);
                Self::finish(&self.script, &callbacks);
                return Ok(());
            }
            ProcessingMode::VideoStitch | ProcessingMode::ImageSequence => {}
        }

        let script = self.script.clone();
        let cancelled = self.cancelled.clone();
        let handle = thread::Builder::new()
            .name("simulated-stitch".into())
            .spawn(move || {
                let step = script.step.max(1);
                let mut progress: u8 = 0;
                loop {
                    thread::sleep(script.interval);
                    if cancelled.load(Ordering::SeqCst) {
                        debug!(progress, "simulated stitch cancelled");
                        callbacks.on_cancelled();
                        return;
                    }
                    progress = progress.saturating_add(step).min(100);
                    if script.fail_at.is_some_and(|at| progress >= at) {
                        callbacks.on_error(
                            SIMULATED_FAILURE,
                            &format!("simulated failure at {progress}%"),
                        );
                        return;
                    }
                    if progress == 100 {
                        Self::finish(&script, &callbacks);
                        return;
                    }
                    callbacks.on_progress(i32::from(progress));
                }
            })
            .map_err(|e| EngineError::new(SPAWN_FAILED, e.to_string()))?;
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
