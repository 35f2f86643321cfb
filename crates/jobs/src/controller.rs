use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use stitch_config::JobConfiguration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{CompletionSignal, EngineError, FrameEvent, StitchEngine};
use crate::ControllerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Submitted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed | Phase::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    Pending,
    Succeeded,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub progress: u8,
    pub terminal: TerminalStatus,
    pub last_error: Option<EngineError>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            progress: 0,
            terminal: TerminalStatus::Pending,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Submitted,
    Running,
    Progress(u8),
    Completed,
    Failed { code: i32, message: String },
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: Uuid,
    pub status: JobStatus,
}

type FrameSink = Box<dyn Fn(FrameEvent) + Send + Sync>;

struct Inner {
    phase: Phase,
    state: JobState,
    cancel_requested: bool,
}

struct Shared {
    id: Uuid,
    completion: CompletionSignal,
    inner: Mutex<Inner>,
    cond: Condvar,
    tx_events: Sender<JobEvent>,
    rx_events: Receiver<JobEvent>,
    frame_sink: RwLock<Option<FrameSink>>,
    config: OnceLock<Arc<JobConfiguration>>,
}

impl Shared {
    fn emit(&self, status: JobStatus) {
        let _ = self.tx_events.send(JobEvent {
            id: self.id,
            status,
        });
    }

    fn enter_running(&self, inner: &mut Inner) {
        if inner.phase == Phase::Submitted {
            inner.phase = Phase::Running;
            self.emit(JobStatus::Running);
        }
    }

    fn finish(&self, inner: &mut Inner, phase: Phase, terminal: TerminalStatus) {
        let status = match (&terminal, &inner.state.last_error) {
            (TerminalStatus::Succeeded, _) => JobStatus::Completed,
            (TerminalStatus::Cancelled, _) => JobStatus::Cancelled,
            (TerminalStatus::Failed(message), err) => JobStatus::Failed {
                code: err.as_ref().map(|e| e.code).unwrap_or(-1),
                message: message.clone(),
            },
            (TerminalStatus::Pending, _) => return,
        };
        inner.phase = phase;
        inner.state.terminal = terminal;
        self.emit(status);
        self.cond.notify_all();
    }

    /// Callbacks only act on a job that has been handed to the engine and
    /// has not reached a terminal state yet.
    fn accepts_callbacks(inner: &Inner) -> bool {
        !(inner.phase == Phase::Idle || inner.phase.is_terminal())
    }
}

/// Callback slots handed to the engine. Cheap to clone; every method takes
/// the state lock briefly and returns without blocking.
#[derive(Clone)]
pub struct JobCallbacks {
    shared: Arc<Shared>,
}

impl JobCallbacks {
    pub fn job_id(&self) -> Uuid {
        self.shared.id
    }

    pub fn on_progress(&self, percent: i32) {
        let percent = percent.clamp(0, 100) as u8;
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        if !Shared::accepts_callbacks(&inner) {
            return;
        }
        shared.enter_running(&mut inner);
        if inner.state.progress != percent {
            inner.state.progress = percent;
            shared.emit(JobStatus::Progress(percent));
        }
        if percent == 100 && shared.completion == CompletionSignal::ProgressComplete {
            shared.finish(&mut inner, Phase::Completed, TerminalStatus::Succeeded);
        }
    }

    pub fn on_error(&self, code: i32, message: &str) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        if !Shared::accepts_callbacks(&inner) {
            debug!(job = %shared.id, code, "ignoring engine error after terminal state");
            return;
        }
        shared.enter_running(&mut inner);
        inner.state.last_error = Some(EngineError::new(code, message));
        if inner.cancel_requested {
            shared.finish(&mut inner, Phase::Cancelled, TerminalStatus::Cancelled);
        } else {
            shared.finish(
                &mut inner,
                Phase::Failed,
                TerminalStatus::Failed(message.to_string()),
            );
        }
    }

    /// Explicit completion from engines that report it.
    pub fn on_done(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        if !Shared::accepts_callbacks(&inner) {
            return;
        }
        shared.enter_running(&mut inner);
        shared.finish(&mut inner, Phase::Completed, TerminalStatus::Succeeded);
    }

    /// Engine acknowledgement of a cancel request.
    pub fn on_cancelled(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        if !Shared::accepts_callbacks(&inner) {
            return;
        }
        shared.enter_running(&mut inner);
        shared.finish(&mut inner, Phase::Cancelled, TerminalStatus::Cancelled);
    }

    pub fn on_frame(&self, frame: FrameEvent) {
        if let Some(sink) = self.shared.frame_sink.read().as_ref() {
            sink(frame);
        }
    }
}

/// Owns the lifecycle of one stitch job driven by an external engine.
///
/// `Idle -> Submitted -> Running -> {Completed, Failed, Cancelled}`. The first
/// terminal signal wins; later ones are ignored.
#[derive(Clone)]
pub struct JobController {
    engine: Arc<dyn StitchEngine>,
    shared: Arc<Shared>,
}

impl JobController {
    pub fn new(engine: Arc<dyn StitchEngine>) -> Self {
        let (tx_events, rx_events) = unbounded::<JobEvent>();
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            completion: engine.completion_signal(),
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                state: JobState::default(),
                cancel_requested: false,
            }),
            cond: Condvar::new(),
            tx_events,
            rx_events,
            frame_sink: RwLock::new(None),
            config: OnceLock::new(),
        });
        Self { engine, shared }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Listener side of the event stream. Progress events are already
    /// coalesced; every receiver clone competes for the same events.
    pub fn events(&self) -> Receiver<JobEvent> {
        self.shared.rx_events.clone()
    }

    pub fn set_frame_sink<F>(&self, sink: F)
    where
        F: Fn(FrameEvent) + Send + Sync + 'static,
    {
        *self.shared.frame_sink.write() = Some(Box::new(sink));
    }

    pub fn config(&self) -> Option<Arc<JobConfiguration>> {
        self.shared.config.get().cloned()
    }

    pub fn submit(&self, config: JobConfiguration) -> Result<Uuid, ControllerError> {
        let shared = &self.shared;
        {
            let mut inner = shared.inner.lock();
            if inner.phase != Phase::Idle {
                return Err(ControllerError::AlreadySubmitted);
            }
            inner.phase = Phase::Submitted;
            shared.emit(JobStatus::Submitted);
        }

        let config = Arc::new(config);
        let _ = shared.config.set(config.clone());
        info!(
            job = %shared.id,
            engine = self.engine.name(),
            inputs = config.inputs.len(),
            "submitting stitch job"
        );

        let callbacks = JobCallbacks {
            shared: shared.clone(),
        };
        let started = self.engine.start(config, callbacks);

        let mut inner = shared.inner.lock();
        match started {
            Ok(()) => {
                shared.enter_running(&mut inner);
                // A cancel issued while `start` ran may have been cleared by
                // the engine.
                let resend_cancel = inner.cancel_requested && !inner.phase.is_terminal();
                drop(inner);
                if resend_cancel {
                    debug!(job = %shared.id, "forwarding cancel requested during start");
                    self.engine.cancel();
                }
                Ok(shared.id)
            }
            Err(err) => {
                warn!(job = %shared.id, "engine refused job: {err}");
                if !inner.phase.is_terminal() {
                    inner.state.last_error = Some(err.clone());
                    shared.finish(
                        &mut inner,
                        Phase::Failed,
                        TerminalStatus::Failed(err.message.clone()),
                    );
                }
                Err(ControllerError::Engine(err))
            }
        }
    }

    /// Request cancellation. A no-op once the job is terminal; the terminal
    /// transition itself arrives through the engine callbacks.
    pub fn cancel(&self) -> Result<(), ControllerError> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.phase == Phase::Idle {
                return Err(ControllerError::NotSubmitted);
            }
            if inner.phase.is_terminal() || inner.cancel_requested {
                return Ok(());
            }
            inner.cancel_requested = true;
        }
        info!(job = %self.shared.id, "cancel requested");
        self.engine.cancel();
        Ok(())
    }

    pub fn cancel_requested(&self) -> bool {
        self.shared.inner.lock().cancel_requested
    }

    /// Block until the job reaches a terminal state or `timeout` elapses.
    ///
    /// Without a timeout this waits for as long as the engine stays silent.
    pub fn wait_until_terminal(&self, timeout: Option<Duration>) -> JobState {
        let mut inner = self.shared.inner.lock();
        match timeout {
            None => {
                self.shared
                    .cond
                    .wait_while(&mut inner, |inner| !inner.phase.is_terminal());
            }
            Some(timeout) => {
                let result = self.shared.cond.wait_while_for(
                    &mut inner,
                    |inner| !inner.phase.is_terminal(),
                    timeout,
                );
                if result.timed_out() {
                    debug!(job = %self.shared.id, ?timeout, "wait timed out");
                }
            }
        }
        inner.state.clone()
    }

    pub fn progress(&self) -> u8 {
        self.shared.inner.lock().state.progress
    }

    pub fn phase(&self) -> Phase {
        self.shared.inner.lock().phase
    }

    pub fn state(&self) -> JobState {
        self.shared.inner.lock().state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::path::PathBuf;
    use stitch_config::{ConfigBuilder, RawOptions};

    /// Engine that records calls and leaves all callbacks to the test.
    #[derive(Default)]
    struct ManualEngine {
        completion: CompletionSignal,
        callbacks: PlMutex<Option<JobCallbacks>>,
        cancels: PlMutex<u32>,
        refuse: bool,
        /// Acknowledge a cancel before `start` returns.
        cancel_in_start: bool,
    }

    impl StitchEngine for ManualEngine {
        fn name(&self) -> &str {
            "manual"
        }

        fn completion_signal(&self) -> CompletionSignal {
            self.completion
        }

        fn start(
            &self,
            _config: Arc<JobConfiguration>,
            callbacks: JobCallbacks,
        ) -> Result<(), EngineError> {
            if self.refuse {
                return Err(EngineError::new(7, "no licence"));
            }
            if self.cancel_in_start {
                callbacks.on_cancelled();
            }
            *self.callbacks.lock() = Some(callbacks);
            Ok(())
        }

        fn cancel(&self) {
            *self.cancels.lock() += 1;
        }
    }

    impl ManualEngine {
        fn callbacks(&self) -> JobCallbacks {
            self.callbacks.lock().clone().unwrap()
        }
    }

    fn config() -> JobConfiguration {
        ConfigBuilder::new(RawOptions {
            inputs: vec!["a.insv".to_string()],
            output: Some("out.mp4".to_string()),
            ..RawOptions::default()
        })
        .build()
        .unwrap()
    }

    #[test]
    fn test_progress_before_submit_is_zero() {
        let controller = JobController::new(Arc::new(ManualEngine::default()));
        assert_eq!(controller.progress(), 0);
        assert_eq!(controller.phase(), Phase::Idle);
        assert!(controller.config().is_none());
    }

    #[test]
    fn test_submit_twice() {
        let controller = JobController::new(Arc::new(ManualEngine::default()));
        controller.submit(config()).unwrap();
        assert_eq!(controller.phase(), Phase::Running);
        assert_eq!(
            controller.config().unwrap().inputs,
            vec![PathBuf::from("a.insv")]
        );
        assert!(matches!(
            controller.submit(config()),
            Err(ControllerError::AlreadySubmitted)
        ));
    }

    #[test]
    fn test_engine_refusal_fails_job() {
        let engine = Arc::new(ManualEngine {
            refuse: true,
            ..ManualEngine::default()
        });
        let controller = JobController::new(engine);
        let err = controller.submit(config()).unwrap_err();
        assert!(matches!(err, ControllerError::Engine(ref e) if e.code == 7));
        let state = controller.wait_until_terminal(Some(Duration::from_millis(10)));
        assert_eq!(state.terminal, TerminalStatus::Failed("no licence".to_string()));
        assert_eq!(controller.phase(), Phase::Failed);
    }

    #[test]
    fn test_cancel_before_submit() {
        let controller = JobController::new(Arc::new(ManualEngine::default()));
        assert!(matches!(
            controller.cancel(),
            Err(ControllerError::NotSubmitted)
        ));
    }

    #[test]
    fn test_cancel_forwards_once() {
        let engine = Arc::new(ManualEngine::default());
        let controller = JobController::new(engine.clone());
        controller.submit(config()).unwrap();
        controller.cancel().unwrap();
        controller.cancel().unwrap();
        assert_eq!(*engine.cancels.lock(), 1);
        assert!(controller.cancel_requested());
        assert_eq!(controller.phase(), Phase::Running);

        engine.callbacks().on_cancelled();
        let state = controller.wait_until_terminal(None);
        assert_eq!(state.terminal, TerminalStatus::Cancelled);
    }

    #[test]
    fn test_cancel_acknowledged_during_start_passes_through_running() {
        let engine = Arc::new(ManualEngine {
            cancel_in_start: true,
            ..ManualEngine::default()
        });
        let controller = JobController::new(engine);
        let events = controller.events();
        controller.submit(config()).unwrap();
        assert_eq!(controller.phase(), Phase::Cancelled);
        let statuses: Vec<JobStatus> = events.try_iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Submitted, JobStatus::Running, JobStatus::Cancelled]
        );
    }

    #[test]
    fn test_error_after_cancel_reports_cancelled() {
        let engine = Arc::new(ManualEngine::default());
        let controller = JobController::new(engine.clone());
        controller.submit(config()).unwrap();
        controller.cancel().unwrap();
        engine.callbacks().on_error(-3, "interrupted");
        let state = controller.wait_until_terminal(None);
        assert_eq!(state.terminal, TerminalStatus::Cancelled);
        assert_eq!(state.last_error, Some(EngineError::new(-3, "interrupted")));
    }

    #[test]
    fn test_explicit_completion_ignores_hundred_percent() {
        let engine = Arc::new(ManualEngine {
            completion: CompletionSignal::Explicit,
            ..ManualEngine::default()
        });
        let controller = JobController::new(engine.clone());
        controller.submit(config()).unwrap();
        engine.callbacks().on_progress(100);
        assert_eq!(controller.progress(), 100);
        assert_eq!(controller.phase(), Phase::Running);

        engine.callbacks().on_done();
        assert_eq!(controller.phase(), Phase::Completed);
    }

    #[test]
    fn test_progress_is_clamped() {
        let engine = Arc::new(ManualEngine {
            completion: CompletionSignal::Explicit,
            ..ManualEngine::default()
        });
        let controller = JobController::new(engine.clone());
        controller.submit(config()).unwrap();
        engine.callbacks().on_progress(250);
        assert_eq!(controller.progress(), 100);
        engine.callbacks().on_progress(-4);
        assert_eq!(controller.progress(), 0);
    }

    #[test]
    fn test_frames_reach_sink() {
        let engine = Arc::new(ManualEngine::default());
        let controller = JobController::new(engine.clone());
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink_seen = seen.clone();
        controller.set_frame_sink(move |frame| sink_seen.lock().push(frame.timestamp));
        controller.submit(config()).unwrap();
        for ts in [1, 2, 3] {
            engine.callbacks().on_frame(FrameEvent {
                planes: vec![vec![0; 16]],
                strides: vec![8],
                width: 2,
                height: 2,
                format: crate::PixelFormat::Rgba,
                timestamp: ts,
            });
        }
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }
}
