//! Latest-frame hand-off from a realtime engine to a display thread.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::FrameEvent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreviewError {
    #[error("preview already running")]
    AlreadyRunning,
    #[error("failed to spawn preview thread: {0}")]
    Spawn(String),
}

#[derive(Default)]
struct SlotState {
    frame: Option<FrameEvent>,
    stopped: bool,
    replaced: u64,
}

/// Single-frame mailbox. Publishing never blocks; a frame the consumer has
/// not picked up yet is replaced by the newer one.
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

impl FrameSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, frame: FrameEvent) {
        let mut state = self.state.lock();
        if state.frame.replace(frame).is_some() {
            state.replaced += 1;
        }
        self.cond.notify_one();
    }

    /// Wait for the next frame. Returns `None` once the slot is stopped.
    pub fn wait_next(&self) -> Option<FrameEvent> {
        let mut state = self.state.lock();
        self.cond
            .wait_while(&mut state, |s| !s.stopped && s.frame.is_none());
        if state.stopped {
            return None;
        }
        state.frame.take()
    }

    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.cond.notify_all();
    }

    fn reopen(&self) {
        let mut state = self.state.lock();
        state.stopped = false;
        state.frame = None;
    }

    /// Frames overwritten before the consumer got to them.
    pub fn replaced_frames(&self) -> u64 {
        self.state.lock().replaced
    }
}

/// Display thread draining a [`FrameSlot`].
pub struct PreviewWorker {
    slot: Arc<FrameSlot>,
    thread: Option<thread::JoinHandle<u64>>,
}

impl PreviewWorker {
    pub fn new(slot: Arc<FrameSlot>) -> Self {
        Self { slot, thread: None }
    }

    pub fn slot(&self) -> Arc<FrameSlot> {
        self.slot.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    pub fn start<F>(&mut self, mut render: F) -> Result<(), PreviewError>
    where
        F: FnMut(FrameEvent) + Send + 'static,
    {
        if self.thread.is_some() {
            return Err(PreviewError::AlreadyRunning);
        }
        self.slot.reopen();
        let slot = self.slot.clone();
        let handle = thread::Builder::new()
            .name("stitch-preview".into())
            .spawn(move || {
                let mut shown = 0u64;
                while let Some(frame) = slot.wait_next() {
                    render(frame);
                    shown += 1;
                }
                shown
            })
            .map_err(|e| PreviewError::Spawn(e.to_string()))?;
        self.thread = Some(handle);
        Ok(())
    }

    /// Stop and join the display thread, returning how many frames it showed.
    pub fn stop(&mut self) -> u64 {
        self.slot.stop();
        let Some(handle) = self.thread.take() else {
            return 0;
        };
        match handle.join() {
            Ok(shown) => {
                debug!(shown, replaced = self.slot.replaced_frames(), "preview stopped");
                shown
            }
            Err(_) => {
                warn!("preview thread panicked");
                0
            }
        }
    }
}

impl Drop for PreviewWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
