//! Progress reporting and cooperative cancellation.
//!
//! Long-running stages report coarse progress through a caller-supplied
//! callback and poll a shared cancellation flag at fixed batch boundaries.
//! Checkpointing never changes output values; it only bounds how long a
//! run continues after the caller asks it to stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::CoreError;

/// Beat-domain loops checkpoint every this many beats.
pub const BEAT_BATCH: usize = 50;
/// Sample-domain loops checkpoint every this many samples.
pub const SAMPLE_BATCH: usize = 50_000;

/// Coarse pipeline stages, reported in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BeatDetection,
    PitchTracking,
    BassExtraction,
    Generation,
    Mixing,
    Safety,
    Render,
    Encode,
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub stage: Stage,
    /// 0..100 within the overall operation.
    pub percent: f32,
    pub message: String,
}

/// Cloneable cancellation flag handed to the caller. Raising it makes the
/// running pipeline return `CoreError::Cancelled` at its next checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        CancelHandle::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Owned by a pipeline run: invokes the progress callback synchronously
/// between batches and polls the cancellation flag.
pub struct Monitor {
    callback: Option<Box<dyn FnMut(ProgressUpdate)>>,
    cancel: CancelHandle,
}

impl Default for Monitor {
    fn default() -> Self {
        Monitor {
            callback: None,
            cancel: CancelHandle::new(),
        }
    }
}

impl Monitor {
    /// Monitor that reports nothing and can still be cancelled.
    pub fn silent() -> Self {
        Monitor::default()
    }

    pub fn with_callback(callback: impl FnMut(ProgressUpdate) + 'static) -> Self {
        Monitor {
            callback: Some(Box::new(callback)),
            cancel: CancelHandle::new(),
        }
    }

    /// The flag half to hand to the caller.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn report(&mut self, stage: Stage, percent: f32, message: impl Into<String>) {
        if let Some(cb) = self.callback.as_mut() {
            cb(ProgressUpdate {
                stage,
                percent: percent.clamp(0.0, 100.0),
                message: message.into(),
            });
        }
    }

    /// Poll the cancellation flag. Called at batch boundaries only.
    pub fn checkpoint(&self) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn silent_monitor_checkpoints_ok() {
        let m = Monitor::silent();
        assert!(m.checkpoint().is_ok());
    }

    #[test]
    fn cancel_trips_checkpoint() {
        let m = Monitor::silent();
        let handle = m.cancel_handle();
        handle.cancel();
        assert!(matches!(m.checkpoint(), Err(CoreError::Cancelled)));
    }

    #[test]
    fn callback_receives_updates_in_order() {
        let seen: Rc<RefCell<Vec<(Stage, f32)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut m = Monitor::with_callback(move |u| {
            sink.borrow_mut().push((u.stage, u.percent));
        });
        m.report(Stage::BeatDetection, 0.0, "start");
        m.report(Stage::Generation, 50.0, "halfway");
        m.report(Stage::Mixing, 150.0, "clamped");
        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, Stage::BeatDetection);
        assert_eq!(seen[2].1, 100.0);
    }
}
