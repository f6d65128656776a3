//! State shared between the thread blocked in a recognition call and any
//! thread asking it to stop.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::engine::ProgressUpdate;

/// Receives relayed progress on the managed side.
pub trait ProgressListener: Send + Sync {
    fn on_progress_values(&self, update: ProgressUpdate);
}

impl<F> ProgressListener for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn on_progress_values(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Captured at the start of a call and valid only until it returns.
#[derive(Clone)]
pub(crate) struct CallContext {
    pub(crate) thread: ThreadId,
    pub(crate) listener: Arc<dyn ProgressListener>,
}

#[derive(Default)]
pub(crate) struct CallState {
    cancel_requested: AtomicBool,
    running: AtomicBool,
    last_progress: AtomicI32,
    context: Mutex<Option<CallContext>>,
}

impl CallState {
    fn context(&self) -> MutexGuard<'_, Option<CallContext>> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears any earlier stop request, resets progress, and captures the
    /// calling thread and listener.
    pub(crate) fn begin(&self, listener: Arc<dyn ProgressListener>) {
        self.cancel_requested.store(false, Ordering::SeqCst);
        self.last_progress.store(0, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        *self.context() = Some(CallContext {
            thread: thread::current().id(),
            listener,
        });
    }

    /// Ends the call. Returns whether a stop was observed.
    pub(crate) fn finish(&self) -> bool {
        self.context().take();
        self.last_progress.store(0, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.cancel_requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn request_stop(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.context().take();
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// True from `begin` to `finish`, including after a stop while the engine
    /// has yet to notice it.
    pub(crate) fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The context, if the relay may call into it from the current thread.
    pub(crate) fn valid_context(&self) -> Option<CallContext> {
        if self.cancel_requested() {
            return None;
        }
        let context = self.context().clone()?;
        if context.thread != thread::current().id() {
            return None;
        }
        Some(context)
    }

    pub(crate) fn last_progress(&self) -> i32 {
        self.last_progress.load(Ordering::SeqCst)
    }

    pub(crate) fn record_progress(&self, percent: i32) {
        self.last_progress.fetch_max(percent, Ordering::SeqCst);
    }
}

/// Requests cancellation of the handle's running call from any thread.
///
/// Stopping is cooperative: the call returns once the engine next polls.
#[derive(Clone)]
pub struct StopHandle {
    state: Arc<CallState>,
}

impl StopHandle {
    pub(crate) fn new(state: Arc<CallState>) -> Self {
        Self { state }
    }

    /// Stops the call running now. With no call running the request is
    /// dropped when the next call begins.
    pub fn stop(&self) {
        self.state.request_stop();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state.cancel_requested()
    }
}
