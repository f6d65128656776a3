//! Process-wide binding made once, before any handle is constructed.

use std::os::raw::{c_int, c_void};
use std::sync::OnceLock;

use tracing::info;

use super::error::record_error;
use crate::bridge::ProgressListener;
use crate::engine::ProgressUpdate;
use crate::logging;

/// Managed-side progress entry point:
/// `(object, percent, left, right, top, bottom)`.
pub type ProgressCallback = extern "C" fn(
    object: *mut c_void,
    percent: c_int,
    left: c_int,
    right: c_int,
    top: c_int,
    bottom: c_int,
);

pub(crate) struct ClassBinding {
    on_progress_values: ProgressCallback,
}

static CLASS: OnceLock<ClassBinding> = OnceLock::new();

pub(crate) fn binding() -> Option<&'static ClassBinding> {
    CLASS.get()
}

/// Binds the progress callback for the lifetime of the process. Returns false
/// when `on_progress_values` is null or a binding already exists; the first
/// binding is never replaced.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_class_init(on_progress_values: Option<ProgressCallback>) -> bool {
    let Some(on_progress_values) = on_progress_values else {
        record_error("progress callback is null");
        return false;
    };
    if CLASS.set(ClassBinding { on_progress_values }).is_err() {
        record_error("class is already initialized");
        return false;
    }
    info!("ext: class initialized");
    true
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_logging_init(verbose: bool) -> bool {
    logging::init(verbose)
}

/// Relays progress to one managed object for the duration of one call.
pub(crate) struct ObjectListener {
    callback: ProgressCallback,
    object: *mut c_void,
}

// The object pointer is opaque here and only handed back to the callback, on
// the thread that started the call.
unsafe impl Send for ObjectListener {}
unsafe impl Sync for ObjectListener {}

impl ObjectListener {
    pub(crate) fn new(binding: &ClassBinding, object: *mut c_void) -> Self {
        Self {
            callback: binding.on_progress_values,
            object,
        }
    }
}

impl ProgressListener for ObjectListener {
    fn on_progress_values(&self, update: ProgressUpdate) {
        (self.callback)(
            self.object,
            update.percent,
            update.left,
            update.right,
            update.top,
            update.bottom,
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Managed object stand-in: the callback appends to it.
    pub(crate) type Events = Mutex<Vec<ProgressUpdate>>;

    extern "C" fn record(
        object: *mut c_void,
        percent: c_int,
        left: c_int,
        right: c_int,
        top: c_int,
        bottom: c_int,
    ) {
        if object.is_null() {
            return;
        }
        let events = unsafe { &*(object as *const Events) };
        events.lock().expect("events").push(ProgressUpdate {
            percent,
            left,
            right,
            top,
            bottom,
        });
    }

    pub(crate) fn bind() {
        let _ = tess_bridge_class_init(Some(record));
        assert!(binding().is_some());
    }

    pub(crate) fn object(events: &Events) -> *mut c_void {
        events as *const Events as *mut c_void
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_is_made_once() {
        testing::bind();
        assert!(!tess_bridge_class_init(None));
        // A second, valid callback does not replace the first.
        testing::bind();
        assert!(binding().is_some());
    }
}
