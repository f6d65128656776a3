use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::sync::Arc;

use super::class::{ObjectListener, binding};
use super::error::{guarded, into_c_string, record_error};
use super::handle::{ExtHandle, handle_ref};
use crate::bridge::{BridgeError, ProgressListener};

fn listener_for(object: *mut c_void) -> Option<Arc<dyn ProgressListener>> {
    let Some(binding) = binding() else {
        record_error("class is not initialized");
        return None;
    };
    Some(Arc::new(ObjectListener::new(binding, object)))
}

fn text_or_null(result: Result<String, BridgeError>) -> *mut c_char {
    match result {
        Ok(text) => into_c_string(&text),
        Err(err) => {
            record_error(err.to_string());
            ptr::null_mut()
        }
    }
}

/// Recognizes the current image. Blocks until the engine finishes or observes
/// `tess_bridge_stop`; progress is delivered to `object` through the class
/// callback on this thread. Returns null on failure.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_get_utf8_text(
    handle: *const ExtHandle,
    object: *mut c_void,
) -> *mut c_char {
    guarded(ptr::null_mut(), || {
        let Some(handle) = handle_ref(handle) else {
            return ptr::null_mut();
        };
        let Some(listener) = listener_for(object) else {
            return ptr::null_mut();
        };
        text_or_null(handle.utf8_text(listener))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_get_hocr_text(
    handle: *const ExtHandle,
    object: *mut c_void,
    page: c_int,
) -> *mut c_char {
    guarded(ptr::null_mut(), || {
        let Some(handle) = handle_ref(handle) else {
            return ptr::null_mut();
        };
        let Some(listener) = listener_for(object) else {
            return ptr::null_mut();
        };
        text_or_null(handle.hocr_text(page, listener))
    })
}

/// Box-file text for `page`. Not cancelable and reports no progress.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_get_box_text(handle: *const ExtHandle, page: c_int) -> *mut c_char {
    guarded(ptr::null_mut(), || {
        let Some(handle) = handle_ref(handle) else {
            return ptr::null_mut();
        };
        text_or_null(handle.box_text(page))
    })
}

/// Mean confidence (0-100) of the last recognition, -1 before any.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_mean_confidence(handle: *const ExtHandle) -> c_int {
    guarded(-1, || {
        handle_ref(handle)
            .and_then(|handle| handle.mean_confidence())
            .unwrap_or(-1)
    })
}

/// Per-word confidences of the last recognition. Writes the element count to
/// `out_len` and returns an array to release with
/// `tess_bridge_free_int_array`, or null (count 0) when there are none.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_word_confidences(
    handle: *const ExtHandle,
    out_len: *mut usize,
) -> *mut c_int {
    guarded(ptr::null_mut(), || {
        let confidences = handle_ref(handle)
            .map(|handle| handle.word_confidences())
            .unwrap_or_default();
        let len = confidences.len();
        if let Some(out_len) = unsafe { out_len.as_mut() } {
            *out_len = len;
        }
        if len == 0 {
            return ptr::null_mut();
        }
        Box::into_raw(confidences.into_boxed_slice()) as *mut c_int
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_free_int_array(values: *mut c_int, len: usize) {
    if values.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(values, len)));
    }
}
