//! Failure reporting at the C ABI: every entry point degrades to a sentinel
//! (`false`, null, `-1`) and leaves the reason in a per-thread slot.

use std::any::Any;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use tracing::error;

thread_local! {
    static FAILURE: RefCell<Option<String>> = const { RefCell::new(None) };
}

pub(crate) fn record_error(message: impl Into<String>) {
    FAILURE.with(|slot| slot.replace(Some(message.into())));
}

/// Owned copy of a caller string, `None` for null.
pub(crate) fn read_c_str(value: *const c_char) -> Option<String> {
    if value.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(value) }.to_string_lossy().into_owned())
}

/// Like [`read_c_str`], recording `"{name} is null"` when absent.
pub(crate) fn required_str(name: &str, value: *const c_char) -> Option<String> {
    read_c_str(value).or_else(|| {
        record_error(format!("{name} is null"));
        None
    })
}

/// Hands `value` to the caller, who releases it with `tess_bridge_free_string`.
pub(crate) fn into_c_string(value: &str) -> *mut c_char {
    CString::new(value).map_or_else(
        |_| {
            record_error("string contains a NUL byte");
            ptr::null_mut()
        },
        CString::into_raw,
    )
}

fn describe_panic(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Runs `body`, turning a panic into `fallback` so nothing unwinds into the caller.
pub(crate) fn guarded<T>(fallback: T, body: impl FnOnce() -> T) -> T {
    panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        let message = describe_panic(payload.as_ref());
        error!("ext: panic at the boundary: {message}");
        record_error(format!("internal error: {message}"));
        fallback
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_free_string(value: *mut c_char) {
    if !value.is_null() {
        drop(unsafe { CString::from_raw(value) });
    }
}

/// Reason for the most recent failure on this thread, or null. Reading it
/// clears the slot.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_last_error_message() -> *mut c_char {
    FAILURE
        .with(|slot| slot.take())
        .map_or(ptr::null_mut(), |message| into_c_string(&message))
}

#[cfg(test)]
pub(crate) fn last_error() -> Option<String> {
    FAILURE.with(|slot| slot.take())
}
