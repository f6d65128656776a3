use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr;

use tracing::info;

use super::class::binding;
use super::error::{guarded, into_c_string, read_c_str, record_error, required_str};
use crate::bridge::NativeHandle;
use crate::engine::Engine;
use crate::settings;

/// Native half of one managed object. The caller stores the pointer and passes
/// it back on every call.
pub struct ExtHandle {
    pub(crate) inner: NativeHandle,
}

pub(crate) fn handle_ref<'a>(handle: *const ExtHandle) -> Option<&'a NativeHandle> {
    match unsafe { handle.as_ref() } {
        Some(handle) => Some(&handle.inner),
        None => {
            record_error("handle is null");
            None
        }
    }
}

#[cfg(feature = "tesseract")]
fn default_engine() -> Result<Box<dyn Engine>, String> {
    crate::engine::tesseract::TesseractEngine::new()
        .map(|engine| Box::new(engine) as Box<dyn Engine>)
        .ok_or_else(|| "failed to create tesseract instance".to_string())
}

#[cfg(not(feature = "tesseract"))]
fn default_engine() -> Result<Box<dyn Engine>, String> {
    Err("built without the tesseract feature".to_string())
}

pub(crate) fn construct_with(engine: Box<dyn Engine>) -> *mut ExtHandle {
    if binding().is_none() {
        record_error("class is not initialized; call tess_bridge_class_init first");
        return ptr::null_mut();
    }
    let handle = Box::into_raw(Box::new(ExtHandle {
        inner: NativeHandle::from_boxed(engine),
    }));
    info!("ext: constructed handle {handle:p}");
    handle
}

/// Returns a new handle, or null (see `tess_bridge_last_error_message`) when
/// the class is not initialized or the engine cannot be created.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_construct() -> *mut ExtHandle {
    guarded(ptr::null_mut(), || match default_engine() {
        Ok(engine) => construct_with(engine),
        Err(message) => {
            record_error(message);
            ptr::null_mut()
        }
    })
}

/// Releases the image buffer and the engine. Must be called exactly once per
/// handle; the pointer is invalid afterwards.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_finalize(handle: *mut ExtHandle) {
    if handle.is_null() {
        return;
    }
    guarded((), || unsafe {
        drop(Box::from_raw(handle));
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_init(
    handle: *const ExtHandle,
    datapath: *const c_char,
    language: *const c_char,
) -> bool {
    guarded(false, || {
        let Some(handle) = handle_ref(handle) else {
            return false;
        };
        let datapath = read_c_str(datapath).unwrap_or_default();
        let Some(language) = required_str("language", language) else {
            return false;
        };
        match handle.init(&datapath, &language) {
            Ok(()) => true,
            Err(err) => {
                record_error(err.to_string());
                false
            }
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_init_oem(
    handle: *const ExtHandle,
    datapath: *const c_char,
    language: *const c_char,
    mode: c_int,
) -> bool {
    guarded(false, || {
        let Some(handle) = handle_ref(handle) else {
            return false;
        };
        let datapath = read_c_str(datapath).unwrap_or_default();
        let Some(language) = required_str("language", language) else {
            return false;
        };
        match handle.init_with_raw_mode(&datapath, &language, mode) {
            Ok(()) => true,
            Err(err) => {
                record_error(err.to_string());
                false
            }
        }
    })
}

/// Initializes and configures the handle from layered settings files plus
/// `settings_path` (may be null).
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_configure(
    handle: *const ExtHandle,
    settings_path: *const c_char,
) -> bool {
    guarded(false, || {
        let Some(handle) = handle_ref(handle) else {
            return false;
        };
        let path = read_c_str(settings_path);
        let loaded = settings::load_settings(path.as_deref().map(Path::new));
        let settings = match loaded {
            Ok(settings) => settings,
            Err(err) => {
                record_error(format!("{err:#}"));
                return false;
            }
        };
        match handle.configure(&settings) {
            Ok(()) => true,
            Err(err) => {
                record_error(err.to_string());
                false
            }
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_get_init_languages(handle: *const ExtHandle) -> *mut c_char {
    guarded(ptr::null_mut(), || {
        let Some(handle) = handle_ref(handle) else {
            return ptr::null_mut();
        };
        into_c_string(&handle.init_languages().unwrap_or_default())
    })
}

/// Copies `len` bytes from `data`; the caller's buffer may be released as soon
/// as this returns. Must not be called while a recognition call is running on
/// the same handle.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_set_image_bytes(
    handle: *const ExtHandle,
    data: *const u8,
    len: usize,
    width: c_int,
    height: c_int,
    bytes_per_pixel: c_int,
    bytes_per_line: c_int,
) -> bool {
    guarded(false, || {
        let Some(handle) = handle_ref(handle) else {
            return false;
        };
        if data.is_null() {
            record_error("image data is null");
            return false;
        }
        let bytes = unsafe { std::slice::from_raw_parts(data, len) };
        match handle.set_image_bytes(bytes, width, height, bytes_per_pixel, bytes_per_line) {
            Ok(()) => true,
            Err(err) => {
                record_error(err.to_string());
                false
            }
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_set_rectangle(
    handle: *const ExtHandle,
    left: c_int,
    top: c_int,
    width: c_int,
    height: c_int,
) {
    guarded((), || {
        if let Some(handle) = handle_ref(handle) {
            handle.set_rectangle(left, top, width, height);
        }
    })
}

/// Requests the running recognition call to stop. Callable from any thread.
/// Without a running call this does nothing: the next recognition call clears
/// the request when it begins.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_stop(handle: *const ExtHandle) {
    if let Some(handle) = handle_ref(handle) {
        handle.stop();
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_set_variable(
    handle: *const ExtHandle,
    name: *const c_char,
    value: *const c_char,
) -> bool {
    guarded(false, || {
        let Some(handle) = handle_ref(handle) else {
            return false;
        };
        let Some(name) = required_str("name", name) else {
            return false;
        };
        let Some(value) = required_str("value", value) else {
            return false;
        };
        handle.set_variable(&name, &value)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_set_debug(handle: *const ExtHandle, debug: bool) {
    if let Some(handle) = handle_ref(handle) {
        handle.set_debug(debug);
    }
}

/// Current page segmentation mode, or -1 for a null handle.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_get_page_seg_mode(handle: *const ExtHandle) -> c_int {
    guarded(-1, || match handle_ref(handle) {
        Some(handle) => handle.page_seg_mode() as c_int,
        None => -1,
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_set_page_seg_mode(handle: *const ExtHandle, mode: c_int) -> bool {
    guarded(false, || {
        let Some(handle) = handle_ref(handle) else {
            return false;
        };
        match handle.set_raw_page_seg_mode(mode) {
            Ok(()) => true,
            Err(err) => {
                record_error(err.to_string());
                false
            }
        }
    })
}

macro_rules! handle_set_string {
    ($name:ident, $label:literal, $method:ident) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn $name(handle: *const ExtHandle, value: *const c_char) {
            guarded((), || {
                let Some(handle) = handle_ref(handle) else {
                    return;
                };
                if let Some(value) = required_str($label, value) {
                    handle.$method(&value);
                }
            })
        }
    };
}

handle_set_string!(tess_bridge_set_input_name, "input name", set_input_name);
handle_set_string!(tess_bridge_set_output_name, "output name", set_output_name);
handle_set_string!(tess_bridge_read_config_file, "config file", read_config_file);

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_clear(handle: *const ExtHandle) {
    guarded((), || {
        if let Some(handle) = handle_ref(handle) {
            handle.clear();
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_end(handle: *const ExtHandle) {
    guarded((), || {
        if let Some(handle) = handle_ref(handle) {
            handle.end();
        }
    })
}
