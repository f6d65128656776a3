//! libtesseract bound through its C API.
//!
//! Linking is configured by `build.rs` (`TESSERACT_LIB_DIR`, `TESSERACT_LIB_NAME`).

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_float, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;

use tracing::warn;

use super::{
    BoundingBox, Choice, Engine, EngineMode, ImageView, Monitor, PageIteratorLevel, PageSegMode,
    ProgressUpdate, Rectangle, ResultIterator,
};

#[repr(C)]
pub struct TessBaseApi {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TessMonitor {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TessResultIterator {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TessPageIterator {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TessChoiceIterator {
    _private: [u8; 0],
}

type TessCancelFunc = extern "C" fn(cancel_this: *mut c_void, words: c_int) -> bool;
type TessProgressFunc = extern "C" fn(
    monitor: *mut TessMonitor,
    left: c_int,
    right: c_int,
    top: c_int,
    bottom: c_int,
) -> bool;

unsafe extern "C" {
    fn TessBaseAPICreate() -> *mut TessBaseApi;
    fn TessBaseAPIDelete(handle: *mut TessBaseApi);
    fn TessBaseAPIInit2(
        handle: *mut TessBaseApi,
        datapath: *const c_char,
        language: *const c_char,
        oem: c_int,
    ) -> c_int;
    fn TessBaseAPIGetInitLanguagesAsString(handle: *const TessBaseApi) -> *const c_char;
    fn TessBaseAPISetImage(
        handle: *mut TessBaseApi,
        imagedata: *const u8,
        width: c_int,
        height: c_int,
        bytes_per_pixel: c_int,
        bytes_per_line: c_int,
    );
    fn TessBaseAPISetRectangle(
        handle: *mut TessBaseApi,
        left: c_int,
        top: c_int,
        width: c_int,
        height: c_int,
    );
    fn TessBaseAPIRecognize(handle: *mut TessBaseApi, monitor: *mut TessMonitor) -> c_int;
    fn TessBaseAPIGetUTF8Text(handle: *mut TessBaseApi) -> *mut c_char;
    fn TessBaseAPIGetHOCRText(handle: *mut TessBaseApi, page: c_int) -> *mut c_char;
    fn TessBaseAPIGetBoxText(handle: *mut TessBaseApi, page: c_int) -> *mut c_char;
    fn TessBaseAPIMeanTextConf(handle: *mut TessBaseApi) -> c_int;
    fn TessBaseAPIAllWordConfidences(handle: *mut TessBaseApi) -> *mut c_int;
    fn TessBaseAPISetVariable(
        handle: *mut TessBaseApi,
        name: *const c_char,
        value: *const c_char,
    ) -> c_int;
    fn TessBaseAPISetPageSegMode(handle: *mut TessBaseApi, mode: c_int);
    fn TessBaseAPIGetPageSegMode(handle: *const TessBaseApi) -> c_int;
    fn TessBaseAPIGetIterator(handle: *mut TessBaseApi) -> *mut TessResultIterator;
    fn TessBaseAPISetInputName(handle: *mut TessBaseApi, name: *const c_char);
    fn TessBaseAPISetOutputName(handle: *mut TessBaseApi, name: *const c_char);
    fn TessBaseAPIReadConfigFile(handle: *mut TessBaseApi, filename: *const c_char);
    fn TessBaseAPIClear(handle: *mut TessBaseApi);
    fn TessBaseAPIClearAdaptiveClassifier(handle: *mut TessBaseApi);
    fn TessBaseAPIEnd(handle: *mut TessBaseApi);
    fn TessDeleteText(text: *const c_char);
    fn TessDeleteIntArray(arr: *const c_int);

    fn TessMonitorCreate() -> *mut TessMonitor;
    fn TessMonitorDelete(monitor: *mut TessMonitor);
    fn TessMonitorSetCancelFunc(monitor: *mut TessMonitor, func: TessCancelFunc);
    fn TessMonitorSetCancelThis(monitor: *mut TessMonitor, cancel_this: *mut c_void);
    fn TessMonitorGetCancelThis(monitor: *mut TessMonitor) -> *mut c_void;
    fn TessMonitorSetProgressFunc(monitor: *mut TessMonitor, func: TessProgressFunc);
    fn TessMonitorGetProgress(monitor: *mut TessMonitor) -> c_int;

    fn TessResultIteratorDelete(handle: *mut TessResultIterator);
    fn TessResultIteratorNext(handle: *mut TessResultIterator, level: c_int) -> c_int;
    fn TessResultIteratorGetUTF8Text(
        handle: *const TessResultIterator,
        level: c_int,
    ) -> *mut c_char;
    fn TessResultIteratorConfidence(handle: *const TessResultIterator, level: c_int) -> c_float;
    fn TessResultIteratorGetPageIterator(
        handle: *mut TessResultIterator,
    ) -> *mut TessPageIterator;
    fn TessResultIteratorGetChoiceIterator(
        handle: *const TessResultIterator,
    ) -> *mut TessChoiceIterator;
    fn TessPageIteratorBegin(handle: *mut TessPageIterator);
    fn TessPageIteratorBoundingBox(
        handle: *const TessPageIterator,
        level: c_int,
        left: *mut c_int,
        top: *mut c_int,
        right: *mut c_int,
        bottom: *mut c_int,
    ) -> c_int;
    fn TessChoiceIteratorDelete(handle: *mut TessChoiceIterator);
    fn TessChoiceIteratorNext(handle: *mut TessChoiceIterator) -> c_int;
    fn TessChoiceIteratorGetUTF8Text(handle: *const TessChoiceIterator) -> *const c_char;
    fn TessChoiceIteratorConfidence(handle: *const TessChoiceIterator) -> c_float;
}

/// Copies an engine-owned string and releases it with `TessDeleteText`.
fn take_text(text: *mut c_char) -> Option<String> {
    if text.is_null() {
        return None;
    }
    let value = unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned();
    unsafe { TessDeleteText(text) };
    Some(value)
}

fn to_cstring(label: &str, value: &str) -> Option<CString> {
    match CString::new(value) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("tesseract: {label} contains a NUL byte; ignored");
            None
        }
    }
}

extern "C" fn cancel_trampoline(cancel_this: *mut c_void, words: c_int) -> bool {
    if cancel_this.is_null() {
        return false;
    }
    let monitor = unsafe { &*(cancel_this as *const &dyn Monitor) };
    // A panic in the monitor cancels the run instead of unwinding into C++.
    panic::catch_unwind(AssertUnwindSafe(|| monitor.cancel_requested(words))).unwrap_or(true)
}

extern "C" fn progress_trampoline(
    raw: *mut TessMonitor,
    left: c_int,
    right: c_int,
    top: c_int,
    bottom: c_int,
) -> bool {
    if raw.is_null() {
        return true;
    }
    let cancel_this = unsafe { TessMonitorGetCancelThis(raw) };
    if cancel_this.is_null() {
        return true;
    }
    let monitor = unsafe { &*(cancel_this as *const &dyn Monitor) };
    let update = ProgressUpdate {
        percent: unsafe { TessMonitorGetProgress(raw) },
        left,
        right,
        top,
        bottom,
    };
    if panic::catch_unwind(AssertUnwindSafe(|| monitor.progress(update))).is_err() {
        warn!("tesseract: progress listener panicked");
    }
    true
}

/// Engine-side monitor descriptor wired to a [`Monitor`] for one call.
struct MonitorGuard<'a> {
    raw: NonNull<TessMonitor>,
    _target: Box<&'a dyn Monitor>,
}

impl<'a> MonitorGuard<'a> {
    fn new(monitor: &'a dyn Monitor) -> Option<Self> {
        let raw = NonNull::new(unsafe { TessMonitorCreate() })?;
        let target = Box::new(monitor);
        let cancel_this = &*target as *const &dyn Monitor as *mut c_void;
        unsafe {
            TessMonitorSetCancelFunc(raw.as_ptr(), cancel_trampoline);
            TessMonitorSetCancelThis(raw.as_ptr(), cancel_this);
            TessMonitorSetProgressFunc(raw.as_ptr(), progress_trampoline);
        }
        Some(Self {
            raw,
            _target: target,
        })
    }
}

impl Drop for MonitorGuard<'_> {
    fn drop(&mut self) {
        unsafe { TessMonitorDelete(self.raw.as_ptr()) };
    }
}

pub struct TesseractEngine {
    api: NonNull<TessBaseApi>,
}

// The C++ object has no thread affinity; the bridge serialises access to it.
unsafe impl Send for TesseractEngine {}

impl TesseractEngine {
    pub fn new() -> Option<Self> {
        let api = NonNull::new(unsafe { TessBaseAPICreate() })?;
        Some(Self { api })
    }

    fn raw(&self) -> *mut TessBaseApi {
        self.api.as_ptr()
    }

    fn recognize(&mut self, monitor: &dyn Monitor) -> bool {
        let Some(guard) = MonitorGuard::new(monitor) else {
            warn!("tesseract: failed to create monitor");
            return false;
        };
        let status = unsafe { TessBaseAPIRecognize(self.raw(), guard.raw.as_ptr()) };
        // Non-zero also covers a cancelled run; partial results stay readable.
        if status != 0 {
            warn!("tesseract: recognize returned {status}");
        }
        true
    }
}

impl Drop for TesseractEngine {
    fn drop(&mut self) {
        unsafe { TessBaseAPIDelete(self.raw()) };
    }
}

impl Engine for TesseractEngine {
    fn init(&mut self, datapath: &str, language: &str, mode: EngineMode) -> bool {
        // An empty datapath lets the engine fall back to TESSDATA_PREFIX.
        let datapath = if datapath.is_empty() {
            None
        } else {
            let Some(datapath) = to_cstring("datapath", datapath) else {
                return false;
            };
            Some(datapath)
        };
        let Some(language) = to_cstring("language", language) else {
            return false;
        };
        let datapath_ptr = datapath.as_ref().map_or(std::ptr::null(), |value| value.as_ptr());
        let status =
            unsafe { TessBaseAPIInit2(self.raw(), datapath_ptr, language.as_ptr(), mode as c_int) };
        status == 0
    }

    fn init_languages(&self) -> Option<String> {
        let text = unsafe { TessBaseAPIGetInitLanguagesAsString(self.raw()) };
        if text.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned())
    }

    fn set_image(&mut self, image: ImageView<'_>) {
        unsafe {
            TessBaseAPISetImage(
                self.raw(),
                image.data.as_ptr(),
                image.width,
                image.height,
                image.bytes_per_pixel,
                image.bytes_per_line,
            )
        };
    }

    fn set_rectangle(&mut self, rect: Rectangle) {
        unsafe { TessBaseAPISetRectangle(self.raw(), rect.left, rect.top, rect.width, rect.height) };
    }

    fn utf8_text(&mut self, monitor: &dyn Monitor) -> Option<String> {
        if !self.recognize(monitor) {
            return None;
        }
        take_text(unsafe { TessBaseAPIGetUTF8Text(self.raw()) })
    }

    fn hocr_text(&mut self, page: i32, monitor: &dyn Monitor) -> Option<String> {
        if !self.recognize(monitor) {
            return None;
        }
        take_text(unsafe { TessBaseAPIGetHOCRText(self.raw(), page) })
    }

    fn box_text(&mut self, page: i32) -> Option<String> {
        take_text(unsafe { TessBaseAPIGetBoxText(self.raw(), page) })
    }

    fn mean_text_conf(&mut self) -> i32 {
        unsafe { TessBaseAPIMeanTextConf(self.raw()) }
    }

    fn all_word_confidences(&mut self) -> Option<Vec<i32>> {
        let confs = unsafe { TessBaseAPIAllWordConfidences(self.raw()) };
        if confs.is_null() {
            return None;
        }
        let mut values = Vec::new();
        let mut offset = 0;
        loop {
            let value = unsafe { *confs.add(offset) };
            if value == -1 {
                break;
            }
            values.push(value);
            offset += 1;
        }
        unsafe { TessDeleteIntArray(confs) };
        Some(values)
    }

    fn set_variable(&mut self, name: &str, value: &str) -> bool {
        let Some(name) = to_cstring("variable name", name) else {
            return false;
        };
        let Some(value) = to_cstring("variable value", value) else {
            return false;
        };
        unsafe { TessBaseAPISetVariable(self.raw(), name.as_ptr(), value.as_ptr()) != 0 }
    }

    fn page_seg_mode(&self) -> PageSegMode {
        let raw = unsafe { TessBaseAPIGetPageSegMode(self.raw()) };
        PageSegMode::try_from(raw).unwrap_or_default()
    }

    fn set_page_seg_mode(&mut self, mode: PageSegMode) {
        unsafe { TessBaseAPISetPageSegMode(self.raw(), mode as c_int) };
    }

    fn result_iterator(&mut self) -> Option<Box<dyn ResultIterator + Send>> {
        let raw = NonNull::new(unsafe { TessBaseAPIGetIterator(self.raw()) })?;
        Some(Box::new(TesseractResultIterator { raw }))
    }

    fn set_input_name(&mut self, name: &str) {
        if let Some(name) = to_cstring("input name", name) {
            unsafe { TessBaseAPISetInputName(self.raw(), name.as_ptr()) };
        }
    }

    fn set_output_name(&mut self, name: &str) {
        if let Some(name) = to_cstring("output name", name) {
            unsafe { TessBaseAPISetOutputName(self.raw(), name.as_ptr()) };
        }
    }

    fn read_config_file(&mut self, path: &str) {
        if let Some(path) = to_cstring("config path", path) {
            unsafe { TessBaseAPIReadConfigFile(self.raw(), path.as_ptr()) };
        }
    }

    fn clear(&mut self) {
        unsafe { TessBaseAPIClear(self.raw()) };
    }

    fn clear_adaptive_classifier(&mut self) {
        unsafe { TessBaseAPIClearAdaptiveClassifier(self.raw()) };
    }

    fn end(&mut self) {
        unsafe { TessBaseAPIEnd(self.raw()) };
    }
}

pub struct TesseractResultIterator {
    raw: NonNull<TessResultIterator>,
}

unsafe impl Send for TesseractResultIterator {}

impl Drop for TesseractResultIterator {
    fn drop(&mut self) {
        unsafe { TessResultIteratorDelete(self.raw.as_ptr()) };
    }
}

impl ResultIterator for TesseractResultIterator {
    fn begin(&mut self) {
        let page = unsafe { TessResultIteratorGetPageIterator(self.raw.as_ptr()) };
        if !page.is_null() {
            unsafe { TessPageIteratorBegin(page) };
        }
    }

    fn next(&mut self, level: PageIteratorLevel) -> bool {
        unsafe { TessResultIteratorNext(self.raw.as_ptr(), level as c_int) != 0 }
    }

    fn utf8_text(&self, level: PageIteratorLevel) -> Option<String> {
        take_text(unsafe { TessResultIteratorGetUTF8Text(self.raw.as_ptr(), level as c_int) })
    }

    fn confidence(&self, level: PageIteratorLevel) -> f32 {
        unsafe { TessResultIteratorConfidence(self.raw.as_ptr(), level as c_int) }
    }

    fn bounding_box(&self, level: PageIteratorLevel) -> Option<BoundingBox> {
        let page = unsafe { TessResultIteratorGetPageIterator(self.raw.as_ptr()) };
        if page.is_null() {
            return None;
        }
        let mut bbox = BoundingBox::default();
        let found = unsafe {
            TessPageIteratorBoundingBox(
                page,
                level as c_int,
                &mut bbox.left,
                &mut bbox.top,
                &mut bbox.right,
                &mut bbox.bottom,
            )
        };
        (found != 0).then_some(bbox)
    }

    fn choices(&self, _level: PageIteratorLevel) -> Vec<Choice> {
        // Alternatives come from the symbol at the current position.
        let iter = unsafe { TessResultIteratorGetChoiceIterator(self.raw.as_ptr()) };
        if iter.is_null() {
            return Vec::new();
        }
        let mut choices = Vec::new();
        loop {
            let text = unsafe { TessChoiceIteratorGetUTF8Text(iter) };
            let text = if text.is_null() {
                String::new()
            } else {
                unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
            };
            let confidence = unsafe { TessChoiceIteratorConfidence(iter) };
            choices.push(Choice { text, confidence });
            if unsafe { TessChoiceIteratorNext(iter) } == 0 {
                break;
            }
        }
        unsafe { TessChoiceIteratorDelete(iter) };
        choices
    }
}
