use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use super::buffer::{ImageBuffer, ImageSlot};
use super::error::{BridgeError, Result};
use super::monitor::CallbackBridge;
use super::state::{CallState, ProgressListener, StopHandle};
use crate::engine::{Engine, EngineMode, Monitor, PageSegMode, Rectangle, ResultIterator};
use crate::settings::Settings;

struct HandleCore {
    engine: Box<dyn Engine>,
    image: ImageSlot,
    debug: bool,
    initialized: bool,
    recognized: bool,
}

/// Native resources bound to one managed object: the engine, the cached image
/// buffer, and the cancellation/progress state of the current call.
///
/// Every method takes `&self`. Engine access is serialised; [`NativeHandle::stop`]
/// never waits for a running call.
pub struct NativeHandle {
    core: Mutex<HandleCore>,
    state: Arc<CallState>,
}

/// Clears the call state even if the engine unwinds.
struct CallGuard<'a> {
    state: &'a CallState,
}

impl<'a> CallGuard<'a> {
    fn begin(state: &'a CallState, listener: Arc<dyn ProgressListener>) -> Self {
        state.begin(listener);
        Self { state }
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if self.state.finish() {
            info!("recognition: stopped on request");
        }
    }
}

impl NativeHandle {
    /// Binds `engine` to a new handle. The engine is not initialized yet.
    pub fn new(engine: impl Engine + 'static) -> Self {
        Self::from_boxed(Box::new(engine))
    }

    pub fn from_boxed(engine: Box<dyn Engine>) -> Self {
        Self {
            core: Mutex::new(HandleCore {
                engine,
                image: ImageSlot::default(),
                debug: false,
                initialized: false,
                recognized: false,
            }),
            state: Arc::new(CallState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandleCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn init(&self, datapath: &str, language: &str) -> Result<()> {
        self.init_with_mode(datapath, language, EngineMode::Default)
    }

    /// Like [`NativeHandle::init`] with a raw mode value. Out-of-range values fail
    /// without touching the engine.
    pub fn init_with_raw_mode(&self, datapath: &str, language: &str, mode: i32) -> Result<()> {
        let mode = EngineMode::try_from(mode).map_err(BridgeError::InvalidEngineMode)?;
        self.init_with_mode(datapath, language, mode)
    }

    pub fn init_with_mode(&self, datapath: &str, language: &str, mode: EngineMode) -> Result<()> {
        let mut core = self.lock();
        core.recognized = false;
        if !core.engine.init(datapath, language, mode) {
            core.initialized = false;
            warn!("engine: init failed (datapath={datapath}, language={language}, mode={mode:?})");
            return Err(BridgeError::Init {
                datapath: datapath.to_string(),
                language: language.to_string(),
            });
        }
        core.initialized = true;
        info!("engine: initialized (language={language}, mode={mode:?})");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Initializes and configures the engine from layered settings.
    pub fn configure(&self, settings: &Settings) -> Result<()> {
        let datapath = settings.datapath.as_deref().unwrap_or_default();
        self.init_with_mode(datapath, &settings.language, settings.engine_mode)?;
        for path in &settings.config_files {
            self.read_config_file(path);
        }
        for (name, value) in &settings.variables {
            if !self.set_variable(name, value) {
                warn!("engine: variable rejected: {name}");
            }
        }
        if let Some(mode) = settings.page_seg_mode {
            self.set_page_seg_mode(mode);
        }
        self.set_debug(settings.debug);
        Ok(())
    }

    pub fn init_languages(&self) -> Option<String> {
        self.lock().engine.init_languages()
    }

    /// Copies the image into a buffer owned by the handle and points the engine
    /// at it. The previous buffer is freed after the engine has been re-pointed.
    pub fn set_image_bytes(
        &self,
        data: &[u8],
        width: i32,
        height: i32,
        bytes_per_pixel: i32,
        bytes_per_line: i32,
    ) -> Result<()> {
        let buffer =
            ImageBuffer::copy_from(data, width, height, bytes_per_pixel, bytes_per_line)?;
        let mut core = self.lock();
        let HandleCore {
            engine,
            image,
            recognized,
            ..
        } = &mut *core;
        image.replace(buffer, |current| engine.set_image(current.view()));
        *recognized = false;
        Ok(())
    }

    pub fn has_image(&self) -> bool {
        self.lock().image.is_set()
    }

    pub fn set_rectangle(&self, left: i32, top: i32, width: i32, height: i32) {
        let mut core = self.lock();
        core.engine.set_rectangle(Rectangle {
            left,
            top,
            width,
            height,
        });
        core.recognized = false;
    }

    /// Runs one monitored engine call with the protocol shared by text and hOCR
    /// extraction.
    fn monitored<F>(&self, listener: Arc<dyn ProgressListener>, call: F) -> Result<String>
    where
        F: FnOnce(&mut dyn Engine, &dyn Monitor) -> Option<String>,
    {
        let mut core = self.lock();
        if !core.initialized {
            return Err(BridgeError::NotInitialized);
        }
        let debug = core.debug;
        let text = {
            let _call = CallGuard::begin(&self.state, listener);
            let bridge = CallbackBridge::new(&self.state, debug);
            call(core.engine.as_mut(), &bridge)
        };
        core.recognized = text.is_some();
        text.ok_or(BridgeError::NoText)
    }

    /// Recognizes the current image and returns plain text.
    ///
    /// Cancelable with [`NativeHandle::stop`]; a stopped call returns whatever
    /// the engine produced so far.
    pub fn utf8_text(&self, listener: Arc<dyn ProgressListener>) -> Result<String> {
        self.monitored(listener, |engine, monitor| engine.utf8_text(monitor))
    }

    /// Recognizes the current image and returns hOCR for `page`.
    pub fn hocr_text(&self, page: i32, listener: Arc<dyn ProgressListener>) -> Result<String> {
        self.monitored(listener, |engine, monitor| engine.hocr_text(page, monitor))
    }

    /// Box-file output for `page`. Runs without a monitor: it cannot be stopped
    /// and reports no progress.
    pub fn box_text(&self, page: i32) -> Result<String> {
        let mut core = self.lock();
        if !core.initialized {
            return Err(BridgeError::NotInitialized);
        }
        let text = core.engine.box_text(page);
        core.recognized = text.is_some();
        text.ok_or(BridgeError::NoText)
    }

    /// Signals the running call, if any, to stop. Safe from any thread.
    ///
    /// A stop with no call running has no effect on later calls: each
    /// monitored call clears the request when it begins.
    pub fn stop(&self) {
        self.state.request_stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.state))
    }

    /// Whether a monitored call is in flight. A stopped call counts until the
    /// engine notices the stop and returns.
    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    /// Mean confidence of the last recognition, `None` before any.
    pub fn mean_confidence(&self) -> Option<i32> {
        let mut core = self.lock();
        if !core.recognized {
            return None;
        }
        Some(core.engine.mean_text_conf().clamp(0, 100))
    }

    /// Per-word confidences of the last recognition, empty before any.
    pub fn word_confidences(&self) -> Vec<i32> {
        let mut core = self.lock();
        if !core.recognized {
            return Vec::new();
        }
        core.engine.all_word_confidences().unwrap_or_default()
    }

    pub fn set_variable(&self, name: &str, value: &str) -> bool {
        self.lock().engine.set_variable(name, value)
    }

    pub fn set_debug(&self, debug: bool) {
        self.lock().debug = debug;
    }

    pub fn page_seg_mode(&self) -> PageSegMode {
        self.lock().engine.page_seg_mode()
    }

    pub fn set_page_seg_mode(&self, mode: PageSegMode) {
        self.lock().engine.set_page_seg_mode(mode);
    }

    pub fn set_raw_page_seg_mode(&self, mode: i32) -> Result<()> {
        let mode = PageSegMode::try_from(mode).map_err(BridgeError::InvalidPageSegMode)?;
        self.set_page_seg_mode(mode);
        Ok(())
    }

    /// Iterator over the last recognition. Ownership passes to the caller.
    ///
    /// # Safety
    ///
    /// The iterator reads the engine's results in place. It must be dropped
    /// before the next set-image, rectangle, clear, end, recognition, or drop
    /// of this handle.
    pub unsafe fn result_iterator(&self) -> Option<Box<dyn ResultIterator + Send>> {
        let mut core = self.lock();
        if !core.recognized {
            return None;
        }
        core.engine.result_iterator()
    }

    pub fn set_input_name(&self, name: &str) {
        self.lock().engine.set_input_name(name);
    }

    pub fn set_output_name(&self, name: &str) {
        self.lock().engine.set_output_name(name);
    }

    pub fn read_config_file(&self, path: &str) {
        self.lock().engine.read_config_file(path);
    }

    /// Forgets results and adaptive data, and frees the image buffer.
    pub fn clear(&self) {
        let mut core = self.lock();
        core.engine.clear();
        core.engine.clear_adaptive_classifier();
        core.image.release();
        core.recognized = false;
    }

    /// Shuts the engine down and frees the image buffer. The handle needs a
    /// new `init` before recognizing again.
    pub fn end(&self) {
        let mut core = self.lock();
        core.engine.end();
        core.image.release();
        core.initialized = false;
        core.recognized = false;
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        if core.image.release() {
            info!("handle: released image buffer on teardown");
        }
    }
}
