use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use tess_bridge::{
    BridgeError, Engine, EngineMode, ImageView, Monitor, NativeHandle, PageSegMode,
    ProgressListener, ProgressUpdate, Rectangle, ResultIterator,
};

/// Walks `pages` steps, reporting progress and polling for cancellation on
/// each one, and returns how many steps it completed.
struct PagedEngine {
    pages: u32,
    completed: Arc<AtomicU32>,
    delay: Duration,
    psm: PageSegMode,
}

impl PagedEngine {
    fn new(pages: u32, delay: Duration) -> (Self, Arc<AtomicU32>) {
        let completed = Arc::new(AtomicU32::new(0));
        let engine = Self {
            pages,
            completed: Arc::clone(&completed),
            delay,
            psm: PageSegMode::default(),
        };
        (engine, completed)
    }

    fn run(&mut self, monitor: &dyn Monitor) -> Option<String> {
        let mut done = 0;
        for page in 1..=self.pages {
            if monitor.cancel_requested(page as i32) {
                break;
            }
            done = page;
            monitor.progress(ProgressUpdate::percent((page * 100 / self.pages) as i32));
            thread::sleep(self.delay);
        }
        self.completed.store(done, Ordering::SeqCst);
        Some(format!("{done} pages"))
    }
}

impl Engine for PagedEngine {
    fn init(&mut self, _datapath: &str, language: &str, _mode: EngineMode) -> bool {
        !language.is_empty()
    }

    fn init_languages(&self) -> Option<String> {
        None
    }

    fn set_image(&mut self, _image: ImageView<'_>) {}

    fn set_rectangle(&mut self, _rect: Rectangle) {}

    fn utf8_text(&mut self, monitor: &dyn Monitor) -> Option<String> {
        self.run(monitor)
    }

    fn hocr_text(&mut self, _page: i32, monitor: &dyn Monitor) -> Option<String> {
        self.run(monitor)
    }

    fn box_text(&mut self, _page: i32) -> Option<String> {
        None
    }

    fn mean_text_conf(&mut self) -> i32 {
        120
    }

    fn all_word_confidences(&mut self) -> Option<Vec<i32>> {
        None
    }

    fn set_variable(&mut self, _name: &str, _value: &str) -> bool {
        false
    }

    fn page_seg_mode(&self) -> PageSegMode {
        self.psm
    }

    fn set_page_seg_mode(&mut self, mode: PageSegMode) {
        self.psm = mode;
    }

    fn result_iterator(&mut self) -> Option<Box<dyn ResultIterator + Send>> {
        None
    }

    fn set_input_name(&mut self, _name: &str) {}

    fn set_output_name(&mut self, _name: &str) {}

    fn read_config_file(&mut self, _path: &str) {}

    fn clear(&mut self) {}

    fn clear_adaptive_classifier(&mut self) {}

    fn end(&mut self) {}
}

/// Signals once the call has begun, then waits for the test before letting the
/// wrapped engine poll.
struct GatedEngine {
    inner: PagedEngine,
    started: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

impl Engine for GatedEngine {
    fn init(&mut self, datapath: &str, language: &str, mode: EngineMode) -> bool {
        self.inner.init(datapath, language, mode)
    }

    fn init_languages(&self) -> Option<String> {
        self.inner.init_languages()
    }

    fn set_image(&mut self, image: ImageView<'_>) {
        self.inner.set_image(image);
    }

    fn set_rectangle(&mut self, rect: Rectangle) {
        self.inner.set_rectangle(rect);
    }

    fn utf8_text(&mut self, monitor: &dyn Monitor) -> Option<String> {
        self.started.send(()).ok()?;
        self.release.recv().ok()?;
        self.inner.run(monitor)
    }

    fn hocr_text(&mut self, page: i32, monitor: &dyn Monitor) -> Option<String> {
        self.inner.hocr_text(page, monitor)
    }

    fn box_text(&mut self, page: i32) -> Option<String> {
        self.inner.box_text(page)
    }

    fn mean_text_conf(&mut self) -> i32 {
        self.inner.mean_text_conf()
    }

    fn all_word_confidences(&mut self) -> Option<Vec<i32>> {
        self.inner.all_word_confidences()
    }

    fn set_variable(&mut self, name: &str, value: &str) -> bool {
        self.inner.set_variable(name, value)
    }

    fn page_seg_mode(&self) -> PageSegMode {
        self.inner.page_seg_mode()
    }

    fn set_page_seg_mode(&mut self, mode: PageSegMode) {
        self.inner.set_page_seg_mode(mode);
    }

    fn result_iterator(&mut self) -> Option<Box<dyn ResultIterator + Send>> {
        self.inner.result_iterator()
    }

    fn set_input_name(&mut self, name: &str) {
        self.inner.set_input_name(name);
    }

    fn set_output_name(&mut self, name: &str) {
        self.inner.set_output_name(name);
    }

    fn read_config_file(&mut self, path: &str) {
        self.inner.read_config_file(path);
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn clear_adaptive_classifier(&mut self) {
        self.inner.clear_adaptive_classifier();
    }

    fn end(&mut self) {
        self.inner.end();
    }
}

fn ready(pages: u32, delay: Duration) -> (NativeHandle, Arc<AtomicU32>) {
    let (engine, completed) = PagedEngine::new(pages, delay);
    let handle = NativeHandle::new(engine);
    handle.init("", "eng").expect("init");
    (handle, completed)
}

fn collecting() -> (Arc<dyn ProgressListener>, Arc<Mutex<Vec<i32>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: Arc<dyn ProgressListener> = Arc::new(move |update: ProgressUpdate| {
        sink.lock().unwrap().push(update.percent);
    });
    (listener, seen)
}

#[test]
fn stop_from_another_thread_ends_a_running_call() {
    let (handle, completed) = ready(10_000, Duration::from_micros(100));
    let (listener, seen) = collecting();
    let stop = handle.stop_handle();

    let text = thread::scope(|scope| {
        let worker = scope.spawn(|| handle.utf8_text(listener));
        while seen.lock().unwrap().is_empty() {
            thread::yield_now();
        }
        stop.stop();
        worker.join().unwrap()
    });

    let done = completed.load(Ordering::SeqCst);
    assert!(done < 10_000, "engine ran to completion");
    assert_eq!(text.unwrap(), format!("{done} pages"));
    assert!(!handle.is_running());
    assert!(!stop.is_stop_requested());
}

#[test]
fn stop_after_a_call_returns_does_not_cancel_the_next_one() {
    let (handle, completed) = ready(50, Duration::ZERO);
    let (listener, _) = collecting();
    assert_eq!(handle.utf8_text(listener).unwrap(), "50 pages");

    handle.stop();
    let (listener, seen) = collecting();
    assert_eq!(handle.utf8_text(listener).unwrap(), "50 pages");
    assert_eq!(completed.load(Ordering::SeqCst), 50);
    assert_eq!(seen.lock().unwrap().last(), Some(&100));
}

#[test]
fn stop_issued_before_the_first_poll_is_observed_there() {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let (engine, completed) = PagedEngine::new(50, Duration::ZERO);
    let handle = NativeHandle::new(GatedEngine {
        inner: engine,
        started: started_tx,
        release: release_rx,
    });
    handle.init("", "eng").expect("init");
    let (listener, seen) = collecting();

    let text = thread::scope(|scope| {
        let worker = scope.spawn(|| handle.utf8_text(listener));
        started_rx.recv().expect("call started");
        assert!(handle.is_running());
        handle.stop();
        release_tx.send(()).expect("release");
        worker.join().unwrap()
    });

    assert_eq!(text.unwrap(), "0 pages");
    assert_eq!(completed.load(Ordering::SeqCst), 0);
    assert!(seen.lock().unwrap().is_empty());
    assert!(!handle.is_running());
}

#[test]
fn progress_is_relayed_in_increasing_order() {
    let (handle, _) = ready(200, Duration::ZERO);
    let (listener, seen) = collecting();
    handle.hocr_text(0, listener).unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 100);
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(seen.last(), Some(&100));
}

#[test]
fn listener_may_stop_the_call_it_observes() {
    let (handle, completed) = ready(100, Duration::ZERO);
    let stop = handle.stop_handle();
    let listener = Arc::new(move |update: ProgressUpdate| {
        if update.percent >= 30 {
            stop.stop();
        }
    });

    handle.utf8_text(listener).unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 30);
}

#[test]
fn recognition_requires_initialization() {
    let (engine, _) = PagedEngine::new(1, Duration::ZERO);
    let handle = NativeHandle::new(engine);
    let (listener, _) = collecting();
    assert_eq!(handle.utf8_text(listener), Err(BridgeError::NotInitialized));

    assert!(handle.init("", "").is_err());
    assert!(!handle.is_initialized());
    handle.init("", "eng").unwrap();
    assert_eq!(handle.mean_confidence(), None);
    let (listener, _) = collecting();
    handle.utf8_text(listener).unwrap();
    assert_eq!(handle.mean_confidence(), Some(100));
}

#[test]
fn image_geometry_is_validated_before_copying() {
    let (handle, _) = ready(1, Duration::ZERO);
    let pixels = vec![0u8; 6 * 4];

    assert!(matches!(
        handle.set_image_bytes(&pixels, 6, 4, 2, 6),
        Err(BridgeError::InvalidImage(_))
    ));
    assert!(matches!(
        handle.set_image_bytes(&pixels, 6, 5, 1, 6),
        Err(BridgeError::InvalidImage(_))
    ));
    assert!(!handle.has_image());

    handle.set_image_bytes(&pixels, 6, 4, 1, 6).unwrap();
    assert!(handle.has_image());
    handle.clear();
    handle.clear();
    assert!(!handle.has_image());
}
