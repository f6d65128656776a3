#![cfg(test)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::bridge::ProgressListener;
use crate::engine::{
    BoundingBox, Choice, Engine, EngineMode, ImageView, Monitor, PageIteratorLevel, PageSegMode,
    ProgressUpdate, Rectangle, ResultIterator,
};

#[derive(Debug, Clone)]
pub(crate) enum ScriptStep {
    Progress(ProgressUpdate),
    Text(&'static str),
}

#[derive(Debug, Clone)]
enum Behavior {
    Script(Vec<ScriptStep>),
    /// Reports progress every iteration and polls for cancellation every
    /// `poll_every` iterations.
    Poll {
        total: u32,
        poll_every: u32,
        text: &'static str,
    },
}

#[derive(Debug)]
struct ProbeState {
    behavior: Behavior,
    calls: HashMap<&'static str, usize>,
    images: Vec<usize>,
    modes: Vec<EngineMode>,
    rejected: Vec<String>,
    language: Option<String>,
    variables: HashMap<String, String>,
    page_seg_mode: PageSegMode,
    last_page: Option<i32>,
    last_text: Option<String>,
    iterations: u64,
    monitored: usize,
    pace: Option<Duration>,
}

/// Test-side view of a [`ScriptedEngine`].
#[derive(Clone)]
pub(crate) struct Probe {
    inner: Arc<Mutex<ProbeState>>,
}

impl Probe {
    fn state(&self) -> MutexGuard<'_, ProbeState> {
        self.inner.lock().expect("probe lock")
    }

    pub(crate) fn calls(&self, name: &str) -> usize {
        self.state().calls.get(name).copied().unwrap_or(0)
    }

    pub(crate) fn images_seen(&self) -> Vec<usize> {
        self.state().images.clone()
    }

    pub(crate) fn last_mode(&self) -> Option<EngineMode> {
        self.state().modes.last().copied()
    }

    pub(crate) fn reject_language(&self, language: &str) {
        self.state().rejected.push(language.to_string());
    }

    pub(crate) fn variable(&self, name: &str) -> Option<String> {
        self.state().variables.get(name).cloned()
    }

    pub(crate) fn last_page(&self) -> Option<i32> {
        self.state().last_page
    }

    pub(crate) fn rescript(&self, steps: Vec<ScriptStep>) {
        self.state().behavior = Behavior::Script(steps);
    }

    pub(crate) fn iterations(&self) -> u64 {
        self.state().iterations
    }

    pub(crate) fn monitored_calls(&self) -> usize {
        self.state().monitored
    }

    pub(crate) fn pace(&self, delay: Duration) {
        self.state().pace = Some(delay);
    }
}

/// In-memory engine that replays a script or simulates a long polling run.
pub(crate) struct ScriptedEngine {
    probe: Probe,
}

impl ScriptedEngine {
    fn with_behavior(behavior: Behavior) -> (Self, Probe) {
        let probe = Probe {
            inner: Arc::new(Mutex::new(ProbeState {
                behavior,
                calls: HashMap::new(),
                images: Vec::new(),
                modes: Vec::new(),
                rejected: Vec::new(),
                language: None,
                variables: HashMap::new(),
                page_seg_mode: PageSegMode::default(),
                last_page: None,
                last_text: None,
                iterations: 0,
                monitored: 0,
                pace: None,
            })),
        };
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }

    pub(crate) fn new(steps: Vec<ScriptStep>) -> (Self, Probe) {
        Self::with_behavior(Behavior::Script(steps))
    }

    pub(crate) fn polling(total: u32, poll_every: u32, text: &'static str) -> (Self, Probe) {
        Self::with_behavior(Behavior::Poll {
            total,
            poll_every,
            text,
        })
    }

    fn record(&self, name: &'static str) {
        *self.probe.state().calls.entry(name).or_default() += 1;
    }

    fn run(&mut self, monitor: Option<&dyn Monitor>) -> Option<String> {
        let (behavior, pace) = {
            let mut state = self.probe.state();
            if monitor.is_some() {
                state.monitored += 1;
            }
            (state.behavior.clone(), state.pace)
        };
        let text = match behavior {
            Behavior::Script(steps) => {
                let mut text = None;
                for step in steps {
                    match step {
                        ScriptStep::Progress(update) => {
                            if let Some(monitor) = monitor {
                                monitor.progress(update);
                            }
                        }
                        ScriptStep::Text(value) => {
                            text = Some(value.to_string());
                            break;
                        }
                    }
                }
                text
            }
            Behavior::Poll {
                total,
                poll_every,
                text,
            } => {
                for step in 1..=total {
                    self.probe.state().iterations += 1;
                    if let Some(monitor) = monitor {
                        monitor.progress(ProgressUpdate::percent(step.min(100) as i32));
                        if step % poll_every == 0 && monitor.cancel_requested(step as i32) {
                            break;
                        }
                    }
                    if let Some(delay) = pace {
                        thread::sleep(delay);
                    }
                }
                Some(text.to_string())
            }
        };
        self.probe.state().last_text = text.clone();
        text
    }
}

impl Engine for ScriptedEngine {
    fn init(&mut self, _datapath: &str, language: &str, mode: EngineMode) -> bool {
        self.record("init");
        let mut state = self.probe.state();
        state.modes.push(mode);
        if state.rejected.iter().any(|value| value == language) {
            state.language = None;
            return false;
        }
        state.language = Some(language.to_string());
        true
    }

    fn init_languages(&self) -> Option<String> {
        self.probe.state().language.clone()
    }

    fn set_image(&mut self, image: ImageView<'_>) {
        self.record("set_image");
        self.probe.state().images.push(image.data.len());
    }

    fn set_rectangle(&mut self, _rect: Rectangle) {
        self.record("set_rectangle");
    }

    fn utf8_text(&mut self, monitor: &dyn Monitor) -> Option<String> {
        self.run(Some(monitor))
    }

    fn hocr_text(&mut self, page: i32, monitor: &dyn Monitor) -> Option<String> {
        self.probe.state().last_page = Some(page);
        self.run(Some(monitor))
    }

    fn box_text(&mut self, page: i32) -> Option<String> {
        self.probe.state().last_page = Some(page);
        self.run(None)
    }

    fn mean_text_conf(&mut self) -> i32 {
        87
    }

    fn all_word_confidences(&mut self) -> Option<Vec<i32>> {
        Some(vec![91, 83])
    }

    fn set_variable(&mut self, name: &str, value: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        self.probe
            .state()
            .variables
            .insert(name.to_string(), value.to_string());
        true
    }

    fn page_seg_mode(&self) -> PageSegMode {
        self.probe.state().page_seg_mode
    }

    fn set_page_seg_mode(&mut self, mode: PageSegMode) {
        self.probe.state().page_seg_mode = mode;
    }

    fn result_iterator(&mut self) -> Option<Box<dyn ResultIterator + Send>> {
        let text = self.probe.state().last_text.clone()?;
        Some(Box::new(WordIterator::new(&text)))
    }

    fn set_input_name(&mut self, _name: &str) {
        self.record("set_input_name");
    }

    fn set_output_name(&mut self, _name: &str) {
        self.record("set_output_name");
    }

    fn read_config_file(&mut self, _path: &str) {
        self.record("read_config_file");
    }

    fn clear(&mut self) {
        self.record("clear");
    }

    fn clear_adaptive_classifier(&mut self) {
        self.record("clear_adaptive_classifier");
    }

    fn end(&mut self) {
        self.record("end");
        self.probe.state().language = None;
    }
}

/// Treats every level as words laid out left to right, 10px per character.
pub(crate) struct WordIterator {
    words: Vec<(String, BoundingBox)>,
    index: usize,
}

impl WordIterator {
    fn new(text: &str) -> Self {
        let mut left = 0;
        let words = text
            .split_whitespace()
            .map(|word| {
                let width = word.chars().count() as i32 * 10;
                let bbox = BoundingBox {
                    left,
                    top: 0,
                    right: left + width,
                    bottom: 20,
                };
                left += width + 10;
                (word.to_string(), bbox)
            })
            .collect();
        Self { words, index: 0 }
    }
}

impl ResultIterator for WordIterator {
    fn begin(&mut self) {
        self.index = 0;
    }

    fn next(&mut self, _level: PageIteratorLevel) -> bool {
        if self.index + 1 < self.words.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn utf8_text(&self, _level: PageIteratorLevel) -> Option<String> {
        self.words.get(self.index).map(|(word, _)| word.clone())
    }

    fn confidence(&self, _level: PageIteratorLevel) -> f32 {
        if self.index == 0 { 91.0 } else { 83.0 }
    }

    fn bounding_box(&self, _level: PageIteratorLevel) -> Option<BoundingBox> {
        self.words.get(self.index).map(|(_, bbox)| *bbox)
    }

    fn choices(&self, level: PageIteratorLevel) -> Vec<Choice> {
        let Some(text) = self.utf8_text(level) else {
            return Vec::new();
        };
        vec![
            Choice {
                text: text.clone(),
                confidence: self.confidence(level),
            },
            Choice {
                text: text.to_uppercase(),
                confidence: 12.5,
            },
        ]
    }
}

/// Collects relayed progress events.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    events: Arc<Mutex<Vec<ProgressUpdate>>>,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn listener(&self) -> Arc<dyn ProgressListener> {
        let events = Arc::clone(&self.events);
        Arc::new(move |update: ProgressUpdate| {
            events.lock().expect("recorder lock").push(update);
        })
    }

    pub(crate) fn events(&self) -> Vec<ProgressUpdate> {
        self.events.lock().expect("recorder lock").clone()
    }

    pub(crate) fn percents(&self) -> Vec<i32> {
        self.events().iter().map(|update| update.percent).collect()
    }
}
