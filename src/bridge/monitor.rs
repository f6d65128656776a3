use tracing::debug;

use super::state::CallState;
use crate::engine::{Monitor, ProgressUpdate};

/// Monitor installed for one long-running call. Answers the engine's cancel
/// polls and relays progress to the caller's listener.
pub(crate) struct CallbackBridge<'a> {
    state: &'a CallState,
    debug: bool,
}

impl<'a> CallbackBridge<'a> {
    pub(crate) fn new(state: &'a CallState, debug: bool) -> Self {
        Self { state, debug }
    }

    /// Percent-only updates are relayed when they move forward; region
    /// updates are always relayed.
    fn is_novel(&self, update: &ProgressUpdate) -> bool {
        update.percent > self.state.last_progress() || update.has_region()
    }
}

impl Monitor for CallbackBridge<'_> {
    fn cancel_requested(&self, _words: i32) -> bool {
        self.state.cancel_requested()
    }

    fn progress(&self, update: ProgressUpdate) {
        let Some(context) = self.state.valid_context() else {
            if self.debug {
                debug!(?update, "progress: dropped, no valid call context");
            }
            return;
        };
        if !self.is_novel(&update) {
            if self.debug {
                debug!(?update, "progress: dropped, throttled");
            }
            return;
        }
        self.state.record_progress(update.percent);
        if self.debug {
            debug!(?update, "progress: relayed");
        }
        context.listener.on_progress_values(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::state::ProgressListener;
    use std::sync::{Arc, Mutex};

    fn recording_state() -> (CallState, Arc<Mutex<Vec<ProgressUpdate>>>) {
        let state = CallState::default();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let listener: Arc<dyn ProgressListener> = Arc::new(move |update: ProgressUpdate| {
            sink.lock().expect("events").push(update);
        });
        state.begin(listener);
        (state, events)
    }

    #[test]
    fn percent_only_updates_are_monotonic() {
        let (state, events) = recording_state();
        let bridge = CallbackBridge::new(&state, false);
        for percent in [10, 5, 20, 20] {
            bridge.progress(ProgressUpdate::percent(percent));
        }
        let relayed: Vec<i32> = events.lock().unwrap().iter().map(|u| u.percent).collect();
        assert_eq!(relayed, vec![10, 20]);
    }

    #[test]
    fn region_updates_always_relay() {
        let (state, events) = recording_state();
        let bridge = CallbackBridge::new(&state, true);
        bridge.progress(ProgressUpdate::percent(50));
        let region = ProgressUpdate {
            percent: 0,
            left: 3,
            right: 40,
            top: 7,
            bottom: 19,
        };
        bridge.progress(region);
        bridge.progress(region);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], region);
        // A region update with a lower percent does not lower the threshold.
        assert_eq!(state.last_progress(), 50);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn debug_logs_relayed_and_dropped_events() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let (state, _) = recording_state();
            let bridge = CallbackBridge::new(&state, true);
            bridge.progress(ProgressUpdate::percent(10));
            bridge.progress(ProgressUpdate::percent(10));
            state.request_stop();
            bridge.progress(ProgressUpdate::percent(20));
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3, "{output}");
        assert!(lines[0].contains("progress: relayed"));
        assert!(lines[1].contains("progress: dropped, throttled"));
        assert!(lines[2].contains("progress: dropped, no valid call context"));
    }

    #[test]
    fn quiet_without_debug_flag() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let (state, _) = recording_state();
            let bridge = CallbackBridge::new(&state, false);
            bridge.progress(ProgressUpdate::percent(10));
            bridge.progress(ProgressUpdate::percent(5));
        });
        assert!(buffer.0.lock().unwrap().is_empty());
    }

    #[test]
    fn cancel_poll_reflects_stop() {
        let (state, events) = recording_state();
        let bridge = CallbackBridge::new(&state, false);
        assert!(!bridge.cancel_requested(0));

        state.request_stop();
        assert!(bridge.cancel_requested(12));
        bridge.progress(ProgressUpdate::percent(90));
        assert!(events.lock().unwrap().is_empty());
    }
}
