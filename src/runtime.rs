use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock::SharedClock;
use crate::error::Error;
use crate::event::TypingEvent;
use crate::recorder::{Recorder, RecorderOptions, RecordingData};
use crate::session::{Subscription, TypingSession, TypingSessionOptions};
use crate::source::TextSource;
use crate::stats::{StatsSnapshot, StatsTracker};
use crate::util::lock;

/// Audio feedback cues. Evaluate emits `Key` then `Correct`/`Incorrect`;
/// natural completion emits `Complete`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoundCue {
    Key,
    Correct,
    Incorrect,
    Complete,
}

/// What to type against. An explicit variant per shape, so a caller can
/// never be mis-detected structurally.
pub enum SessionInput {
    Text(String),
    Source(TextSource),
    Options(TypingSessionOptions),
}

pub type EventCallback = Arc<dyn Fn(&TypingEvent) + Send + Sync>;
pub type SnapshotCallback = Arc<dyn Fn(Option<StatsSnapshot>) + Send + Sync>;
pub type SoundCallback = Arc<dyn Fn(SoundCue) + Send + Sync>;

#[derive(Clone)]
pub struct RuntimeOptions {
    /// Cadence of the background `on_snapshot` push. Zero disables the
    /// poller entirely.
    pub snapshot_interval: Duration,
    /// Record every session this runtime starts.
    pub record: bool,
    pub recorder_options: RecorderOptions,
    pub clock: Option<SharedClock>,
    pub on_snapshot: Option<SnapshotCallback>,
    pub on_evaluate: Option<EventCallback>,
    pub on_undo: Option<EventCallback>,
    pub on_complete: Option<EventCallback>,
    pub on_reset: Option<EventCallback>,
    pub on_sound: Option<SoundCallback>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            snapshot_interval: Duration::from_millis(1000),
            record: false,
            recorder_options: RecorderOptions::default(),
            clock: None,
            on_snapshot: None,
            on_evaluate: None,
            on_undo: None,
            on_complete: None,
            on_reset: None,
            on_sound: None,
        }
    }
}

struct ActiveSession {
    session: Arc<Mutex<TypingSession>>,
    stats: Arc<StatsTracker>,
    dispatcher: Subscription,
    poller_stop: Option<Sender<()>>,
    poller: Option<JoinHandle<()>>,
}

/// Binds one session's lifecycle to stats, optional recording, the
/// pass-through callbacks, and a periodic snapshot push. At most one
/// session is live per runtime; starting a new one tears the old one
/// down first, so two sessions' events can never interleave here.
pub struct SessionRuntime {
    options: RuntimeOptions,
    recorder: Option<Arc<Mutex<Recorder>>>,
    active: Option<ActiveSession>,
    last_recording: Arc<Mutex<Option<RecordingData>>>,
}

impl SessionRuntime {
    pub fn new(options: RuntimeOptions) -> Self {
        Self {
            options,
            recorder: None,
            active: None,
            last_recording: Arc::new(Mutex::new(None)),
        }
    }

    pub fn start_session(
        &mut self,
        input: SessionInput,
    ) -> Result<Arc<Mutex<TypingSession>>, Error> {
        self.teardown();

        let session_options = match input {
            SessionInput::Text(text) => TypingSessionOptions {
                text: Some(text),
                clock: self.options.clock.clone(),
                ..Default::default()
            },
            SessionInput::Source(source) => TypingSessionOptions {
                source: Some(source),
                clock: self.options.clock.clone(),
                ..Default::default()
            },
            SessionInput::Options(mut options) => {
                if options.clock.is_none() {
                    options.clock = self.options.clock.clone();
                }
                options
            }
        };

        let mut session = TypingSession::new(session_options)?;

        // stats subscribes first so its fold has already absorbed an
        // event by the time the dispatcher below reads a snapshot
        let stats = Arc::new(StatsTracker::attach(&mut session));

        if self.options.record {
            let recorder = self.recorder.get_or_insert_with(|| {
                Arc::new(Mutex::new(Recorder::new(
                    self.options.recorder_options.clone(),
                )))
            });
            let source = session.source().clone();
            lock(recorder).start(&mut session, &source);
        }

        let dispatcher = self.attach_dispatcher(&mut session, &stats);

        let session = Arc::new(Mutex::new(session));
        let (poller_stop, poller) = self.spawn_poller(&stats);

        self.active = Some(ActiveSession {
            session: Arc::clone(&session),
            stats,
            dispatcher,
            poller_stop,
            poller,
        });

        Ok(session)
    }

    /// Same teardown as `start_session`, with nothing new started. The
    /// final `on_snapshot(None)` tells the UI the session is gone; it
    /// fires only when a session was actually live, so disposing an
    /// idle runtime stays silent.
    pub fn dispose(&mut self) {
        if self.teardown() {
            if let Some(on_snapshot) = &self.options.on_snapshot {
                on_snapshot(None);
            }
        }
    }

    pub fn session(&self) -> Option<Arc<Mutex<TypingSession>>> {
        self.active.as_ref().map(|a| Arc::clone(&a.session))
    }

    pub fn latest_snapshot(&self) -> Option<StatsSnapshot> {
        self.active.as_ref().map(|a| a.stats.snapshot())
    }

    pub fn recorder(&self) -> Option<Arc<Mutex<Recorder>>> {
        self.recorder.clone()
    }

    pub fn last_recording(&self) -> Option<RecordingData> {
        lock(&self.last_recording).clone()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder
            .as_ref()
            .map_or(false, |r| lock(r).is_recording())
    }

    /// Stop the poller, cancel subscriptions, and seal any recording in
    /// progress (without stats; natural completion attaches them in the
    /// dispatcher instead). Returns whether a session was live.
    fn teardown(&mut self) -> bool {
        let Some(mut active) = self.active.take() else {
            return false;
        };

        // dropping the sender wakes the poller out of its timeout wait
        active.poller_stop.take();
        if let Some(handle) = active.poller.take() {
            let _ = handle.join();
        }

        active.dispatcher.cancel();
        active.stats.detach();

        if let Some(recorder) = &self.recorder {
            let mut recorder = lock(recorder);
            if recorder.is_recording() {
                if let Some(recording) = recorder.stop(None) {
                    *lock(&self.last_recording) = Some(recording);
                }
            }
        }

        true
    }

    fn attach_dispatcher(
        &self,
        session: &mut TypingSession,
        stats: &Arc<StatsTracker>,
    ) -> Subscription {
        let on_evaluate = self.options.on_evaluate.clone();
        let on_undo = self.options.on_undo.clone();
        let on_complete = self.options.on_complete.clone();
        let on_reset = self.options.on_reset.clone();
        let on_sound = self.options.on_sound.clone();
        let recorder = if self.options.record {
            self.recorder.clone()
        } else {
            None
        };
        let stats = Arc::clone(stats);
        let last_recording = Arc::clone(&self.last_recording);

        session.subscribe(move |event| match event {
            TypingEvent::SessionStart { .. } => {}
            TypingEvent::InputEvaluate { entry, .. } => {
                if let Some(sound) = &on_sound {
                    sound(SoundCue::Key);
                    sound(if entry.correct {
                        SoundCue::Correct
                    } else {
                        SoundCue::Incorrect
                    });
                }
                if let Some(cb) = &on_evaluate {
                    cb(event);
                }
            }
            TypingEvent::InputUndo { .. } => {
                if let Some(cb) = &on_undo {
                    cb(event);
                }
            }
            TypingEvent::SessionComplete { .. } => {
                if let Some(sound) = &on_sound {
                    sound(SoundCue::Complete);
                }
                if let Some(recorder) = &recorder {
                    let mut recorder = lock(recorder);
                    if recorder.is_recording() {
                        let snapshot = stats.snapshot();
                        if let Some(recording) = recorder.stop(Some(snapshot)) {
                            *lock(&last_recording) = Some(recording);
                        }
                    }
                }
                if let Some(cb) = &on_complete {
                    cb(event);
                }
            }
            TypingEvent::SessionReset { .. } => {
                if let Some(recorder) = &recorder {
                    let mut recorder = lock(recorder);
                    if recorder.is_recording() {
                        if let Some(recording) = recorder.stop(None) {
                            *lock(&last_recording) = Some(recording);
                        }
                    }
                }
                if let Some(cb) = &on_reset {
                    cb(event);
                }
            }
        })
    }

    fn spawn_poller(
        &self,
        stats: &Arc<StatsTracker>,
    ) -> (Option<Sender<()>>, Option<JoinHandle<()>>) {
        let interval = self.options.snapshot_interval;
        if interval.is_zero() {
            return (None, None);
        }
        let Some(on_snapshot) = self.options.on_snapshot.clone() else {
            return (None, None);
        };

        let stats = Arc::clone(stats);
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || loop {
            match rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => on_snapshot(Some(stats.snapshot())),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        (Some(tx), Some(handle))
    }
}

impl Drop for SessionRuntime {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::source::{create_text_source, TextSourceOptions};

    fn counted_callback(counter: &Arc<Mutex<Vec<TypingEvent>>>) -> EventCallback {
        let sink = Arc::clone(counter);
        Arc::new(move |event: &TypingEvent| lock(&sink).push(event.clone()))
    }

    #[test]
    fn test_start_session_from_text() {
        let mut runtime = SessionRuntime::new(RuntimeOptions {
            snapshot_interval: Duration::ZERO,
            ..Default::default()
        });

        let session = runtime.start_session(SessionInput::Text("ab".into())).unwrap();
        lock(&session).input("ab");

        assert!(lock(&session).is_complete());
        assert_eq!(runtime.latest_snapshot().unwrap().total_chars, 2);
    }

    #[test]
    fn test_start_session_from_source_and_options() {
        let mut runtime = SessionRuntime::new(RuntimeOptions {
            snapshot_interval: Duration::ZERO,
            ..Default::default()
        });

        let source = create_text_source("xy", TextSourceOptions::default()).unwrap();
        let session = runtime
            .start_session(SessionInput::Source(source.clone()))
            .unwrap();
        assert_eq!(lock(&session).state().source_id, source.id);

        let session = runtime
            .start_session(SessionInput::Options(TypingSessionOptions {
                text: Some("z".into()),
                ..Default::default()
            }))
            .unwrap();
        assert_eq!(lock(&session).tokens().len(), 1);
    }

    #[test]
    fn test_missing_input_propagates() {
        let mut runtime = SessionRuntime::new(RuntimeOptions {
            snapshot_interval: Duration::ZERO,
            ..Default::default()
        });

        let result = runtime.start_session(SessionInput::Options(TypingSessionOptions::default()));
        assert!(result.is_err());
        assert!(runtime.session().is_none());
    }

    #[test]
    fn test_passthrough_callbacks() {
        let evaluates = Arc::new(Mutex::new(Vec::new()));
        let completes = Arc::new(Mutex::new(Vec::new()));
        let undos = Arc::new(Mutex::new(Vec::new()));
        let resets = Arc::new(Mutex::new(Vec::new()));

        let mut runtime = SessionRuntime::new(RuntimeOptions {
            snapshot_interval: Duration::ZERO,
            on_evaluate: Some(counted_callback(&evaluates)),
            on_complete: Some(counted_callback(&completes)),
            on_undo: Some(counted_callback(&undos)),
            on_reset: Some(counted_callback(&resets)),
            ..Default::default()
        });

        let session = runtime.start_session(SessionInput::Text("ab".into())).unwrap();
        {
            let mut session = lock(&session);
            session.input("a");
            session.undo(1);
            session.input("ab");
            session.reset();
        }

        assert_eq!(lock(&evaluates).len(), 3);
        assert_eq!(lock(&undos).len(), 1);
        assert_eq!(lock(&completes).len(), 1);
        assert_eq!(lock(&resets).len(), 1);
    }

    #[test]
    fn test_sound_cues_in_order() {
        let cues = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&cues);

        let mut runtime = SessionRuntime::new(RuntimeOptions {
            snapshot_interval: Duration::ZERO,
            on_sound: Some(Arc::new(move |cue| lock(&sink).push(cue))),
            ..Default::default()
        });

        let session = runtime.start_session(SessionInput::Text("ab".into())).unwrap();
        lock(&session).input("ax");

        assert_eq!(
            lock(&cues).as_slice(),
            &[
                SoundCue::Key,
                SoundCue::Correct,
                SoundCue::Key,
                SoundCue::Incorrect,
                SoundCue::Complete,
            ]
        );
    }

    #[test]
    fn test_recording_captures_final_stats_on_completion() {
        let clock = ManualClock::new(0);
        let mut runtime = SessionRuntime::new(RuntimeOptions {
            snapshot_interval: Duration::ZERO,
            record: true,
            clock: Some(clock.clone()),
            ..Default::default()
        });

        let session = runtime.start_session(SessionInput::Text("ab".into())).unwrap();
        assert!(runtime.is_recording());

        lock(&session).input("a");
        clock.advance(100);
        lock(&session).input("b");

        assert!(!runtime.is_recording());
        let recording = runtime.last_recording().unwrap();
        let stats = recording.final_stats.unwrap();
        assert_eq!(stats.total_chars, 2);
        assert_eq!(stats.accuracy, 100);
        assert!(stats.completed);
        assert_eq!(recording.events.len(), 4);
    }

    #[test]
    fn test_reset_seals_recording_without_stats() {
        let mut runtime = SessionRuntime::new(RuntimeOptions {
            snapshot_interval: Duration::ZERO,
            record: true,
            ..Default::default()
        });

        let session = runtime.start_session(SessionInput::Text("abc".into())).unwrap();
        {
            let mut session = lock(&session);
            session.input("a");
            session.reset();
        }

        assert!(!runtime.is_recording());
        let recording = runtime.last_recording().unwrap();
        assert!(recording.final_stats.is_none());
    }

    #[test]
    fn test_starting_again_tears_down_previous() {
        let evaluates = Arc::new(Mutex::new(Vec::new()));
        let mut runtime = SessionRuntime::new(RuntimeOptions {
            snapshot_interval: Duration::ZERO,
            on_evaluate: Some(counted_callback(&evaluates)),
            ..Default::default()
        });

        let first = runtime.start_session(SessionInput::Text("abc".into())).unwrap();
        let _second = runtime.start_session(SessionInput::Text("xyz".into())).unwrap();

        // old session is detached from the runtime's callbacks
        lock(&first).input("a");
        assert!(lock(&evaluates).is_empty());
    }

    #[test]
    fn test_snapshot_poller_fires_and_dispose_silences_it() {
        let snapshots: Arc<Mutex<Vec<Option<StatsSnapshot>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&snapshots);

        let mut runtime = SessionRuntime::new(RuntimeOptions {
            snapshot_interval: Duration::from_millis(10),
            on_snapshot: Some(Arc::new(move |snap| lock(&sink).push(snap))),
            ..Default::default()
        });

        runtime.start_session(SessionInput::Text("ab".into())).unwrap();
        thread::sleep(Duration::from_millis(60));
        assert!(!lock(&snapshots).is_empty());

        runtime.dispose();
        let count = lock(&snapshots).len();
        assert_eq!(lock(&snapshots)[count - 1], None);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(lock(&snapshots).len(), count);
        assert!(runtime.session().is_none());
    }

    #[test]
    fn test_dispose_without_session_is_a_noop() {
        let snapshots: Arc<Mutex<Vec<Option<StatsSnapshot>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&snapshots);

        let mut runtime = SessionRuntime::new(RuntimeOptions {
            snapshot_interval: Duration::ZERO,
            on_snapshot: Some(Arc::new(move |snap| lock(&sink).push(snap))),
            ..Default::default()
        });

        runtime.dispose();
        runtime.dispose();

        assert!(lock(&snapshots).is_empty());
    }

    #[test]
    fn test_zero_interval_disables_poller() {
        let snapshots: Arc<Mutex<Vec<Option<StatsSnapshot>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&snapshots);

        let mut runtime = SessionRuntime::new(RuntimeOptions {
            snapshot_interval: Duration::ZERO,
            on_snapshot: Some(Arc::new(move |snap| lock(&sink).push(snap))),
            ..Default::default()
        });

        runtime.start_session(SessionInput::Text("ab".into())).unwrap();
        thread::sleep(Duration::from_millis(30));

        assert!(lock(&snapshots).is_empty());
    }
}
