use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::event::TypingEvent;
use crate::session::{Subscription, TypingSession};
use crate::source::TextSource;
use crate::stats::StatsSnapshot;
use crate::util::lock;

pub const RECORDING_FORMAT_VERSION: &str = "1.0";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub version: String,
    /// Engine name/version that produced the recording.
    pub engine: String,
    /// Span between the first and last captured event, in ms of
    /// session time (distinct from the wall-clock start/end stamps).
    pub duration_ms: u64,
    pub event_count: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Durable, replayable capture of one session's full event stream.
/// Immutable once returned from `Recorder::stop`; plain JSON-friendly
/// data throughout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordingData {
    pub id: String,
    pub text_source: TextSource,
    /// Ordered by ascending timestamp, carrying the session's own event
    /// timestamps rather than capture-time rechecks.
    pub events: Vec<TypingEvent>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_stats: Option<StatsSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RecordingMetadata>,
}

impl RecordingData {
    /// Session-time span covered by the events.
    pub fn duration_ms(&self) -> u64 {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => last.timestamp().saturating_sub(first.timestamp()),
            _ => 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecorderOptions {
    /// Caller-supplied fields merged into the recording metadata.
    pub extra_metadata: BTreeMap<String, String>,
}

struct ActiveRecording {
    id: String,
    text_source: TextSource,
    started_wall: DateTime<Utc>,
    events: Arc<Mutex<Vec<TypingEvent>>>,
    subscription: Subscription,
}

/// Single-slot event capture. Starting while already recording is a
/// warned no-op, never an error; same for stopping while idle.
#[derive(Default)]
pub struct Recorder {
    options: RecorderOptions,
    active: Option<ActiveRecording>,
    last: Option<RecordingData>,
}

impl Recorder {
    pub fn new(options: RecorderOptions) -> Self {
        Self {
            options,
            active: None,
            last: None,
        }
    }

    pub fn start(&mut self, session: &mut TypingSession, source: &TextSource) {
        if self.active.is_some() {
            tracing::warn!("recorder already running; start ignored");
            return;
        }

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = session.subscribe(move |event| lock(&sink).push(event.clone()));

        self.active = Some(ActiveRecording {
            id: format!("recording-{:08x}", rand::thread_rng().gen::<u32>()),
            text_source: source.clone(),
            started_wall: Utc::now(),
            events,
            subscription,
        });
    }

    /// Seal and return the recording. `final_stats` is attached when
    /// the session ran to natural completion; teardown paths pass
    /// `None`.
    pub fn stop(&mut self, final_stats: Option<StatsSnapshot>) -> Option<RecordingData> {
        let Some(active) = self.active.take() else {
            tracing::warn!("recorder is not running; stop ignored");
            return None;
        };
        active.subscription.cancel();

        let events = lock(&active.events).clone();
        let duration_ms = match (events.first(), events.last()) {
            (Some(first), Some(last)) => last.timestamp().saturating_sub(first.timestamp()),
            _ => 0,
        };

        let metadata = RecordingMetadata {
            version: RECORDING_FORMAT_VERSION.to_string(),
            engine: format!("keystream/{}", env!("CARGO_PKG_VERSION")),
            duration_ms,
            event_count: events.len(),
            extra: self.options.extra_metadata.clone(),
        };

        let recording = RecordingData {
            id: active.id,
            text_source: active.text_source,
            events,
            start_time: active.started_wall,
            end_time: Utc::now(),
            final_stats,
            metadata: Some(metadata),
        };

        self.last = Some(recording.clone());
        Some(recording)
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Id of the in-progress recording, stable for its whole life.
    pub fn current_recording_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.id.as_str())
    }

    pub fn last_recording(&self) -> Option<&RecordingData> {
        self.last.as_ref()
    }

    /// Drop the in-progress capture (without sealing it) and the last
    /// finished recording.
    pub fn clear(&mut self) {
        if let Some(active) = self.active.take() {
            active.subscription.cancel();
        }
        self.last = None;
    }
}

pub fn serialize_recording(recording: &RecordingData) -> serde_json::Result<String> {
    serde_json::to_string(recording)
}

/// Malformed JSON surfaces the parser's own error, unwrapped.
pub fn deserialize_recording(json: &str) -> serde_json::Result<RecordingData> {
    serde_json::from_str(json)
}
