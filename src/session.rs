use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::{SharedClock, SystemClock};
use crate::error::Error;
use crate::event::{TypingEntry, TypingEvent};
use crate::source::{create_text_source, TextSource, TextSourceOptions};
use crate::tokenizer::{code_unit_chars, Token};

#[derive(Clone, Default)]
pub struct TypingSessionOptions {
    pub text: Option<String>,
    pub source: Option<TextSource>,
    pub tokens: Option<Vec<Token>>,
    pub locale: Option<String>,
    pub clock: Option<SharedClock>,
}

/// Defensive copy of session state. Mutating it never touches the
/// session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    pub text: String,
    pub position: usize,
    pub entries: Vec<TypingEntry>,
    pub completed: bool,
    pub started_at: Option<u64>,
    pub source_id: String,
    pub locale: Option<String>,
}

/// Handle returned by `subscribe`. Cancelling takes effect at the next
/// event dispatch; it never disturbs a dispatch already in flight.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

struct Subscriber {
    id: u64,
    active: Arc<AtomicBool>,
    listener: Box<dyn FnMut(&TypingEvent) + Send>,
}

/// The typing state machine. Consumes per-character input against the
/// token sequence, keeps position/entries/completion, and emits the
/// ordered event stream everything else derives from.
///
/// All mutation happens synchronously inside `input`/`undo`/`reset`;
/// `&mut self` makes re-entrant mutation from inside a listener
/// unrepresentable.
pub struct TypingSession {
    source: TextSource,
    position: usize,
    entries: Vec<TypingEntry>,
    completed: bool,
    started_at: Option<u64>,
    clock: SharedClock,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: u64,
}

impl TypingSession {
    pub fn new(options: TypingSessionOptions) -> Result<Self, Error> {
        let TypingSessionOptions {
            text,
            source,
            tokens,
            locale,
            clock,
        } = options;

        let source = match (source, text) {
            (Some(source), _) => source,
            (None, Some(text)) => create_text_source(
                &text,
                TextSourceOptions {
                    locale,
                    tokens,
                    ..Default::default()
                },
            )?,
            (None, None) => return Err(Error::MissingInput),
        };

        Ok(Self::with_source_and_clock(
            source,
            clock.unwrap_or_else(|| Arc::new(SystemClock)),
        ))
    }

    pub fn from_text(text: &str) -> Result<Self, Error> {
        Self::new(TypingSessionOptions {
            text: Some(text.to_string()),
            ..Default::default()
        })
    }

    pub fn from_source(source: TextSource) -> Self {
        Self::with_source_and_clock(source, Arc::new(SystemClock))
    }

    fn with_source_and_clock(source: TextSource, clock: SharedClock) -> Self {
        Self {
            source,
            position: 0,
            entries: Vec::new(),
            completed: false,
            started_at: None,
            clock,
            subscribers: Vec::new(),
            next_subscriber_id: 0,
        }
    }

    /// Evaluate `chars` one code unit at a time (a paste or IME commit
    /// is a batch of single evaluations). Characters left over once the
    /// token sequence is exhausted are dropped, not buffered.
    pub fn input(&mut self, chars: &str) {
        if chars.is_empty() {
            tracing::warn!("input called with an empty string; ignoring");
            return;
        }

        for c in code_unit_chars(chars) {
            if self.position >= self.source.tokens.len() {
                self.completed = true;
                break;
            }

            if self.started_at.is_none() {
                let timestamp = self.now();
                self.started_at = Some(timestamp);
                self.emit(TypingEvent::SessionStart { timestamp });
            }

            let expected = self.source.tokens[self.position].char;
            // Enter-key tolerance: an expected newline accepts \r as well
            let correct = c == expected || (expected == '\n' && c == '\r');
            let entry = TypingEntry {
                index: self.position,
                expected,
                actual: c,
                correct,
            };

            self.entries.push(entry);
            self.position += 1;
            self.emit(TypingEvent::InputEvaluate {
                timestamp: self.now(),
                entry,
            });

            if self.position == self.source.tokens.len() {
                self.completed = true;
                self.emit(TypingEvent::SessionComplete {
                    timestamp: self.now(),
                });
                break;
            }
        }
    }

    /// Pop up to `count` entries, newest first. Each pop rewinds the
    /// position to the popped entry's index and clears completion.
    pub fn undo(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        if self.entries.is_empty() {
            tracing::warn!("undo called with no entries to pop; ignoring");
            return;
        }

        for _ in 0..count {
            let Some(entry) = self.entries.pop() else {
                break;
            };
            self.position = entry.index;
            self.completed = false;
            self.emit(TypingEvent::InputUndo {
                timestamp: self.now(),
                entry,
            });
        }
    }

    /// Back to not-started. Emits unconditionally, even when nothing
    /// has happened yet.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.position = 0;
        self.completed = false;
        self.started_at = None;
        self.emit(TypingEvent::SessionReset {
            timestamp: self.now(),
        });
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            text: self.source.content.clone(),
            position: self.position,
            entries: self.entries.clone(),
            completed: self.completed,
            started_at: self.started_at,
            source_id: self.source.id.clone(),
            locale: self.source.locale.clone(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn source(&self) -> &TextSource {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.source.tokens
    }

    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&TypingEvent) + Send + 'static,
    {
        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;
        let active = Arc::new(AtomicBool::new(true));
        self.subscribers.push(Subscriber {
            id,
            active: Arc::clone(&active),
            listener: Box::new(listener),
        });
        Subscription { id, active }
    }

    pub fn unsubscribe(&mut self, subscription: &Subscription) {
        subscription.cancel();
        self.subscribers.retain(|s| s.id != subscription.id);
    }

    fn emit(&mut self, event: TypingEvent) {
        // Liveness is decided once per dispatch; a cancel arriving
        // mid-pass affects the next event, not this one.
        self.subscribers.retain(|s| s.active.load(Ordering::SeqCst));
        for subscriber in self.subscribers.iter_mut() {
            (subscriber.listener)(&event);
        }
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }
}
