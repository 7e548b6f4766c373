use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::event::TypingEvent;
use crate::session::{Subscription, TypingSession};
use crate::util::{lock, round_half_up};

/// Point-in-time performance metrics, recomputed fresh on every call to
/// `snapshot()`. WPM follows the 5-chars-per-word convention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub started_at: Option<u64>,
    pub duration_ms: u64,
    pub correct_chars: u64,
    pub total_chars: u64,
    pub accuracy: u32,
    pub correct_cpm: u32,
    pub total_cpm: u32,
    pub wpm: u32,
    pub completed: bool,
}

#[derive(Debug, Default)]
struct Counters {
    started_at: Option<u64>,
    last_timestamp: Option<u64>,
    correct_chars: u64,
    total_chars: u64,
    completed: bool,
}

impl Counters {
    fn apply(&mut self, event: &TypingEvent) {
        match event {
            TypingEvent::SessionStart { timestamp } => {
                self.correct_chars = 0;
                self.total_chars = 0;
                self.completed = false;
                self.started_at = Some(*timestamp);
                self.last_timestamp = Some(*timestamp);
            }
            TypingEvent::InputEvaluate { timestamp, entry } => {
                self.total_chars += 1;
                if entry.correct {
                    self.correct_chars += 1;
                }
                self.last_timestamp = Some(*timestamp);
            }
            TypingEvent::InputUndo { timestamp, entry } => {
                self.total_chars = self.total_chars.saturating_sub(1);
                if entry.correct {
                    self.correct_chars = self.correct_chars.saturating_sub(1);
                }
                self.completed = false;
                self.last_timestamp = Some(*timestamp);
            }
            TypingEvent::SessionComplete { timestamp } => {
                self.completed = true;
                self.last_timestamp = Some(*timestamp);
            }
            TypingEvent::SessionReset { .. } => {
                *self = Counters::default();
            }
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let duration_ms = match (self.started_at, self.last_timestamp) {
            (Some(start), Some(last)) => last.saturating_sub(start),
            _ => 0,
        };
        let minutes = duration_ms as f64 / 60_000.0;

        let accuracy = if self.total_chars == 0 {
            100
        } else {
            round_half_up(self.correct_chars as f64 / self.total_chars as f64 * 100.0)
        };
        let (correct_cpm, total_cpm, wpm) = if minutes > 0.0 {
            let correct_cpm = round_half_up(self.correct_chars as f64 / minutes);
            let total_cpm = round_half_up(self.total_chars as f64 / minutes);
            let wpm = round_half_up(correct_cpm as f64 / 5.0);
            (correct_cpm, total_cpm, wpm)
        } else {
            (0, 0, 0)
        };

        StatsSnapshot {
            started_at: self.started_at,
            duration_ms,
            correct_chars: self.correct_chars,
            total_chars: self.total_chars,
            accuracy,
            correct_cpm,
            total_cpm,
            wpm,
            completed: self.completed,
        }
    }
}

/// Live metrics derived purely as a left-fold over a session's event
/// stream; never reads session state directly.
pub struct StatsTracker {
    counters: Arc<Mutex<Counters>>,
    subscription: Subscription,
}

impl StatsTracker {
    /// Subscribe to `session` and start folding. Attach before any
    /// other observer that wants to read snapshots from inside event
    /// callbacks, so the fold has already seen the event.
    pub fn attach(session: &mut TypingSession) -> Self {
        let counters = Arc::new(Mutex::new(Counters::default()));
        let fold = Arc::clone(&counters);
        let subscription = session.subscribe(move |event| lock(&fold).apply(event));
        Self {
            counters,
            subscription,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        lock(&self.counters).snapshot()
    }

    /// Stop folding. The tracker keeps serving its last-known snapshot.
    pub fn detach(&self) {
        self.subscription.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::TypingSessionOptions;

    fn session_with_clock(text: &str, start_ms: u64) -> (TypingSession, Arc<ManualClock>) {
        let clock = ManualClock::new(start_ms);
        let session = TypingSession::new(TypingSessionOptions {
            text: Some(text.to_string()),
            clock: Some(clock.clone()),
            ..Default::default()
        })
        .unwrap();
        (session, clock)
    }

    #[test]
    fn test_initial_snapshot() {
        let (mut session, _) = session_with_clock("ab", 0);
        let stats = StatsTracker::attach(&mut session);

        let snap = stats.snapshot();
        assert_eq!(snap.total_chars, 0);
        assert_eq!(snap.accuracy, 100);
        assert_eq!(snap.wpm, 0);
        assert_eq!(snap.duration_ms, 0);
        assert!(!snap.completed);
    }

    #[test]
    fn test_thirty_second_scenario() {
        let (mut session, clock) = session_with_clock("ab", 1_000);
        let stats = StatsTracker::attach(&mut session);

        session.input("a");
        clock.advance(30_000);
        session.input("x");

        let snap = stats.snapshot();
        assert_eq!(snap.correct_chars, 1);
        assert_eq!(snap.total_chars, 2);
        assert_eq!(snap.accuracy, 50);
        assert_eq!(snap.correct_cpm, 2);
        assert_eq!(snap.total_cpm, 4);
        assert_eq!(snap.wpm, 0);
        assert_eq!(snap.duration_ms, 30_000);
        assert!(snap.completed);
    }

    #[test]
    fn test_undo_rolls_counters_back() {
        let (mut session, clock) = session_with_clock("abc", 0);
        let stats = StatsTracker::attach(&mut session);

        session.input("ax");
        clock.advance(1_000);
        session.undo(1);

        let snap = stats.snapshot();
        assert_eq!(snap.total_chars, 1);
        assert_eq!(snap.correct_chars, 1);
        assert_eq!(snap.accuracy, 100);
        assert!(!snap.completed);
        assert_eq!(snap.duration_ms, 1_000);
    }

    #[test]
    fn test_undo_clears_completed() {
        let (mut session, _) = session_with_clock("ab", 0);
        let stats = StatsTracker::attach(&mut session);

        session.input("ab");
        assert!(stats.snapshot().completed);

        session.undo(1);
        assert!(!stats.snapshot().completed);
    }

    #[test]
    fn test_reset_clears_everything() {
        let (mut session, clock) = session_with_clock("abc", 0);
        let stats = StatsTracker::attach(&mut session);

        session.input("ab");
        clock.advance(5_000);
        session.reset();

        let snap = stats.snapshot();
        assert_eq!(snap.total_chars, 0);
        assert_eq!(snap.correct_chars, 0);
        assert_eq!(snap.duration_ms, 0);
        assert_eq!(snap.started_at, None);
        assert_eq!(snap.accuracy, 100); // empty fold derives like a fresh one
        assert!(!snap.completed);
    }

    #[test]
    fn test_accuracy_rounds_half_up() {
        let (mut session, _) = session_with_clock("abcde", 0);
        let stats = StatsTracker::attach(&mut session);

        // 1 of 3 correct: 33.33 -> 33
        session.input("axx");
        assert_eq!(stats.snapshot().accuracy, 33);

        // 2 of 4 correct: exactly 50
        session.input("d");
        assert_eq!(stats.snapshot().accuracy, 50);
    }

    #[test]
    fn test_zero_duration_rates_are_zero() {
        let (mut session, _) = session_with_clock("abc", 0);
        let stats = StatsTracker::attach(&mut session);

        // all input at the same instant
        session.input("ab");

        let snap = stats.snapshot();
        assert_eq!(snap.duration_ms, 0);
        assert_eq!(snap.correct_cpm, 0);
        assert_eq!(snap.total_cpm, 0);
        assert_eq!(snap.wpm, 0);
        assert_eq!(snap.accuracy, 100);
    }

    #[test]
    fn test_wpm_is_correct_cpm_over_five() {
        let (mut session, clock) = session_with_clock("abcdefghij", 0);
        let stats = StatsTracker::attach(&mut session);

        session.input("a");
        clock.advance(6_000); // 0.1 minutes
        session.input("bcdefghij");

        let snap = stats.snapshot();
        assert_eq!(snap.correct_chars, 10);
        assert_eq!(snap.correct_cpm, 100);
        assert_eq!(snap.wpm, 20);
    }

    #[test]
    fn test_detach_freezes_the_fold() {
        let (mut session, _) = session_with_clock("abc", 0);
        let stats = StatsTracker::attach(&mut session);

        session.input("a");
        stats.detach();
        session.input("b");

        assert_eq!(stats.snapshot().total_chars, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = StatsSnapshot {
            started_at: Some(1),
            duration_ms: 2,
            correct_chars: 3,
            total_chars: 4,
            accuracy: 75,
            correct_cpm: 90,
            total_cpm: 120,
            wpm: 18,
            completed: true,
        };

        let json = serde_json::to_string(&snap).unwrap();
        let back: StatsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
