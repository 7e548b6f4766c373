use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use strum_macros::Display;

use crate::event::TypingEvent;
use crate::recorder::RecordingData;
use crate::util::lock;

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 10.0;
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
    Completed,
}

pub type EventCallback = Arc<dyn Fn(&TypingEvent) + Send + Sync>;
pub type CompleteCallback = Arc<dyn Fn() + Send + Sync>;
/// Receives `(current_ms, duration_ms)` in recording time.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Clone)]
pub struct PlayerOptions {
    pub recording: RecordingData,
    pub playback_speed: f64,
    pub progress_interval: Duration,
    pub on_event: Option<EventCallback>,
    pub on_complete: Option<CompleteCallback>,
    pub on_progress: Option<ProgressCallback>,
}

impl PlayerOptions {
    pub fn new(recording: RecordingData) -> Self {
        Self {
            recording,
            playback_speed: 1.0,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            on_event: None,
            on_complete: None,
            on_progress: None,
        }
    }
}

struct Shared {
    state: PlayerState,
    speed: f64,
    /// Next event to fire.
    next_index: usize,
    /// Position in recording time, clamped to `[0, duration]`.
    elapsed_ms: u64,
    /// Bumped on play/seek/stop so a superseded worker abandons its
    /// wait instead of firing stale callbacks.
    generation: u64,
}

struct Core {
    events: Vec<TypingEvent>,
    /// Event times relative to the first event.
    offsets: Vec<u64>,
    duration_ms: u64,
    progress_interval: Duration,
    shared: Mutex<Shared>,
    wake: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
    on_event: Option<EventCallback>,
    on_complete: Option<CompleteCallback>,
    on_progress: Option<ProgressCallback>,
}

/// Replays a recording's event stream with scaled timing, independent
/// of any live session. Scheduling runs on a worker thread; all control
/// methods are idempotent and safe mid-playback.
pub struct Player {
    core: Arc<Core>,
}

impl Player {
    pub fn new(options: PlayerOptions) -> Self {
        let PlayerOptions {
            recording,
            playback_speed,
            progress_interval,
            on_event,
            on_complete,
            on_progress,
        } = options;

        let events = recording.events;
        let base = events.first().map_or(0, |e| e.timestamp());
        let offsets: Vec<u64> = events
            .iter()
            .map(|e| e.timestamp().saturating_sub(base))
            .collect();
        let duration_ms = offsets.last().copied().unwrap_or(0);
        let speed = if playback_speed.is_finite() {
            playback_speed.clamp(MIN_SPEED, MAX_SPEED)
        } else {
            1.0
        };

        Self {
            core: Arc::new(Core {
                events,
                offsets,
                duration_ms,
                progress_interval,
                shared: Mutex::new(Shared {
                    state: PlayerState::Idle,
                    speed,
                    next_index: 0,
                    elapsed_ms: 0,
                    generation: 0,
                }),
                wake: Condvar::new(),
                worker: Mutex::new(None),
                on_event,
                on_complete,
                on_progress,
            }),
        }
    }

    /// Start or resume playback. The opening event of a fresh run fires
    /// immediately at `current_time == 0`, so a consumer always sees an
    /// initial state even for a zero-duration recording. Calling from
    /// `Completed` restarts from the beginning.
    pub fn play(&self) {
        let core = Arc::clone(&self.core);
        let mut s = lock(&core.shared);
        if s.state == PlayerState::Playing {
            return;
        }
        if s.state == PlayerState::Completed {
            s.next_index = 0;
            s.elapsed_ms = 0;
            s.state = PlayerState::Idle;
        }
        if core.events.is_empty() {
            s.state = PlayerState::Completed;
            s.generation += 1;
            drop(s);
            core.wake.notify_all();
            if let Some(cb) = &core.on_complete {
                cb();
            }
            return;
        }

        let opening = s.state == PlayerState::Idle && s.next_index == 0 && s.elapsed_ms == 0;
        s.state = PlayerState::Playing;
        s.generation += 1;
        let generation = s.generation;
        if opening {
            s.next_index = 1;
        }
        drop(s);
        core.wake.notify_all();
        self.retire_worker();

        if opening {
            if let Some(cb) = &core.on_event {
                cb(&core.events[0]);
            }
        }

        let worker_core = Arc::clone(&core);
        let handle = thread::spawn(move || run_playback(worker_core, generation));
        *lock(&core.worker) = Some(handle);
    }

    /// Freeze playback, keeping the elapsed position exact. No-op
    /// unless playing. The worker settles its elapsed accounting and
    /// exits before this returns.
    pub fn pause(&self) {
        let mut s = lock(&self.core.shared);
        if s.state == PlayerState::Playing {
            s.state = PlayerState::Paused;
            drop(s);
            self.core.wake.notify_all();
            self.retire_worker();
        }
    }

    /// Back to idle at position zero. Idempotent; once this returns, no
    /// further callback fires.
    pub fn stop(&self) {
        let mut s = lock(&self.core.shared);
        s.state = PlayerState::Idle;
        s.next_index = 0;
        s.elapsed_ms = 0;
        s.generation += 1;
        drop(s);
        self.core.wake.notify_all();
        self.retire_worker();
    }

    /// Jump to `position_ms` (clamped to the recording's span), firing
    /// the last event at or before it so position-driven consumers land
    /// on a consistent state. Resumes scheduling if playback was live.
    pub fn seek(&self, position_ms: u64) {
        let core = Arc::clone(&self.core);
        let mut s = lock(&core.shared);
        let target = position_ms.min(core.duration_ms);
        s.generation += 1;
        let generation = s.generation;
        let landing = core.offsets.iter().rposition(|&o| o <= target);
        s.elapsed_ms = target;
        s.next_index = landing.map_or(0, |i| i + 1);
        let resume = s.state == PlayerState::Playing;
        drop(s);
        core.wake.notify_all();
        self.retire_worker();

        if let (Some(index), Some(cb)) = (landing, &core.on_event) {
            cb(&core.events[index]);
        }

        if resume {
            let worker_core = Arc::clone(&core);
            let handle = thread::spawn(move || run_playback(worker_core, generation));
            *lock(&core.worker) = Some(handle);
        }
    }

    /// Clamped to `[0.1, 10.0]`; safe to call mid-playback. The wait in
    /// flight is re-derived on wakeup, so the new speed applies from
    /// now, not retroactively.
    pub fn set_speed(&self, speed: f64) {
        if !speed.is_finite() {
            return;
        }
        let mut s = lock(&self.core.shared);
        s.speed = speed.clamp(MIN_SPEED, MAX_SPEED);
        drop(s);
        self.core.wake.notify_all();
    }

    pub fn state(&self) -> PlayerState {
        lock(&self.core.shared).state
    }

    pub fn current_time(&self) -> u64 {
        lock(&self.core.shared).elapsed_ms
    }

    pub fn duration_ms(&self) -> u64 {
        self.core.duration_ms
    }

    pub fn speed(&self) -> f64 {
        lock(&self.core.shared).speed
    }

    /// Join the superseded worker. Callers must have changed the
    /// generation or state and notified first, or this can block for a
    /// full event gap. Skipped when called from the worker itself (a
    /// callback invoking stop/play).
    fn retire_worker(&self) {
        let handle = lock(&self.core.worker).take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_playback(core: Arc<Core>, generation: u64) {
    let mut last_progress = Instant::now();
    let mut guard = lock(&core.shared);
    loop {
        if guard.generation != generation || guard.state != PlayerState::Playing {
            return;
        }

        if guard.next_index >= core.events.len() {
            guard.state = PlayerState::Completed;
            drop(guard);
            if let Some(cb) = &core.on_progress {
                cb(core.duration_ms, core.duration_ms);
            }
            if let Some(cb) = &core.on_complete {
                cb();
            }
            return;
        }

        let target = core.offsets[guard.next_index];
        if guard.elapsed_ms >= target {
            let index = guard.next_index;
            guard.next_index += 1;
            guard.elapsed_ms = target;
            drop(guard);
            if let Some(cb) = &core.on_event {
                cb(&core.events[index]);
            }
            guard = lock(&core.shared);
            continue;
        }

        let speed = guard.speed;
        let remaining = Duration::from_secs_f64(((target - guard.elapsed_ms) as f64 / speed) / 1000.0);
        let wait = if core.on_progress.is_some() {
            remaining.min(core.progress_interval)
        } else {
            remaining
        };

        let begun = Instant::now();
        let (g, _timed_out) = core
            .wake
            .wait_timeout(guard, wait)
            .unwrap_or_else(|e| e.into_inner());
        guard = g;
        if guard.generation != generation {
            return;
        }

        // account for the time actually waited, at the speed that was
        // in effect during the wait
        let advanced = (begun.elapsed().as_secs_f64() * 1000.0 * speed).round() as u64;
        guard.elapsed_ms = (guard.elapsed_ms + advanced).min(target);

        if core.on_progress.is_some()
            && guard.state == PlayerState::Playing
            && last_progress.elapsed() >= core.progress_interval
        {
            let current = guard.elapsed_ms;
            drop(guard);
            last_progress = Instant::now();
            if let Some(cb) = &core.on_progress {
                cb(current, core.duration_ms);
            }
            guard = lock(&core.shared);
        }
    }
}
