use std::sync::{Mutex, MutexGuard};

/// Round-half-up on a non-negative ratio; anything non-finite or
/// negative flattens to zero.
pub fn round_half_up(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round() as u32
    } else {
        0
    }
}

/// Lock that shrugs off poisoning. The guarded state in this crate is
/// plain counters and buffers, still usable after a panicked holder.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
