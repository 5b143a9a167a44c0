//! Bounded waits on condition variables.
//!
//! Every blocking wait in Quarry has a deadline and reports how it ended,
//! so callers decide between retrying, failing, and forcing explicitly.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// How a bounded wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The awaited condition became true.
    Completed,
    /// The deadline passed first.
    TimedOut,
    /// The wait was abandoned because the awaited resource shut down.
    Cancelled,
}

impl WaitOutcome {
    /// Returns `true` if the condition was reached.
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns `true` if the deadline passed.
    pub fn timed_out(self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Locks a mutex, recovering the guard if a panicking thread poisoned it.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Waits on `condvar` until `done` holds or `timeout` elapses.
///
/// The predicate is checked before the first wait, so a zero timeout
/// simply reports the current condition.
pub fn wait_until<'a, T, F>(
    condvar: &Condvar,
    mut guard: MutexGuard<'a, T>,
    timeout: Duration,
    mut done: F,
) -> (MutexGuard<'a, T>, WaitOutcome)
where
    F: FnMut(&T) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if done(&*guard) {
            return (guard, WaitOutcome::Completed);
        }
        let now = Instant::now();
        if now >= deadline {
            return (guard, WaitOutcome::TimedOut);
        }
        guard = match condvar.wait_timeout(guard, deadline - now) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
    }
}
