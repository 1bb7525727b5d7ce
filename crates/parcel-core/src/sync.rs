//! Poison-tolerant locking for state shared with test doubles and caches.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a `Mutex` without propagating poisoning.
///
/// A panic while holding one of these locks is already reported by the
/// panicking thread; the guarded data (call logs, scripted responses) stays
/// usable afterwards.
pub trait IgnoreLock<T> {
    /// Acquire the guard, recovering it from a poisoned lock.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;
}

impl<T> IgnoreLock<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn recovers_after_panic_while_locked() {
        let shared = Arc::new(Mutex::new(vec![1]));
        let clone = Arc::clone(&shared);
        let outcome = thread::spawn(move || {
            let _guard = clone.lock_ignore_poison();
            panic!("poison the lock");
        })
        .join();
        outcome.unwrap_err();
        assert!(shared.is_poisoned());

        shared.lock_ignore_poison().push(2);
        assert_eq!(*shared.lock_ignore_poison(), vec![1, 2]);
    }
}
