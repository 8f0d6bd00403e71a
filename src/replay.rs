use std::collections::HashMap;
use std::sync::Mutex;

use compact_str::CompactString;

/// Per-subject record of the last accepted time step.
///
/// A code is single use: once a counter has been accepted for a subject, that
/// counter and every earlier one are refused.
pub trait ReplayGuard {
    /// Atomically accept `counter` for `subject` if it is newer than the stored
    /// cursor, advancing the cursor. Returns `false` for a replayed counter.
    fn try_accept(&self, subject: &str, counter: u64) -> bool;
}

/// [ReplayGuard] held in process memory
#[derive(Debug, Default)]
pub struct InMemoryReplayGuard {
    last_accepted: Mutex<HashMap<CompactString, u64>>,
}

impl InMemoryReplayGuard {
    /// Create an empty guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Last counter accepted for `subject`, if any
    pub fn last_accepted(&self, subject: &str) -> Option<u64> {
        self.last_accepted
            .lock()
            .ok()
            .and_then(|cursors| cursors.get(subject).copied())
    }

    /// Drop the cursor for `subject`, e.g. after the secret is rotated
    pub fn forget(&self, subject: &str) {
        if let Ok(mut cursors) = self.last_accepted.lock() {
            cursors.remove(subject);
        }
    }
}

impl ReplayGuard for InMemoryReplayGuard {
    fn try_accept(&self, subject: &str, counter: u64) -> bool {
        let Ok(mut cursors) = self.last_accepted.lock() else {
            tracing::error!(subject, "replay guard lock poisoned, refusing code");
            return false;
        };
        match cursors.get_mut(subject) {
            Some(last) if counter <= *last => false,
            Some(last) => {
                *last = counter;
                true
            }
            None => {
                cursors.insert(subject.into(), counter);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn rejects_same_and_older_counters() {
        let guard = InMemoryReplayGuard::new();
        assert!(guard.try_accept("alice", 10));
        assert!(!guard.try_accept("alice", 10));
        assert!(!guard.try_accept("alice", 9));
        assert!(guard.try_accept("alice", 11));
        assert_eq!(guard.last_accepted("alice"), Some(11));
    }

    #[test]
    fn subjects_are_independent() {
        let guard = InMemoryReplayGuard::new();
        assert!(guard.try_accept("alice", 10));
        assert!(guard.try_accept("bob", 10));
        assert_eq!(guard.last_accepted("carol"), None);
    }

    #[test]
    fn forget_resets_cursor() {
        let guard = InMemoryReplayGuard::new();
        assert!(guard.try_accept("alice", 10));
        guard.forget("alice");
        assert!(guard.try_accept("alice", 5));
    }

    #[test]
    fn concurrent_submissions_accept_once() {
        let guard = Arc::new(InMemoryReplayGuard::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || guard.try_accept("alice", 42))
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread panicked"))
            .filter(|accepted| *accepted)
            .count();
        assert_eq!(accepted, 1);
    }
}
