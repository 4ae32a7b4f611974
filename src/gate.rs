//! Single-fire guard for opening the communication channel.

use std::sync::atomic::{AtomicBool, Ordering};

/// Ensures the channel-open workflow is entered at most once per process.
///
/// [`try_open`](ChannelGate::try_open) is an atomic compare-and-set, so it
/// stays correct under re-entrant handlers and multi-threaded delivery. There
/// is no reset: once spent, the gate stays spent.
#[derive(Debug, Default)]
pub struct ChannelGate {
    opened: AtomicBool,
}

impl ChannelGate {
    /// Create a closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` to exactly one caller: the first to observe the gate
    /// closed. Every other caller, concurrent or later, gets `false`.
    pub fn try_open(&self) -> bool {
        self.opened
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns `true` once [`try_open`](ChannelGate::try_open) has succeeded.
    pub fn is_spent(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn opens_exactly_once_sequentially() {
        let gate = ChannelGate::new();
        assert!(!gate.is_spent());
        assert!(gate.try_open());
        assert!(gate.is_spent());
        for _ in 0..10 {
            assert!(!gate.try_open());
        }
        assert!(gate.is_spent());
    }

    #[test]
    fn opens_exactly_once_across_threads() {
        let gate = Arc::new(ChannelGate::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || (0..100).filter(|_| gate.try_open()).count())
            })
            .collect();

        let winners: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(winners, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn opens_exactly_once_across_tasks() {
        let gate = Arc::new(ChannelGate::new());
        let mut tasks = Vec::new();
        for _ in 0..64 {
            let gate = Arc::clone(&gate);
            tasks.push(tokio::spawn(async move { gate.try_open() }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[test]
    fn reentrant_caller_is_refused() {
        let gate = ChannelGate::new();
        let outer = gate.try_open();
        // A handler triggered from inside the winning handler sees the gate spent.
        let inner = gate.try_open();
        assert!(outer);
        assert!(!inner);
    }
}
