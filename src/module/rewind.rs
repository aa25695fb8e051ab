//! Rewind barrier shared by all surfaces of one foreign module instance.
//!
//! While the foreign module re-initializes itself ("rewinds"), the resources it owns are in an
//! inconsistent state. Every surface operation waits on this barrier before it reaches the
//! foreign side. Waiting suspends the calling task; it never parks a runtime thread.

use std::sync::Arc;
use tokio::sync::watch;

/// Snapshot of the barrier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RewindState {
    /// Number of rewinds currently in flight. The barrier is open at zero.
    pub depth: u32,
    /// Number of completed rewinds. Only increases.
    pub generation: u64,
}

impl RewindState {
    pub fn in_flight(&self) -> bool {
        self.depth > 0
    }
}

#[derive(Clone, Debug)]
pub struct RewindBarrier {
    tx: Arc<watch::Sender<RewindState>>,
}

impl Default for RewindBarrier {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(RewindState::default());
        Self { tx: Arc::new(tx) }
    }
}

impl RewindBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current barrier state.
    pub fn state(&self) -> RewindState {
        *self.tx.borrow()
    }

    /// Number of completed rewinds.
    pub fn generation(&self) -> u64 {
        self.tx.borrow().generation
    }

    pub fn is_rewinding(&self) -> bool {
        self.tx.borrow().in_flight()
    }

    /// Marks the start of a rewind. The barrier stays closed until the returned ticket is
    /// finished or dropped. Rewinds may overlap; the barrier opens when the last one ends.
    pub fn begin(&self) -> RewindTicket {
        self.tx.send_modify(|state| state.depth += 1);
        log::trace!("rewind started (depth {})", self.tx.borrow().depth);

        RewindTicket {
            tx: Some(self.tx.clone()),
        }
    }

    /// Suspends until no rewind is in flight and returns the generation observed on resume.
    ///
    /// Returns immediately when the barrier is open. There is no timeout.
    pub async fn wait(&self) -> u64 {
        let mut rx = self.tx.subscribe();
        let resumed = rx
            .wait_for(|state| !state.in_flight())
            .await
            .map(|state| state.generation);

        // The sender lives as long as `self`, so the channel cannot close while we wait.
        resumed.unwrap_or_else(|_| self.generation())
    }
}

/// Keeps the barrier closed for the duration of one rewind.
#[must_use = "dropping the ticket ends the rewind immediately"]
#[derive(Debug)]
pub struct RewindTicket {
    tx: Option<Arc<watch::Sender<RewindState>>>,
}

impl RewindTicket {
    /// Ends the rewind and wakes every waiter once no other rewind is in flight.
    pub fn finish(mut self) {
        self.end();
    }

    fn end(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };

        tx.send_modify(|state| {
            state.depth = state.depth.saturating_sub(1);
            if state.depth == 0 {
                state.generation = state.generation.wrapping_add(1);
            }
        });
        log::trace!("rewind finished (generation {})", tx.borrow().generation);
    }
}

impl Drop for RewindTicket {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn open_barrier_does_not_suspend() {
        let barrier = RewindBarrier::new();
        assert!(!barrier.is_rewinding());
        assert_eq!(barrier.wait().await, 0);
    }

    #[tokio::test]
    async fn waiters_resume_after_rewind_completes() {
        let barrier = RewindBarrier::new();
        let ticket = barrier.begin();
        assert!(barrier.is_rewinding());

        let waiter = tokio::spawn({
            let barrier = barrier.clone();
            async move { barrier.wait().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        ticket.finish();
        assert_eq!(waiter.await.unwrap(), 1);
        assert!(!barrier.is_rewinding());
    }

    #[tokio::test]
    async fn overlapping_rewinds_open_once_the_last_ends() {
        let barrier = RewindBarrier::new();
        let first = barrier.begin();
        let second = barrier.begin();
        assert_eq!(barrier.state().depth, 2);

        first.finish();
        assert!(barrier.is_rewinding());
        assert_eq!(barrier.generation(), 0);

        drop(second);
        assert!(!barrier.is_rewinding());
        assert_eq!(barrier.generation(), 1);
    }

    #[tokio::test]
    async fn rewind_after_wait_does_not_affect_resumed_caller() {
        let barrier = RewindBarrier::new();
        let generation = barrier.wait().await;

        let _ticket = barrier.begin();
        assert_eq!(generation, 0);
    }

    #[test]
    fn dropped_ticket_ends_rewind() {
        let barrier = RewindBarrier::new();
        {
            let _ticket = barrier.begin();
            assert!(barrier.is_rewinding());
        }
        assert!(!barrier.is_rewinding());
        assert_eq!(futures::executor::block_on(barrier.wait()), 1);
    }
}
