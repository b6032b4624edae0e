//! Single-flight coordination for access token refreshes.
//!
//! One caller at a time holds a [`RefreshLease`] and performs the network
//! refresh. Everyone else who needs a fresh token while the lease is out gets
//! a receiver and is woken, in registration order, with the same outcome.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

/// Access token produced by a refresh, `None` when it failed.
pub type RefreshOutcome = Option<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

#[derive(Debug)]
struct Inner {
    state: RefreshState,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

#[derive(Debug)]
pub struct RefreshCoordinator {
    inner: Mutex<Inner>,
}

pub enum RefreshTurn<'a> {
    /// The caller must perform the refresh and settle the lease.
    Leader(RefreshLease<'a>),
    /// A refresh is already in flight; await its outcome.
    Waiter(oneshot::Receiver<RefreshOutcome>),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                waiters: Vec::new(),
            }),
        }
    }

    pub fn state(&self) -> RefreshState {
        self.lock().state
    }

    pub fn waiter_count(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn acquire(&self) -> RefreshTurn<'_> {
        let mut inner = self.lock();
        match inner.state {
            RefreshState::Refreshing => {
                let (tx, rx) = oneshot::channel();
                inner.waiters.push(tx);
                RefreshTurn::Waiter(rx)
            }
            RefreshState::Idle => {
                inner.state = RefreshState::Refreshing;
                RefreshTurn::Leader(RefreshLease {
                    coordinator: self,
                    settled: false,
                })
            }
        }
    }

    fn settle(&self, outcome: RefreshOutcome) {
        let waiters = {
            let mut inner = self.lock();
            inner.state = RefreshState::Idle;
            std::mem::take(&mut inner.waiters)
        };

        for waiter in waiters {
            // A waiter whose request was dropped no longer cares.
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive right to run the in-flight refresh. Dropping it unsettled counts
/// as a failed refresh, so a cancelled refresher never strands its waiters.
#[must_use = "a lease must be settled with the refresh outcome"]
pub struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshLease<'_> {
    pub fn settle(mut self, outcome: RefreshOutcome) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.settle(None);
        }
    }
}
