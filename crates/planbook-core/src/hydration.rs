//! Session-scoped hydration gate.
//!
//! Until the first complete remote fetch of a session has been merged, the
//! local store may be empty or stale. Read paths consult this controller to
//! decide whether a remote fallback is needed.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Hydration progress of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationState {
    NotHydrated,
    Hydrating,
    Hydrated,
}

impl HydrationState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotHydrated => "not_hydrated",
            Self::Hydrating => "hydrating",
            Self::Hydrated => "hydrated",
        }
    }
}

/// Permit for one hydration run, bound to the session that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydrationTicket {
    epoch: u64,
}

/// Owner of the hydration flag for one signed-in session
#[derive(Debug)]
pub struct HydrationController {
    epoch: AtomicU64,
    state: watch::Sender<HydrationState>,
}

impl Default for HydrationController {
    fn default() -> Self {
        Self::new()
    }
}

impl HydrationController {
    pub fn new() -> Self {
        let (state, _) = watch::channel(HydrationState::NotHydrated);
        Self {
            epoch: AtomicU64::new(0),
            state,
        }
    }

    /// Current state
    pub fn state(&self) -> HydrationState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<HydrationState> {
        self.state.subscribe()
    }

    pub fn is_hydrated(&self) -> bool {
        self.state() == HydrationState::Hydrated
    }

    /// Force the flag, e.g. after an externally driven bulk load
    pub fn set_hydrated(&self, hydrated: bool) {
        let next = if hydrated {
            HydrationState::Hydrated
        } else {
            HydrationState::NotHydrated
        };
        self.state.send_if_modified(|state| replace(state, next));
    }

    /// Start a hydration run for the current session
    pub fn begin(&self) -> HydrationTicket {
        let mut ticket = HydrationTicket { epoch: 0 };
        self.state.send_if_modified(|state| {
            ticket.epoch = self.epoch.load(Ordering::SeqCst);
            replace(state, HydrationState::Hydrating)
        });
        ticket
    }

    /// Whether the session that issued `ticket` is still current
    pub fn is_live(&self, ticket: HydrationTicket) -> bool {
        self.epoch.load(Ordering::SeqCst) == ticket.epoch
    }

    /// Mark the session hydrated. Returns false for an abandoned ticket.
    pub fn complete(&self, ticket: HydrationTicket) -> bool {
        self.finish(ticket, HydrationState::Hydrated)
    }

    /// Return to `NotHydrated` after a failed run. Returns false for an abandoned ticket.
    pub fn fail(&self, ticket: HydrationTicket) -> bool {
        self.finish(ticket, HydrationState::NotHydrated)
    }

    /// End the session: outstanding tickets become stale
    pub fn reset(&self) {
        self.state.send_if_modified(|state| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            replace(state, HydrationState::NotHydrated)
        });
    }

    // The epoch is read and bumped under the watch lock, so a reset cannot
    // slip between the liveness check and the state change.
    fn finish(&self, ticket: HydrationTicket, next: HydrationState) -> bool {
        let mut live = false;
        self.state.send_if_modified(|state| {
            live = self.epoch.load(Ordering::SeqCst) == ticket.epoch;
            live && replace(state, next)
        });
        live
    }
}

fn replace(state: &mut HydrationState, next: HydrationState) -> bool {
    if *state == next {
        false
    } else {
        *state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_then_complete_hydrates() {
        let controller = HydrationController::new();
        assert_eq!(controller.state(), HydrationState::NotHydrated);

        let ticket = controller.begin();
        assert_eq!(controller.state(), HydrationState::Hydrating);
        assert!(controller.complete(ticket));
        assert!(controller.is_hydrated());
    }

    #[test]
    fn reset_abandons_outstanding_tickets() {
        let controller = HydrationController::new();
        let ticket = controller.begin();
        controller.reset();

        assert!(!controller.is_live(ticket));
        assert!(!controller.complete(ticket));
        assert_eq!(controller.state(), HydrationState::NotHydrated);

        let fresh = controller.begin();
        assert!(controller.complete(fresh));
    }

    #[test]
    fn failure_returns_to_not_hydrated() {
        let controller = HydrationController::new();
        let ticket = controller.begin();
        assert!(controller.fail(ticket));
        assert_eq!(controller.state(), HydrationState::NotHydrated);
    }

    #[test]
    fn set_hydrated_is_explicit() {
        let controller = HydrationController::new();
        controller.set_hydrated(true);
        assert!(controller.is_hydrated());
        controller.set_hydrated(false);
        assert!(!controller.is_hydrated());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_observe_changes() {
        let controller = HydrationController::new();
        let mut rx = controller.subscribe();

        let ticket = controller.begin();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), HydrationState::Hydrating);

        controller.complete(ticket);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), HydrationState::Hydrated);
    }
}
