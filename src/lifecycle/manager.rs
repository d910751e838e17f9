//! Process state machine and shutdown coordination.

use std::sync::Arc;

use tokio::sync::watch;

/// Process lifecycle states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Binding the listener, initializing subsystems.
    Starting,
    /// Accepting and serving requests.
    Listening,
    /// No new connections; in-flight requests finishing within the grace
    /// period.
    Draining,
    /// Done. The process exits from here.
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Listening => "listening",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

struct Shared {
    state: watch::Sender<LifecycleState>,
    fatal: watch::Sender<bool>,
}

/// Coordinator for process state.
///
/// State only moves forward; a stale transition (e.g. a second termination
/// signal) is ignored. All long-running tasks observe the same watch
/// channel.
#[derive(Clone)]
pub struct Lifecycle {
    shared: Arc<Shared>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        let (fatal, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared { state, fatal }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.shared.state.borrow()
    }

    /// Move to `next` if it is ahead of the current state.
    pub fn advance(&self, next: LifecycleState) {
        let moved = self.shared.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::info!(state = next.as_str(), "lifecycle transition");
        }
    }

    /// Stop accepting new connections; let in-flight requests finish.
    pub fn begin_draining(&self) {
        self.advance(LifecycleState::Draining);
    }

    /// Resolve once the process has entered (at least) `Draining`.
    pub async fn draining(&self) {
        let mut rx = self.shared.state.subscribe();
        // wait_for checks the current value first, so a late subscriber
        // still resolves.
        let _ = rx
            .wait_for(|state| *state >= LifecycleState::Draining)
            .await;
    }

    /// Resolve once the process has stopped.
    pub async fn stopped(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| *state >= LifecycleState::Stopped).await;
    }

    /// Record a fatal process fault. The main loop observes this and forces
    /// shutdown with a non-zero exit.
    pub fn raise_fatal(&self, message: &str) {
        tracing::error!("fatal process fault: {}", message);
        let _ = self.shared.fatal.send(true);
    }

    pub fn is_fatal(&self) -> bool {
        *self.shared.fatal.borrow()
    }

    /// Resolve once a fatal fault has been raised.
    pub async fn fatal(&self) {
        let mut rx = self.shared.fatal.subscribe();
        let _ = rx.wait_for(|fatal| *fatal).await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_only_moves_forward() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Starting);

        lifecycle.advance(LifecycleState::Listening);
        assert_eq!(lifecycle.state(), LifecycleState::Listening);

        lifecycle.advance(LifecycleState::Draining);
        lifecycle.advance(LifecycleState::Listening);
        assert_eq!(lifecycle.state(), LifecycleState::Draining);
    }

    #[tokio::test]
    async fn draining_resolves_for_late_subscribers() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin_draining();
        // subscribed after the transition; must still resolve
        tokio::time::timeout(std::time::Duration::from_secs(1), lifecycle.draining())
            .await
            .expect("draining() should resolve immediately");
    }

    #[tokio::test]
    async fn fatal_is_observable() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.is_fatal());

        let waiter = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.fatal().await })
        };
        lifecycle.raise_fatal("boom");
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("fatal() should resolve")
            .unwrap();
        assert!(lifecycle.is_fatal());
    }
}
