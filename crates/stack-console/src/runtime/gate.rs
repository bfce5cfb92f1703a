use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum GateError {
    #[error("cancelled while waiting for a {0} slot")]
    Cancelled(&'static str),
    #[error("{0} gate closed")]
    Closed(&'static str),
}

/// Counting limiter shared by every task that clones it. A permit is
/// returned to the gate when dropped, on every exit path.
#[derive(Clone, Debug)]
pub(crate) struct AdmissionGate {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl AdmissionGate {
    pub(crate) fn new(name: &'static str, limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub(crate) async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit, GateError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GateError::Cancelled(self.name)),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|_| GateError::Closed(self.name))
            }
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn permits_return_on_drop() {
        let gate = AdmissionGate::new("poll", 2);
        let token = CancellationToken::new();
        let first = gate.acquire(&token).await.expect("first");
        let second = gate.acquire(&token).await.expect("second");
        assert_eq!(gate.in_flight(), 2);
        drop(first);
        assert_eq!(gate.in_flight(), 1);
        drop(second);
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.limit(), 2);
    }

    #[tokio::test]
    async fn cancellation_releases_waiters() {
        let gate = AdmissionGate::new("poll", 1);
        let token = CancellationToken::new();
        let _held = gate.acquire(&token).await.expect("held");
        let waiter = {
            let gate = gate.clone();
            let token = token.clone();
            tokio::spawn(async move { gate.acquire(&token).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let result = waiter.await.expect("join");
        assert_eq!(result, Err(GateError::Cancelled("poll")));
    }

    #[test]
    fn zero_limit_is_raised_to_one() {
        assert_eq!(AdmissionGate::new("probe", 0).limit(), 1);
    }
}
