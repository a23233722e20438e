//! Per-call context carried through discovery: tenant, deadline, cancellation.
//!
//! Every network call in the pipeline is bounded through [`DiscoveryContext::bounded`]
//! so nothing outlives the caller's deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a bounded call did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct DiscoveryContext {
    pub tenant_id: Option<String>,
    deadline: Instant,
    cancel: CancellationToken,
}

impl DiscoveryContext {
    /// Context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            tenant_id: None,
            deadline: Instant::now() + timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Context that is also cancelled when `parent` is.
    pub fn with_parent(timeout: Duration, parent: &CancellationToken) -> Self {
        Self {
            tenant_id: None,
            deadline: Instant::now() + timeout,
            cancel: parent.child_token(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Child context sharing this deadline; cancelling the parent cancels it too.
    pub fn child(&self) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            deadline: self.deadline,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the deadline passed or the call was cancelled.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs `fut` until it finishes, the deadline (or the tighter `per_call`
    /// timeout) passes, or the context is cancelled. Dropped futures are abandoned.
    pub async fn bounded<F>(&self, per_call: Option<Duration>, fut: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        let until = match per_call {
            Some(limit) => self.deadline.min(Instant::now() + limit),
            None => self.deadline,
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            res = tokio::time::timeout_at(until, fut) => res.map_err(|_| Interrupted::Timeout),
        }
    }
}
