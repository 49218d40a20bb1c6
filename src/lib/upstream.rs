//! Upstream and fake-upstream session contracts. Both are owned and
//! lifecycle-driven by `UpstreamSessionManager`; the concrete pool protocol
//! is out of scope.

use crate::config::PoolEndpoint;
use crate::error::Result;
use crate::events::{FakeUpstreamEvent, UpstreamManagerEvent};
use futures::future::BoxFuture;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStat {
    Connecting,
    Authorized,
    Broken,
}

/// A handle to a real upstream pool connection occupying one slot.
pub trait UpstreamHandle: Send + Sync + std::fmt::Debug {
    fn stat(&self) -> UpstreamStat;
    fn slot(&self) -> usize;
    fn pool_index(&self) -> usize;
    fn send_event(&self, event: UpstreamManagerEvent) -> Result<()>;
}

/// A handle to the fake upstream that parks downstreams when no real
/// upstream is ready.
pub trait FakeUpstreamHandle: Send + Sync + std::fmt::Debug {
    fn send_event(&self, event: FakeUpstreamEvent) -> Result<()>;
}

/// Injected constructors for upstream and fake-upstream sessions.
pub trait UpstreamSessionFactory: Send + Sync {
    /// Dial `pool` for `slot` and run the authorization handshake to
    /// completion. Returns a handle whose `stat()` reflects the outcome;
    /// the caller inspects `stat()` and only spawns the run loop (via
    /// [`Self::run_upstream_session`]) on success.
    fn new_upstream_session<'a>(
        &'a self,
        pool: &'a PoolEndpoint,
        pool_index: usize,
        slot: usize,
    ) -> BoxFuture<'a, Arc<dyn UpstreamHandle>>;

    /// Drive the upstream's run loop until it reports `Broken` (via
    /// `UpstreamManagerEvent::UpSessionBroken` on the manager's channel) or
    /// is sent `Exit`.
    fn run_upstream_session(&self, session: Arc<dyn UpstreamHandle>) -> BoxFuture<'static, ()>;

    /// Construct the single fake upstream for a manager.
    fn new_fake_upstream_session(&self) -> Arc<dyn FakeUpstreamHandle>;

    /// Drive the fake upstream's run loop (job synthesis, parked-downstream
    /// keepalive) until `Exit`.
    fn run_fake_upstream_session(&self, session: Arc<dyn FakeUpstreamHandle>) -> BoxFuture<'static, ()>;
}
