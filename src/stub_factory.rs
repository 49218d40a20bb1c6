//! Reference [`SessionFactory`] wired into the default binary. The downstream
//! and upstream wire protocols are out of scope for this crate; real
//! deployments provide their own `DownstreamSessionFactory` /
//! `UpstreamSessionFactory` implementation and link against the `agent_sv2`
//! library directly rather than this binary. This stub exists so the binary
//! builds and runs end to end against the multiplexing core: downstreams are
//! accepted and marked authorized without a handshake, and upstreams are
//! marked ready without dialing out.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::net::TcpStream;
use tracing::debug;

use agent_sv2::config::PoolEndpoint;
use agent_sv2::downstream::{DownstreamHandle, DownstreamSessionFactory, DownstreamStat};
use agent_sv2::error::Result;
use agent_sv2::events::{DownstreamEvent, FakeUpstreamEvent, UpstreamManagerEvent};
use agent_sv2::session_id::SessionId;
use agent_sv2::upstream::{FakeUpstreamHandle, UpstreamHandle, UpstreamSessionFactory, UpstreamStat};

#[derive(Debug)]
struct StubDownstream {
    id: SessionId,
    remote_addr: SocketAddr,
}

impl DownstreamHandle for StubDownstream {
    fn id(&self) -> SessionId {
        self.id
    }

    fn full_name(&self) -> &str {
        "default"
    }

    fn sub_account_name(&self) -> &str {
        "default"
    }

    fn stat(&self) -> DownstreamStat {
        DownstreamStat::Authorized
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.remote_addr)
    }

    fn send_event(&self, event: DownstreamEvent) -> Result<()> {
        debug!(id = self.id, ?event, "stub downstream event");
        Ok(())
    }
}

#[derive(Debug)]
struct StubUpstream {
    slot: usize,
    pool_index: usize,
}

impl UpstreamHandle for StubUpstream {
    fn stat(&self) -> UpstreamStat {
        UpstreamStat::Authorized
    }

    fn slot(&self) -> usize {
        self.slot
    }

    fn pool_index(&self) -> usize {
        self.pool_index
    }

    fn send_event(&self, event: UpstreamManagerEvent) -> Result<()> {
        debug!(slot = self.slot, ?event, "stub upstream event");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StubFakeUpstream;

impl FakeUpstreamHandle for StubFakeUpstream {
    fn send_event(&self, event: FakeUpstreamEvent) -> Result<()> {
        debug!(?event, "stub fake upstream event");
        Ok(())
    }
}

#[derive(Default)]
pub struct StubSessionFactory;

impl DownstreamSessionFactory for StubSessionFactory {
    fn new_downstream_session(
        &self,
        id: SessionId,
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> Arc<dyn DownstreamHandle> {
        // No protocol is spoken; the socket is simply dropped.
        drop(stream);
        Arc::new(StubDownstream { id, remote_addr })
    }

    fn init_downstream_session<'a>(
        &'a self,
        _session: Arc<dyn DownstreamHandle>,
    ) -> BoxFuture<'a, DownstreamStat> {
        Box::pin(async { DownstreamStat::Authorized })
    }
}

impl UpstreamSessionFactory for StubSessionFactory {
    fn new_upstream_session<'a>(
        &'a self,
        _pool: &'a PoolEndpoint,
        pool_index: usize,
        slot: usize,
    ) -> BoxFuture<'a, Arc<dyn UpstreamHandle>> {
        Box::pin(async move { Arc::new(StubUpstream { slot, pool_index }) as Arc<dyn UpstreamHandle> })
    }

    fn run_upstream_session(&self, _session: Arc<dyn UpstreamHandle>) -> BoxFuture<'static, ()> {
        Box::pin(std::future::pending())
    }

    fn new_fake_upstream_session(&self) -> Arc<dyn FakeUpstreamHandle> {
        Arc::new(StubFakeUpstream)
    }

    fn run_fake_upstream_session(&self, _session: Arc<dyn FakeUpstreamHandle>) -> BoxFuture<'static, ()> {
        Box::pin(std::future::pending())
    }
}
