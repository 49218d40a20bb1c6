//! Downstream session contract. The downstream session's own state machine
//! (framing, JSON-RPC, the authorization handshake) is out of scope; the
//! core only needs enough of a handle to classify, dispatch to, and signal a
//! downstream.

use crate::error::Result;
use crate::events::DownstreamEvent;
use crate::session_id::SessionId;
use futures::future::BoxFuture;
use std::net::SocketAddr;

/// Lifecycle state of a downstream session, as observed by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownstreamStat {
    Connected,
    Authorizing,
    Authorized,
    Disconnected,
}

/// A handle to a downstream mining session, referenced by the core without
/// owning its socket.
pub trait DownstreamHandle: Send + Sync + std::fmt::Debug {
    /// Printable identifier, usually `<sessionId>`.
    fn id(&self) -> SessionId;

    /// `subAccount[.workerSuffix]`.
    fn full_name(&self) -> &str;

    fn sub_account_name(&self) -> &str;

    fn stat(&self) -> DownstreamStat;

    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Send an event to this downstream. The downstream owns its own
    /// cleanup; a failed send (session already gone) is not an error the
    /// caller needs to act on beyond logging.
    fn send_event(&self, event: DownstreamEvent) -> Result<()>;
}

/// Constructs and drives downstream sessions. Injected so the core stays
/// decoupled from any concrete wire implementation.
pub trait DownstreamSessionFactory: Send + Sync {
    /// Wrap an accepted TCP stream as a downstream session handle.
    fn new_downstream_session(
        &self,
        id: SessionId,
        stream: tokio::net::TcpStream,
        remote_addr: SocketAddr,
    ) -> std::sync::Arc<dyn DownstreamHandle>;

    /// Run the downstream's `Init()` state machine to completion. Blocks
    /// until the session reaches `Authorized` or `Disconnected`.
    fn init_downstream_session<'a>(
        &'a self,
        session: std::sync::Arc<dyn DownstreamHandle>,
    ) -> BoxFuture<'a, DownstreamStat>;
}
