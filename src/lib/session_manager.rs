//! Top-level accept loop and sub-account registry, ported from
//! `StratumSessionManager.go`. Accepts downstream TCP connections, runs each
//! one's authorization handshake through the injected factory, then routes
//! authorized sessions to the owning sub-account's [`UpstreamSessionManager`],
//! spawning one the first time a sub-account is seen.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::config::{AgentConfig, BtcExtraPoolConfig, SessionFactory};
use crate::downstream::DownstreamStat;
use crate::error::Result;
use crate::events::{SessionManagerEvent, UpstreamManagerEvent};
use crate::session_id::SessionIdAllocator;
use crate::upstream_manager::{UpstreamSessionManager, UpstreamSessionManagerHandle};

/// A cheaply cloneable handle to a running [`SessionManager`]'s mailbox.
#[derive(Clone)]
pub struct SessionManagerHandle {
    sender: async_channel::Sender<SessionManagerEvent>,
}

impl std::fmt::Debug for SessionManagerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManagerHandle").finish()
    }
}

impl SessionManagerHandle {
    pub async fn send(&self, event: SessionManagerEvent) -> Result<()> {
        self.sender.send(event).await.map_err(Into::into)
    }

    #[cfg(test)]
    pub fn for_test(sender: async_channel::Sender<SessionManagerEvent>) -> Self {
        SessionManagerHandle { sender }
    }
}

pub struct SessionManager {
    config: Arc<AgentConfig>,
    extra_pool_config: Arc<BtcExtraPoolConfig>,
    factory: Arc<dyn SessionFactory>,
    id_allocator: Arc<SessionIdAllocator>,
    receiver: async_channel::Receiver<SessionManagerEvent>,
    handle: SessionManagerHandle,
    sub_accounts: HashMap<String, UpstreamSessionManagerHandle>,
}

impl SessionManager {
    pub fn new(
        config: Arc<AgentConfig>,
        extra_pool_config: Arc<BtcExtraPoolConfig>,
        factory: Arc<dyn SessionFactory>,
    ) -> (Self, SessionManagerHandle) {
        let (sender, receiver) = async_channel::unbounded();
        let handle = SessionManagerHandle { sender };
        // 0xffff stays reserved; the allocator only ever hands out 0..=0xfffe.
        let id_allocator = Arc::new(SessionIdAllocator::new(0xfffe));

        let manager = SessionManager {
            config,
            extra_pool_config,
            factory,
            id_allocator,
            receiver,
            handle: handle.clone(),
            sub_accounts: HashMap::new(),
        };
        (manager, handle)
    }

    pub async fn run(mut self) -> Result<()> {
        let addr: SocketAddr =
            format!("{}:{}", self.config.agent_listen_ip, self.config.agent_listen_port)
                .parse()
                .map_err(|_| {
                    crate::error::AgentError::AddrParse(format!(
                        "{}:{}",
                        self.config.agent_listen_ip, self.config.agent_listen_port
                    ))
                })?;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "listening for downstream connections");

        tokio::spawn(accept_loop(
            listener,
            self.factory.clone(),
            self.id_allocator.clone(),
            self.handle.clone(),
        ));

        loop {
            let event = match self.receiver.recv().await {
                Ok(event) => event,
                Err(_) => break,
            };
            match event {
                SessionManagerEvent::DownstreamAuthorized { session } => {
                    self.on_downstream_authorized(session).await
                }
                SessionManagerEvent::StopUpSessionManager { sub_account } => {
                    self.on_stop_up_session_manager(sub_account).await
                }
            }
        }
        Ok(())
    }

    async fn on_downstream_authorized(&mut self, session: Arc<dyn crate::downstream::DownstreamHandle>) {
        let sub_account = session.sub_account_name().to_string();

        let up_handle = match self.sub_accounts.get(&sub_account) {
            Some(h) => h.clone(),
            None => {
                let (manager, handle) = UpstreamSessionManager::new(
                    sub_account.clone(),
                    self.config.clone(),
                    self.extra_pool_config.clone(),
                    self.factory.clone(),
                    self.handle.clone(),
                );
                tokio::spawn(manager.run());
                self.sub_accounts.insert(sub_account.clone(), handle.clone());
                info!(sub_account = %sub_account, "created upstream session manager");
                handle
            }
        };

        if let Err(e) = up_handle
            .send(UpstreamManagerEvent::AddDownSession { session })
            .await
        {
            warn!(sub_account = %sub_account, error = %e, "failed to dispatch downstream session");
        }
    }

    async fn on_stop_up_session_manager(&mut self, sub_account: String) {
        if let Some(handle) = self.sub_accounts.remove(&sub_account) {
            let _ = handle.send(UpstreamManagerEvent::Exit).await;
            info!(sub_account = %sub_account, "stopped upstream session manager");
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    factory: Arc<dyn SessionFactory>,
    id_allocator: Arc<SessionIdAllocator>,
    handle: SessionManagerHandle,
) {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        tokio::spawn(handle_connection(
            stream,
            remote_addr,
            factory.clone(),
            id_allocator.clone(),
            handle.clone(),
        ));
    }
}

async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    factory: Arc<dyn SessionFactory>,
    id_allocator: Arc<SessionIdAllocator>,
    handle: SessionManagerHandle,
) {
    let id = match id_allocator.alloc() {
        Some(id) => id,
        None => {
            warn!(%remote_addr, "session id space exhausted, dropping connection");
            return;
        }
    };

    let session = factory.new_downstream_session(id, stream, remote_addr);
    let stat = factory.init_downstream_session(session.clone()).await;

    if stat != DownstreamStat::Authorized {
        id_allocator.release(id);
        return;
    }

    let _ = handle
        .send(SessionManagerEvent::DownstreamAuthorized { session })
        .await;
}
