//! Per-sub-account upstream session manager, ported from
//! `UpSessionManager.go`. Owns a fixed-size pool of upstream slots, dispatches
//! downstreams to the least-loaded ready slot within their allowed (primary
//! or extra) range, parks miners on the fake upstream when nothing is ready,
//! and reconnects on failure. A single-reader actor: all state mutation
//! happens inside `run`'s event loop; everyone else only sends.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{AgentConfig, AgentType, BtcExtraPoolConfig, PoolEndpoint, SessionFactory};
use crate::downstream::DownstreamHandle;
use crate::error::Result;
use crate::events::{DownstreamEvent, FakeUpstreamEvent, PoolClass, UpstreamManagerEvent};
use crate::ip_range::IpRangeList;
use crate::session_manager::SessionManagerHandle;
use crate::upstream::{FakeUpstreamHandle, UpstreamHandle, UpstreamStat};

const PRINT_DEBOUNCE: Duration = Duration::from_secs(5);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

struct Slot {
    miner_num: u32,
    ready: bool,
    upstream: Option<Arc<dyn UpstreamHandle>>,
}

impl Slot {
    fn empty() -> Self {
        Slot {
            miner_num: 0,
            ready: false,
            upstream: None,
        }
    }
}

struct FakeSlot {
    miner_num: u32,
    upstream: Arc<dyn FakeUpstreamHandle>,
}

/// A cheaply cloneable handle used to send events into a manager's mailbox.
/// Every external collaborator — the session manager, connect tasks, the
/// real and fake upstream run loops, the debounce timer — only ever talks to
/// a manager through one of these.
#[derive(Clone)]
pub struct UpstreamSessionManagerHandle {
    sender: async_channel::Sender<UpstreamManagerEvent>,
    sub_account: String,
}

impl std::fmt::Debug for UpstreamSessionManagerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamSessionManagerHandle")
            .field("sub_account", &self.sub_account)
            .finish()
    }
}

impl UpstreamSessionManagerHandle {
    pub fn sub_account(&self) -> &str {
        &self.sub_account
    }

    /// Blocks if the mailbox is full — acceptable because every sender here
    /// is itself an actor that can wait.
    pub async fn send(&self, event: UpstreamManagerEvent) -> Result<()> {
        self.sender.send(event).await.map_err(Into::into)
    }
}

pub struct UpstreamSessionManager {
    sub_account: String,
    log_prefix: String,
    config: Arc<AgentConfig>,
    extra_pool_config: Arc<BtcExtraPoolConfig>,
    extra_ranges: IpRangeList,
    factory: Arc<dyn SessionFactory>,
    parent: SessionManagerHandle,
    handle: UpstreamSessionManagerHandle,
    receiver: async_channel::Receiver<UpstreamManagerEvent>,
    slots: Vec<Slot>,
    fake_slot: FakeSlot,
    init_success: bool,
    init_failure_counter: usize,
    printing_miner_num: bool,
}

impl UpstreamSessionManager {
    pub fn new(
        sub_account: String,
        config: Arc<AgentConfig>,
        extra_pool_config: Arc<BtcExtraPoolConfig>,
        factory: Arc<dyn SessionFactory>,
        parent: SessionManagerHandle,
    ) -> (Self, UpstreamSessionManagerHandle) {
        let (sender, receiver) =
            async_channel::bounded(config.advanced.message_queue_size.pool_session_manager);
        let handle = UpstreamSessionManagerHandle {
            sender,
            sub_account: sub_account.clone(),
        };

        let extra_ranges = IpRangeList::parse(&extra_pool_config.extra_filter).unwrap_or_default();

        let log_prefix = if config.advanced.multi_user_mode {
            format!("<{}> ", sub_account)
        } else {
            String::new()
        };

        let slot_count = config.slot_count();
        let fake_upstream = factory.new_fake_upstream_session();

        let manager = UpstreamSessionManager {
            sub_account,
            log_prefix,
            config,
            extra_pool_config,
            extra_ranges,
            factory,
            parent,
            handle: handle.clone(),
            receiver,
            slots: (0..slot_count).map(|_| Slot::empty()).collect(),
            fake_slot: FakeSlot {
                miner_num: 0,
                upstream: fake_upstream,
            },
            init_success: false,
            init_failure_counter: 0,
            printing_miner_num: false,
        };

        (manager, handle)
    }

    pub async fn run(mut self) {
        let _span = tracing::info_span!("up_session_manager", sub_account = %self.sub_account)
            .entered();

        let fake_run = self
            .factory
            .run_fake_upstream_session(self.fake_slot.upstream.clone());
        tokio::spawn(fake_run);

        for slot in 0..self.slots.len() {
            self.spawn_connect(slot);
        }

        loop {
            let event = match self.receiver.recv().await {
                Ok(event) => event,
                Err(_) => {
                    // parent dropped every sender; nothing left to do.
                    break;
                }
            };

            match event {
                UpstreamManagerEvent::AddDownSession { session } => self.add_down_session(session),
                UpstreamManagerEvent::UpSessionReady { slot, upstream } => {
                    self.up_session_ready(slot, upstream)
                }
                UpstreamManagerEvent::UpSessionInitFailed { slot } => {
                    self.up_session_init_failed(slot).await
                }
                UpstreamManagerEvent::UpSessionBroken { slot } => self.up_session_broken(slot),
                UpstreamManagerEvent::UpdateMinerNum { slot, disconnected } => {
                    self.update_miner_num(slot, disconnected).await
                }
                UpstreamManagerEvent::UpdateFakeMinerNum { disconnected } => {
                    self.update_fake_miner_num(disconnected)
                }
                UpstreamManagerEvent::UpdateFakeJob(payload) => self.update_fake_job(payload),
                UpstreamManagerEvent::PrintMinerNum => self.print_miner_num(),
                UpstreamManagerEvent::Exit => {
                    self.exit();
                    break;
                }
            }
        }
    }

    fn spawn_connect(&self, slot: usize) {
        let config = self.config.clone();
        let extra_pool_config = self.extra_pool_config.clone();
        let factory = self.factory.clone();
        let handle = self.handle.clone();
        tokio::spawn(connect(slot, config, extra_pool_config, factory, handle));
    }

    /// Classifies the downstream (primary vs extra) and dispatches it to the
    /// least-loaded ready slot in the allowed range, or the fake upstream, or
    /// tells it the pool isn't ready.
    fn add_down_session(&mut self, session: Arc<dyn DownstreamHandle>) {
        let class = self.classify(&session);

        let primary_slots = self.config.primary_slot_count();
        let mut selected: Option<usize> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            let slot_class = if i >= primary_slots {
                PoolClass::Extra
            } else {
                PoolClass::Primary
            };
            if slot_class != class {
                continue;
            }
            if !slot.ready {
                continue;
            }
            match selected {
                None => selected = Some(i),
                Some(s) if slot.miner_num < self.slots[s].miner_num => selected = Some(i),
                _ => {}
            }
        }

        if let Some(i) = selected {
            self.slots[i].miner_num += 1;
            let upstream = self.slots[i]
                .upstream
                .clone()
                .expect("ready slot always has an upstream");
            let _ = session.send_event(DownstreamEvent::SetUpSession(upstream));
            self.try_print_miner_num();
            return;
        }

        if self.config.advanced.always_keep_downconn {
            self.fake_slot.miner_num += 1;
            let _ = session.send_event(DownstreamEvent::SetUpSession(self.fake_as_upstream()));
        } else {
            let _ = session.send_event(DownstreamEvent::PoolNotReady);
        }
        self.try_print_miner_num();
    }

    /// The fake upstream doubles as an `UpstreamHandle` so it can be handed
    /// to a downstream through the same `SetUpSession` event a real upstream
    /// uses, parking it exactly like a real slot from the downstream's point
    /// of view.
    fn fake_as_upstream(&self) -> Arc<dyn UpstreamHandle> {
        Arc::new(FakeUpstreamAsUpstream(self.fake_slot.upstream.clone()))
    }

    /// Derives the classification IP and range-tests it.
    fn classify(&self, session: &Arc<dyn DownstreamHandle>) -> PoolClass {
        let mut is_extra = false;

        if self.config.agent_type == AgentType::Btc {
            let full_name = session.full_name();
            let mut ip: Option<Ipv4Addr> = full_name.find('.').and_then(|dot| {
                let suffix = &full_name[dot + 1..];
                suffix.replace('x', ".").parse().ok()
            });

            if ip.is_none() {
                // kept verbatim: this parses the full `host:port` text as a
                // bare IPv4 address and fails whenever a port is present.
                ip = session
                    .remote_addr()
                    .and_then(|addr| addr.to_string().parse().ok());
            }

            if self.extra_ranges.contains(ip.as_ref()) {
                is_extra = true;
                debug!(downstream = session.full_name(), "classified as extra-pool miner");
            }
        }

        if past_deadline(&self.extra_pool_config.apply_deadline_rfc1123) {
            is_extra = false;
        }

        if is_extra {
            PoolClass::Extra
        } else {
            PoolClass::Primary
        }
    }

    fn up_session_ready(&mut self, slot: usize, upstream: Arc<dyn UpstreamHandle>) {
        self.init_success = true;
        if let Some(s) = self.slots.get_mut(slot) {
            s.upstream = Some(upstream);
            s.ready = true;
        }
        let _ = self
            .fake_slot
            .upstream
            .send_event(FakeUpstreamEvent::TransferDownSessions);
        info!(slot, "upstream ready");
        self.try_print_miner_num();
    }

    async fn up_session_init_failed(&mut self, slot: usize) {
        if self.init_success {
            warn!(
                slot,
                "{}failed to connect all pools for this slot, retrying in 5s", self.log_prefix
            );
            let config = self.config.clone();
            let extra_pool_config = self.extra_pool_config.clone();
            let factory = self.factory.clone();
            let handle = self.handle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                connect(slot, config, extra_pool_config, factory, handle).await;
            });
            return;
        }

        self.init_failure_counter += 1;
        if self.init_failure_counter >= self.slots.len() {
            error!(
                "{}too many connection failures to pool, sub-account {} giving up",
                self.log_prefix, self.sub_account
            );
            let _ = self
                .parent
                .send(crate::events::SessionManagerEvent::StopUpSessionManager {
                    sub_account: self.sub_account.clone(),
                })
                .await;
        }
    }

    fn up_session_broken(&mut self, slot: usize) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.ready = false;
            s.miner_num = 0;
            s.upstream = None;
        }
        self.spawn_connect(slot);
        self.try_print_miner_num();
    }

    async fn update_miner_num(&mut self, slot: usize, disconnected: u32) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.miner_num = s.miner_num.saturating_sub(disconnected);
        }

        if self.config.advanced.multi_user_mode {
            let total: u32 = self.slots.iter().map(|s| s.miner_num).sum();
            if total < 1 {
                info!(
                    "{}no miners left on sub-account {}, closing pool connections",
                    self.log_prefix, self.sub_account
                );
                let _ = self
                    .parent
                    .send(crate::events::SessionManagerEvent::StopUpSessionManager {
                        sub_account: self.sub_account.clone(),
                    })
                    .await;
            }
        }
        self.try_print_miner_num();
    }

    fn update_fake_miner_num(&mut self, disconnected: u32) {
        self.fake_slot.miner_num = self.fake_slot.miner_num.saturating_sub(disconnected);
        self.try_print_miner_num();
    }

    fn update_fake_job(&self, payload: crate::events::FakeJobUpdate) {
        let _ = self
            .fake_slot
            .upstream
            .send_event(FakeUpstreamEvent::UpdateFakeJob(payload));
    }

    /// Debounces bursts of state changes into at most one log line per
    /// `PRINT_DEBOUNCE`.
    fn try_print_miner_num(&mut self) {
        if self.printing_miner_num {
            return;
        }
        self.printing_miner_num = true;
        let handle = self.handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(PRINT_DEBOUNCE).await;
            let _ = handle.send(UpstreamManagerEvent::PrintMinerNum).await;
        });
    }

    fn print_miner_num(&mut self) {
        let ready = self.slots.iter().filter(|s| s.ready).count();
        let miners: u32 =
            self.fake_slot.miner_num + self.slots.iter().map(|s| s.miner_num).sum::<u32>();
        info!(
            "{}connection number changed, pool servers: {}, miners: {}",
            self.log_prefix, ready, miners
        );
        self.printing_miner_num = false;
    }

    fn exit(&mut self) {
        let _ = self.fake_slot.upstream.send_event(FakeUpstreamEvent::Exit);
        for slot in &self.slots {
            if slot.ready {
                if let Some(upstream) = &slot.upstream {
                    let _ = upstream.send_event(UpstreamManagerEvent::Exit);
                }
            }
        }
    }
}

/// An unparseable deadline is treated as already past, disabling extra-pool
/// routing rather than leaving it on unbounded.
fn past_deadline(deadline_rfc1123: &str) -> bool {
    match chrono::DateTime::parse_from_rfc2822(deadline_rfc1123) {
        Ok(deadline) => chrono::Utc::now() > deadline.with_timezone(&chrono::Utc),
        Err(_) => true,
    }
}

/// Tries candidate pool endpoints in order for one slot, stopping at the
/// first that reaches `Authorized`.
async fn connect(
    slot: usize,
    config: Arc<AgentConfig>,
    extra_pool_config: Arc<BtcExtraPoolConfig>,
    factory: Arc<dyn SessionFactory>,
    handle: UpstreamSessionManagerHandle,
) {
    let is_extra_slot = slot >= config.primary_slot_count();
    let use_extra = config.agent_type == AgentType::Btc && is_extra_slot;

    let (candidates, index_offset): (&[PoolEndpoint], usize) = if use_extra {
        (&extra_pool_config.extra_pools, config.pools.len())
    } else {
        (&config.pools, 0)
    };

    for (i, pool) in candidates.iter().enumerate() {
        let upstream = factory.new_upstream_session(pool, index_offset + i, slot).await;
        if upstream.stat() == UpstreamStat::Authorized {
            let run = factory.run_upstream_session(upstream.clone());
            tokio::spawn(run);
            let _ = handle
                .send(UpstreamManagerEvent::UpSessionReady { slot, upstream })
                .await;
            return;
        }
    }

    let _ = handle
        .send(UpstreamManagerEvent::UpSessionInitFailed { slot })
        .await;
}

/// Adapts the fake upstream to the `UpstreamHandle` interface so it can be
/// handed to a downstream via `SetUpSession` exactly like a real slot.
#[derive(Debug)]
struct FakeUpstreamAsUpstream(Arc<dyn FakeUpstreamHandle>);

impl UpstreamHandle for FakeUpstreamAsUpstream {
    fn stat(&self) -> UpstreamStat {
        UpstreamStat::Authorized
    }

    fn slot(&self) -> usize {
        usize::MAX
    }

    fn pool_index(&self) -> usize {
        usize::MAX
    }

    fn send_event(&self, event: UpstreamManagerEvent) -> Result<()> {
        match event {
            UpstreamManagerEvent::Exit => self.0.send_event(FakeUpstreamEvent::Exit),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdvancedConfig, MessageQueueSizeConfig};
    use crate::downstream::DownstreamStat;
    use futures::future::BoxFuture;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU16, Ordering};

    #[derive(Debug)]
    struct MockDownstream {
        id: u16,
        full_name: String,
        sub_account: String,
        remote_addr: Option<SocketAddr>,
        events: async_channel::Sender<DownstreamEvent>,
    }

    impl DownstreamHandle for MockDownstream {
        fn id(&self) -> crate::session_id::SessionId {
            self.id
        }
        fn full_name(&self) -> &str {
            &self.full_name
        }
        fn sub_account_name(&self) -> &str {
            &self.sub_account
        }
        fn stat(&self) -> DownstreamStat {
            DownstreamStat::Authorized
        }
        fn remote_addr(&self) -> Option<SocketAddr> {
            self.remote_addr
        }
        fn send_event(&self, event: DownstreamEvent) -> Result<()> {
            let _ = self.events.try_send(event);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct MockUpstream {
        slot: usize,
        pool_index: usize,
        stat: UpstreamStat,
    }

    impl UpstreamHandle for MockUpstream {
        fn stat(&self) -> UpstreamStat {
            self.stat
        }
        fn slot(&self) -> usize {
            self.slot
        }
        fn pool_index(&self) -> usize {
            self.pool_index
        }
        fn send_event(&self, _event: UpstreamManagerEvent) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct MockFakeUpstream;

    impl FakeUpstreamHandle for MockFakeUpstream {
        fn send_event(&self, _event: FakeUpstreamEvent) -> Result<()> {
            Ok(())
        }
    }

    struct MockFactory {
        // slot -> whether the next connect attempt on that slot succeeds
        always_succeeds: bool,
    }

    impl crate::downstream::DownstreamSessionFactory for MockFactory {
        fn new_downstream_session(
            &self,
            _id: crate::session_id::SessionId,
            _stream: tokio::net::TcpStream,
            _remote_addr: SocketAddr,
        ) -> Arc<dyn DownstreamHandle> {
            unreachable!("not exercised by these tests")
        }

        fn init_downstream_session<'a>(
            &'a self,
            _session: Arc<dyn DownstreamHandle>,
        ) -> BoxFuture<'a, DownstreamStat> {
            Box::pin(async { DownstreamStat::Authorized })
        }
    }

    impl crate::upstream::UpstreamSessionFactory for MockFactory {
        fn new_upstream_session<'a>(
            &'a self,
            _pool: &'a PoolEndpoint,
            pool_index: usize,
            slot: usize,
        ) -> BoxFuture<'a, Arc<dyn UpstreamHandle>> {
            let stat = if self.always_succeeds {
                UpstreamStat::Authorized
            } else {
                UpstreamStat::Broken
            };
            Box::pin(async move {
                Arc::new(MockUpstream {
                    slot,
                    pool_index,
                    stat,
                }) as Arc<dyn UpstreamHandle>
            })
        }

        fn run_upstream_session(&self, _session: Arc<dyn UpstreamHandle>) -> BoxFuture<'static, ()> {
            Box::pin(async {
                // real upstream run loops live forever until `Exit`; the
                // mock just parks so `tokio::spawn` doesn't immediately
                // complete and race slot readiness.
                std::future::pending::<()>().await
            })
        }

        fn new_fake_upstream_session(&self) -> Arc<dyn FakeUpstreamHandle> {
            Arc::new(MockFakeUpstream)
        }

        fn run_fake_upstream_session(
            &self,
            _session: Arc<dyn FakeUpstreamHandle>,
        ) -> BoxFuture<'static, ()> {
            Box::pin(std::future::pending())
        }
    }

    fn next_id() -> u16 {
        static NEXT: AtomicU16 = AtomicU16::new(1);
        NEXT.fetch_add(1, Ordering::Relaxed)
    }

    fn btc_config(pools_per_sub_account: u16) -> Arc<AgentConfig> {
        Arc::new(AgentConfig {
            agent_listen_ip: "127.0.0.1".into(),
            agent_listen_port: 3333,
            agent_type: AgentType::Btc,
            pools: vec![PoolEndpoint {
                host: "primary.example.com".into(),
                port: 3333,
            }],
            advanced: AdvancedConfig {
                pool_connection_number_per_sub_account: pools_per_sub_account,
                always_keep_downconn: true,
                multi_user_mode: false,
                message_queue_size: MessageQueueSizeConfig {
                    pool_session_manager: 64,
                },
            },
        })
    }

    fn make_downstream(full_name: &str) -> (Arc<MockDownstream>, async_channel::Receiver<DownstreamEvent>) {
        let (tx, rx) = async_channel::unbounded();
        let handle = Arc::new(MockDownstream {
            id: next_id(),
            full_name: full_name.to_string(),
            sub_account: "acc".to_string(),
            remote_addr: None,
            events: tx,
        });
        (handle, rx)
    }

    #[tokio::test]
    async fn dual_pool_routing_confines_to_slot_range() {
        let config = btc_config(2);
        let extra = Arc::new(BtcExtraPoolConfig {
            extra_pools: vec![PoolEndpoint {
                host: "extra.example.com".into(),
                port: 3333,
            }],
            extra_filter: "10.*.*.*".to_string(),
            apply_deadline_rfc1123: "Mon, 02 Jan 2190 15:04:05 GMT".to_string(),
        });
        let factory = Arc::new(MockFactory { always_succeeds: true });
        let (parent_tx, _parent_rx) = async_channel::unbounded();
        let parent = SessionManagerHandle::for_test(parent_tx);

        let (manager, handle) =
            UpstreamSessionManager::new("acc".to_string(), config, extra, factory, parent);

        tokio::spawn(manager.run());
        // Let every slot's connect() attempt land.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (extra_down, extra_rx) = make_downstream("acc.10x0x0x1");
        let (primary_down, primary_rx) = make_downstream("acc.8x8x8x8");

        handle
            .send(UpstreamManagerEvent::AddDownSession { session: extra_down })
            .await
            .unwrap();
        handle
            .send(UpstreamManagerEvent::AddDownSession {
                session: primary_down,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let extra_event = extra_rx.try_recv().expect("extra downstream dispatched");
        let primary_event = primary_rx
            .try_recv()
            .expect("primary downstream dispatched");

        let primary_slots = 2;
        match extra_event {
            DownstreamEvent::SetUpSession(up) => assert!(up.slot() >= primary_slots),
            other => panic!("unexpected event: {other:?}"),
        }
        match primary_event {
            DownstreamEvent::SetUpSession(up) => assert!(up.slot() < primary_slots),
            other => panic!("unexpected event: {other:?}"),
        }

        handle.send(UpstreamManagerEvent::Exit).await.unwrap();
    }

    #[tokio::test]
    async fn extra_routing_disabled_past_deadline() {
        let config = btc_config(1);
        let extra = Arc::new(BtcExtraPoolConfig {
            extra_pools: vec![PoolEndpoint {
                host: "extra.example.com".into(),
                port: 3333,
            }],
            extra_filter: "10.*.*.*".to_string(),
            // a deadline in the past: every downstream should be routed
            // primary regardless of IP.
            apply_deadline_rfc1123: "Mon, 02 Jan 2006 15:04:05 GMT".to_string(),
        });
        let factory = Arc::new(MockFactory { always_succeeds: true });
        let (parent_tx, _parent_rx) = async_channel::unbounded();
        let parent = SessionManagerHandle::for_test(parent_tx);

        let (manager, _handle) =
            UpstreamSessionManager::new("acc".to_string(), config, extra, factory, parent);
        assert_eq!(
            manager.classify(&make_downstream("acc.10x0x0x1").0),
            PoolClass::Primary
        );
    }

    #[tokio::test]
    async fn parks_downstream_on_fake_upstream_when_nothing_ready() {
        let mut config = (*btc_config(1)).clone();
        config.agent_type = AgentType::Other;
        let config = Arc::new(config);
        let extra = Arc::new(BtcExtraPoolConfig::default());
        let factory = Arc::new(MockFactory {
            always_succeeds: false,
        });
        let (parent_tx, _parent_rx) = async_channel::unbounded();
        let parent = SessionManagerHandle::for_test(parent_tx);

        let (manager, handle) =
            UpstreamSessionManager::new("acc".to_string(), config, extra, factory, parent);
        tokio::spawn(manager.run());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (down, rx) = make_downstream("acc.worker1");
        handle
            .send(UpstreamManagerEvent::AddDownSession { session: down })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        match rx.try_recv().expect("downstream should be parked") {
            DownstreamEvent::SetUpSession(up) => assert_eq!(up.stat(), UpstreamStat::Authorized),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multi_user_mode_closes_on_zero_miners() {
        let mut config = (*btc_config(1)).clone();
        config.agent_type = AgentType::Other;
        config.advanced.multi_user_mode = true;
        let config = Arc::new(config);
        let extra = Arc::new(BtcExtraPoolConfig::default());
        let factory = Arc::new(MockFactory { always_succeeds: true });
        let (parent_tx, parent_rx) = async_channel::unbounded();
        let parent = SessionManagerHandle::for_test(parent_tx);

        let (manager, handle) =
            UpstreamSessionManager::new("acc".to_string(), config, extra, factory, parent);
        tokio::spawn(manager.run());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (down, _rx) = make_downstream("acc.worker1");
        handle
            .send(UpstreamManagerEvent::AddDownSession { session: down })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        handle
            .send(UpstreamManagerEvent::UpdateMinerNum {
                slot: 0,
                disconnected: 1,
            })
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), parent_rx.recv())
            .await
            .expect("should close promptly")
            .unwrap();
        match event {
            crate::events::SessionManagerEvent::StopUpSessionManager { sub_account } => {
                assert_eq!(sub_account, "acc");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn all_slots_failing_init_stops_manager() {
        let config = btc_config(1);
        // non-btc-shaped: only primary slots, both fail to connect.
        let mut config = (*config).clone();
        config.agent_type = AgentType::Other;
        config.pools = vec![];
        let config = Arc::new(config);

        let extra = Arc::new(BtcExtraPoolConfig::default());
        let factory = Arc::new(MockFactory { always_succeeds: false });
        let (parent_tx, parent_rx) = async_channel::unbounded();
        let parent = SessionManagerHandle::for_test(parent_tx);

        let (manager, _handle) =
            UpstreamSessionManager::new("acc".to_string(), config, extra, factory, parent);

        tokio::spawn(manager.run());

        let event = tokio::time::timeout(Duration::from_secs(1), parent_rx.recv())
            .await
            .expect("should stop promptly")
            .unwrap();
        match event {
            crate::events::SessionManagerEvent::StopUpSessionManager { sub_account } => {
                assert_eq!(sub_account, "acc");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
