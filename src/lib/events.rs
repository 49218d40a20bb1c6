//! Tagged event shapes connecting the session manager and upstream session
//! manager actors to the external downstream/upstream/fake-upstream session
//! state machines. These are the *only* interface the core uses
//! to talk to those external collaborators.

use crate::downstream::DownstreamHandle;
use crate::upstream::UpstreamHandle;
use std::sync::Arc;

/// Opaque job payload forwarded verbatim from a real upstream to the fake
/// upstream (). The core never inspects these; it
/// only relays them.
#[derive(Debug, Clone)]
pub enum FakeJobUpdate {
    Btc(Vec<u8>),
    Eth(Vec<u8>),
}

/// Events accepted by an [`crate::upstream_manager::UpstreamSessionManager`]'s
/// single-reader event channel.
#[derive(Debug, Clone)]
pub enum UpstreamManagerEvent {
    AddDownSession {
        session: Arc<dyn DownstreamHandle>,
    },
    UpSessionReady {
        slot: usize,
        upstream: Arc<dyn UpstreamHandle>,
    },
    UpSessionInitFailed {
        slot: usize,
    },
    UpSessionBroken {
        slot: usize,
    },
    UpdateMinerNum {
        slot: usize,
        disconnected: u32,
    },
    UpdateFakeMinerNum {
        disconnected: u32,
    },
    UpdateFakeJob(FakeJobUpdate),
    PrintMinerNum,
    Exit,
}

/// Events the core sends *to* a downstream session.
#[derive(Debug, Clone)]
pub enum DownstreamEvent {
    SetUpSession(Arc<dyn UpstreamHandle>),
    PoolNotReady,
    Exit,
}

/// Events the core sends to the fake upstream.
#[derive(Debug, Clone)]
pub enum FakeUpstreamEvent {
    TransferDownSessions,
    UpdateFakeJob(FakeJobUpdate),
    Exit,
}

/// Events accepted by the process-wide `SessionManager`'s own channel —
/// these are the only path through which the sub-account map is mutated,
/// keeping it single-actor-owned.
#[derive(Debug, Clone)]
pub enum SessionManagerEvent {
    DownstreamAuthorized {
        session: Arc<dyn DownstreamHandle>,
    },
    StopUpSessionManager {
        sub_account: String,
    },
}

/// Identifies which half of the slot array (primary or extra pools) a
/// downstream was classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolClass {
    Primary,
    Extra,
}
