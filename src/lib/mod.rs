//! Session multiplexing core for a Stratum mining agent/proxy: accepts
//! downstream miner connections, multiplexes them across a bounded pool of
//! upstream pool connections per sub-account, and (in BTC mode) splits
//! routing between a primary and an extra pool by downstream IP. The wire
//! protocol, cryptography, and share validation are out of scope — those
//! live behind the [`downstream`] and [`upstream`] trait boundaries and are
//! supplied by the binary that links this crate.

pub mod config;
pub mod downstream;
pub mod error;
pub mod events;
pub mod ip_range;
pub mod session_id;
pub mod session_manager;
pub mod upstream;
pub mod upstream_manager;

pub use config::{AgentConfig, BtcExtraPoolConfig, SessionFactory};
pub use error::{AgentError, Result};
pub use session_manager::{SessionManager, SessionManagerHandle};
pub use upstream_manager::{UpstreamSessionManager, UpstreamSessionManagerHandle};
