//! Configuration the core consumes, mirroring `TranslatorConfig`'s
//! shape and `#[serde(default = ...)]` idiom in this lineage.

use serde::Deserialize;

use crate::downstream::DownstreamSessionFactory;
use crate::upstream::UpstreamSessionFactory;

/// `"btc"` enables dual-pool routing and doubles the slot count with extra
/// slots; any other value runs single-pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Btc,
    Other,
}

impl Default for AgentType {
    fn default() -> Self {
        AgentType::Other
    }
}

/// A pool endpoint the core dials opaquely; the authorization protocol is
/// handled entirely by the injected [`crate::upstream::UpstreamSessionFactory`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolEndpoint {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageQueueSizeConfig {
    #[serde(default = "default_pool_session_manager_queue_size")]
    pub pool_session_manager: usize,
}

fn default_pool_session_manager_queue_size() -> usize {
    1024
}

impl Default for MessageQueueSizeConfig {
    fn default() -> Self {
        MessageQueueSizeConfig {
            pool_session_manager: default_pool_session_manager_queue_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvancedConfig {
    pub pool_connection_number_per_sub_account: u16,
    #[serde(default)]
    pub always_keep_downconn: bool,
    #[serde(default)]
    pub multi_user_mode: bool,
    #[serde(default)]
    pub message_queue_size: MessageQueueSizeConfig,
}

/// Top-level configuration, deserialized from the TOML file named on the
/// CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub agent_listen_ip: String,
    pub agent_listen_port: u16,
    #[serde(default)]
    pub agent_type: AgentType,
    pub pools: Vec<PoolEndpoint>,
    pub advanced: AdvancedConfig,
}

impl AgentConfig {
    pub fn from_str(s: &str) -> crate::error::Result<Self> {
        let built = ext_config::Config::builder()
            .add_source(ext_config::File::from_str(s, ext_config::FileFormat::Toml))
            .build()?;
        Ok(built.try_deserialize()?)
    }

    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let built = ext_config::Config::builder()
            .add_source(ext_config::File::with_name(path))
            .build()?;
        Ok(built.try_deserialize()?)
    }

    /// Total upstream slot count for one sub-account's manager: doubled in
    /// BTC mode (first half primary, second half extra).
    pub fn slot_count(&self) -> usize {
        let primary = self.advanced.pool_connection_number_per_sub_account as usize;
        match self.agent_type {
            AgentType::Btc => primary * 2,
            AgentType::Other => primary,
        }
    }

    pub fn primary_slot_count(&self) -> usize {
        self.advanced.pool_connection_number_per_sub_account as usize
    }
}

/// Compiled-in BTC-mode constants.
pub struct BtcExtraPoolConfig {
    pub extra_pools: Vec<PoolEndpoint>,
    pub extra_filter: String,
    /// RFC1123 timestamp; past this deadline no downstream is classified as
    /// extra.
    pub apply_deadline_rfc1123: String,
}

impl Default for BtcExtraPoolConfig {
    fn default() -> Self {
        BtcExtraPoolConfig {
            extra_pools: Vec::new(),
            extra_filter: String::new(),
            // Far enough in the past that, absent explicit configuration,
            // extra-pool routing is inert rather than silently unbounded.
            apply_deadline_rfc1123: "Mon, 02 Jan 2006 15:04:05 MST".to_string(),
        }
    }
}

/// Combined injected constructors for downstream, upstream, and fake
/// upstream sessions.
pub trait SessionFactory: DownstreamSessionFactory + UpstreamSessionFactory {}

impl<T: DownstreamSessionFactory + UpstreamSessionFactory> SessionFactory for T {}
