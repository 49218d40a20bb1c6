use std::fmt;

pub type Result<T> = core::result::Result<T, AgentError>;

/// Crate-wide error type. Actor boundaries never propagate these as panics —
/// failures that can happen mid-flight (a broken upstream, a malformed IP
/// range) are encoded as events instead (see `events.rs`). This type only
/// covers what can go wrong before an actor has started, or in leaf helpers
/// actors call directly.
#[derive(Debug)]
#[non_exhaustive]
pub enum AgentError {
    Io(std::io::Error),
    Config(ext_config::ConfigError),
    ChannelSend(String),
    ChannelRecv(async_channel::RecvError),
    SessionIdExhausted,
    IpRangeParse(String),
    AddrParse(String),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AgentError::*;
        match self {
            Io(e) => write!(f, "I/O error: {}", e),
            Config(e) => write!(f, "config error: {}", e),
            ChannelSend(e) => write!(f, "channel send failed: {}", e),
            ChannelRecv(e) => write!(f, "channel recv failed: {}", e),
            SessionIdExhausted => write!(f, "session id pool exhausted"),
            IpRangeParse(s) => write!(f, "malformed IP range element: `{}`", s),
            AddrParse(s) => write!(f, "invalid listen address: `{}`", s),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::Io(e)
    }
}

impl From<ext_config::ConfigError> for AgentError {
    fn from(e: ext_config::ConfigError) -> Self {
        AgentError::Config(e)
    }
}

impl From<async_channel::RecvError> for AgentError {
    fn from(e: async_channel::RecvError) -> Self {
        AgentError::ChannelRecv(e)
    }
}

impl<T> From<async_channel::SendError<T>> for AgentError {
    fn from(e: async_channel::SendError<T>) -> Self {
        AgentError::ChannelSend(e.to_string())
    }
}
