mod args;
mod stub_factory;

use std::sync::Arc;

use agent_sv2::{AgentConfig, BtcExtraPoolConfig, SessionManager};
use tracing::error;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = args::parse();

    let config = match AgentConfig::from_file(&args.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(error = %e, path = %args.config, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let extra_pool_config = Arc::new(BtcExtraPoolConfig::default());
    let factory = Arc::new(stub_factory::StubSessionFactory::default());

    let (manager, _handle) = SessionManager::new(config, extra_pool_config, factory);
    if let Err(e) = manager.run().await {
        error!(error = %e, "session manager exited with error");
        std::process::exit(1);
    }
}
