use clap::Parser;

/// Command line arguments for the agent binary.
#[derive(Debug, Parser)]
#[command(author, version, about = "Stratum mining agent session multiplexer")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "agent-config.toml")]
    pub config: String,
}

pub fn parse() -> Args {
    Args::parse()
}
