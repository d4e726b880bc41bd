use clap::Parser;

use crate::config::{ServerConfig, DEFAULT_HOST};
use crate::error::StartupError;

#[derive(Parser, Debug)]
#[command(name = "msg-queue", version, about, long_about = None)]
pub struct Cli {
    /// TCP port to listen on.
    pub port: String,

    /// Interface address to bind. Defaults to every local interface.
    #[arg(long, env = "MSG_QUEUE_HOST", default_value = DEFAULT_HOST)]
    pub host: String,
}

impl Cli {
    pub fn into_config(self) -> Result<ServerConfig, StartupError> {
        let port = parse_port(&self.port)?;
        Ok(ServerConfig {
            host: self.host,
            port,
        })
    }
}

// Kept as a string through clap so a bad port is reported as a startup error
// rather than a usage error.
pub fn parse_port(input: &str) -> Result<u16, StartupError> {
    input
        .trim()
        .parse()
        .map_err(|source| StartupError::InvalidPort {
            input: input.to_string(),
            source,
        })
}
