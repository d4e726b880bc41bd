use std::io;
use std::num::ParseIntError;

use thiserror::Error;

/// Failures that stop the process before the accept loop starts.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid port '{input}'")]
    InvalidPort {
        input: String,
        #[source]
        source: ParseIntError,
    },

    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}
