// msg-queue - line-oriented TCP FIFO message queue
//
// This library provides the queue, the per-connection protocol session and
// the accept loop. Binary entry point is in src/main.rs

pub mod cli;
pub mod config;
pub mod error;
pub mod queue;
pub mod server;

pub use cli::Cli;
pub use config::ServerConfig;
pub use error::StartupError;
pub use queue::{Message, MessageQueue, QueueStats};
pub use server::{QueueServer, Session, SessionRegistry, SessionState};
