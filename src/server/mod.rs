// Line protocol server exports

pub mod listener;
pub mod protocol;
pub mod registry;
pub mod session;

pub use listener::QueueServer;
pub use protocol::Command;
pub use registry::{SessionId, SessionInfo, SessionRegistry};
pub use session::{Session, SessionState};
