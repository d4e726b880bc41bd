// Queue module exports

pub mod message;
pub mod message_queue;

pub use message::Message;
pub use message_queue::{MessageQueue, QueueStats};
