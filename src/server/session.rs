use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::protocol::{encode_line, parse_command, take_line, Command, EMPTY_QUEUE, GREETING};
use super::registry::SessionId;
use crate::queue::{Message, MessageQueue};

/// Protocol state of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Greeting not yet written.
    Greeting,
    /// Waiting for the next complete command line.
    AwaitCommand,
    Pop,
    Push(Bytes),
    Unknown(Bytes),
    /// Connection closed by the peer or lost to an I/O error. Terminal.
    Closed,
}

impl From<Command> for SessionState {
    fn from(command: Command) -> Self {
        match command {
            Command::Pop => SessionState::Pop,
            Command::Push(payload) => SessionState::Push(payload),
            Command::Unknown(token) => SessionState::Unknown(token),
        }
    }
}

/// Drives one connection through the greeting and the command loop.
///
/// Each state performs at most one read or one write, and the response to a
/// POP is fully written before the next line is read. Commands already
/// buffered behind it wait in `input`.
pub struct Session<S> {
    id: SessionId,
    stream: S,
    queue: Arc<MessageQueue>,
    input: BytesMut,
    // bytes of `input` already searched for a delimiter
    scanned: usize,
    response: BytesMut,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(id: SessionId, stream: S, queue: Arc<MessageQueue>) -> Self {
        Self {
            id,
            stream,
            queue,
            input: BytesMut::with_capacity(4096),
            scanned: 0,
            response: BytesMut::with_capacity(256),
            state: SessionState::Greeting,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Runs until the peer closes (`Ok`) or an I/O operation fails (`Err`).
    /// The stream is dropped on return either way.
    pub async fn run(mut self) -> io::Result<()> {
        while self.state != SessionState::Closed {
            self.step().await?;
        }
        Ok(())
    }

    /// Performs the work of the current state and moves to the next one.
    ///
    /// On error the session is left in `Closed`.
    pub async fn step(&mut self) -> io::Result<()> {
        let current = std::mem::replace(&mut self.state, SessionState::Closed);
        self.state = self.transition(current).await?;
        Ok(())
    }

    async fn transition(&mut self, state: SessionState) -> io::Result<SessionState> {
        let next = match state {
            SessionState::Greeting => {
                self.respond(GREETING).await?;
                SessionState::AwaitCommand
            }
            SessionState::AwaitCommand => match self.read_line().await? {
                Some(line) => parse_command(line).into(),
                None => SessionState::Closed,
            },
            SessionState::Pop => {
                match self.queue.pop() {
                    Some(message) => {
                        tracing::debug!(session = self.id, len = message.len(), "POP");
                        self.respond(message.payload()).await?;
                    }
                    None => {
                        tracing::debug!(session = self.id, "POP on empty queue");
                        self.respond(EMPTY_QUEUE).await?;
                    }
                }
                SessionState::AwaitCommand
            }
            SessionState::Push(payload) => {
                tracing::debug!(session = self.id, len = payload.len(), "PUSH");
                self.queue.push(Message::new(payload));
                SessionState::AwaitCommand
            }
            SessionState::Unknown(token) => {
                tracing::debug!(
                    session = self.id,
                    command = %String::from_utf8_lossy(&token),
                    "ignoring unknown command"
                );
                SessionState::AwaitCommand
            }
            SessionState::Closed => SessionState::Closed,
        };
        Ok(next)
    }

    /// Next complete line, or `None` once the peer has closed.
    async fn read_line(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            if let Some(line) = take_line(&mut self.input, &mut self.scanned) {
                return Ok(Some(line.freeze()));
            }

            let n = self.stream.read_buf(&mut self.input).await?;
            if n == 0 {
                if !self.input.is_empty() {
                    tracing::debug!(
                        session = self.id,
                        discarded = self.input.len(),
                        "peer closed mid-line"
                    );
                }
                return Ok(None);
            }
        }
    }

    async fn respond(&mut self, payload: &[u8]) -> io::Result<()> {
        encode_line(payload, &mut self.response);
        self.stream.write_all(&self.response).await?;
        self.stream.flush().await
    }
}
