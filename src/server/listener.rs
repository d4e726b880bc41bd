use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::select;

use super::registry::SessionRegistry;
use super::session::Session;
use crate::config::ServerConfig;
use crate::error::StartupError;
use crate::queue::MessageQueue;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept loop. Owns the listening socket and hands each connection to its
/// own session task.
pub struct QueueServer {
    listener: TcpListener,
    queue: Arc<MessageQueue>,
    sessions: Arc<SessionRegistry>,
}

impl QueueServer {
    pub async fn bind(
        config: &ServerConfig,
        queue: Arc<MessageQueue>,
    ) -> Result<Self, StartupError> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|source| StartupError::Bind {
                addr: config.bind_addr(),
                source,
            })?;

        Ok(Self::from_listener(listener, queue))
    }

    pub fn from_listener(listener: TcpListener, queue: Arc<MessageQueue>) -> Self {
        Self {
            listener,
            queue,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn queue(&self) -> Arc<MessageQueue> {
        self.queue.clone()
    }

    pub fn sessions(&self) -> Arc<SessionRegistry> {
        self.sessions.clone()
    }

    pub async fn run_until_ctrl_c(self) {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = ?err, "failed to install ctrl-c handler");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accepts connections until `shutdown` resolves. Sessions already
    /// running are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let QueueServer {
            listener,
            queue,
            sessions,
        } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                accept_result = listener.accept() => {
                    if let Some(pause) = handle_accept_result(accept_result, &queue, &sessions) {
                        tokio::time::sleep(pause).await;
                    }
                }
            }
        }

        let stats = queue.stats();
        tracing::info!(
            live_sessions = sessions.len(),
            depth = queue.len(),
            pushed = stats.pushed_total(),
            popped = stats.popped_total(),
            empty_pops = stats.empty_pops(),
            "listener stopped"
        );
    }
}

/// Returns how long to wait before accepting again.
fn handle_accept_result(
    result: io::Result<(TcpStream, SocketAddr)>,
    queue: &Arc<MessageQueue>,
    sessions: &Arc<SessionRegistry>,
) -> Option<Duration> {
    match result {
        Ok((stream, peer)) => {
            spawn_session(stream, peer, queue, sessions);
            None
        }
        Err(err) => {
            tracing::warn!(error = ?err, "failed to accept connection");
            accept_backoff(&err)
        }
    }
}

/// Errors tied to a single dropped connection are retried at once. Anything
/// else (fd or memory exhaustion) would fail again immediately.
fn accept_backoff(err: &io::Error) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}

fn spawn_session(
    stream: TcpStream,
    peer: SocketAddr,
    queue: &Arc<MessageQueue>,
    sessions: &Arc<SessionRegistry>,
) {
    let id = sessions.register(peer);
    tracing::info!(session = id, %peer, "new connection");

    let session = Session::new(id, stream, queue.clone());
    let sessions = sessions.clone();

    tokio::spawn(async move {
        match session.run().await {
            Ok(()) => tracing::debug!(session = id, %peer, "connection closed by client"),
            Err(e) => tracing::debug!(session = id, %peer, "connection error: {} (kind: {:?})", e, e.kind()),
        }
        if let Some(info) = sessions.remove(id) {
            tracing::debug!(
                session = id,
                age_ms = info.connected_at.elapsed().as_millis() as u64,
                "session released"
            );
        }
    });
}
