use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use msg_queue::{MessageQueue, QueueServer, ServerConfig, SessionRegistry};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

const READ_TIMEOUT: Duration = Duration::from_secs(3);
const EMPTY: &str = "The message queue is empty now.";

struct TestServer {
    addr: SocketAddr,
    queue: Arc<MessageQueue>,
    sessions: Arc<SessionRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Result<Self> {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let server = QueueServer::bind(&config, Arc::new(MessageQueue::new())).await?;
        let addr = server.local_addr()?;
        let queue = server.queue();
        let sessions = server.sessions();

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        Ok(Self {
            addr,
            queue,
            sessions,
            shutdown: Some(tx),
        })
    }

    async fn connect(&self) -> Result<TestClient> {
        TestClient::connect(self.addr).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connects and consumes the greeting.
    async fn connect(addr: SocketAddr) -> Result<Self> {
        let mut client = Self::connect_raw(addr).await?;
        let greeting = client.recv().await?;
        assert_eq!(greeting, "You are connected.");
        Ok(client)
    }

    async fn connect_raw(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        self.send_raw(format!("{line}\r\n").as_bytes()).await
    }

    async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = timeout(READ_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .context("timed out waiting for a response line")??;
        if n == 0 {
            bail!("server closed the connection");
        }
        match line.strip_suffix("\r\n") {
            Some(text) => Ok(text.to_string()),
            None => bail!("response not CRLF terminated: {line:?}"),
        }
    }

    /// Closes with a TCP reset instead of a clean shutdown.
    fn reset(self) -> Result<()> {
        let stream = self.reader.into_inner().reunite(self.writer)?;
        stream.set_linger(Some(Duration::ZERO))?;
        drop(stream);
        Ok(())
    }

    async fn pop(&mut self) -> Result<String> {
        self.send("POP").await?;
        self.recv().await
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> Result<()> {
    timeout(READ_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .context("condition never became true")
}

#[tokio::test]
async fn test_greeting_is_sent_first() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = TestClient::connect_raw(server.addr).await?;

    assert_eq!(client.recv().await?, "You are connected.");
    Ok(())
}

#[tokio::test]
async fn test_push_then_pop_round_trip() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.connect().await?;

    client.send("PUSH hello").await?;
    assert_eq!(client.pop().await?, "hello");
    assert_eq!(client.pop().await?, EMPTY);
    Ok(())
}

#[tokio::test]
async fn test_commands_are_case_insensitive() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.connect().await?;

    client.send("push Hello World").await?;
    client.send("pop").await?;
    assert_eq!(client.recv().await?, "Hello World");
    Ok(())
}

#[tokio::test]
async fn test_empty_queue_pop_never_blocks() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.connect().await?;

    for _ in 0..5 {
        assert_eq!(client.pop().await?, EMPTY);
    }
    assert_eq!(server.queue.stats().empty_pops(), 5);
    Ok(())
}

#[tokio::test]
async fn test_unknown_command_is_a_silent_no_op() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.connect().await?;

    client.send("FOO bar").await?;
    client.send("PUSH x").await?;
    // PUSH and FOO produce no reply, so the next line is the POP response
    assert_eq!(client.pop().await?, "x");
    assert!(server.queue.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_push_with_no_payload_enqueues_empty_message() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.connect().await?;

    client.send("PUSH").await?;
    client.send("PUSH after").await?;
    assert_eq!(client.pop().await?, "");
    assert_eq!(client.pop().await?, "after");
    Ok(())
}

#[tokio::test]
async fn test_pipelined_commands_are_processed_in_order() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.connect().await?;

    client
        .send_raw(b"PUSH one\r\nPUSH two\r\nPOP\r\nnoise\r\nPOP\r\nPOP\r\n")
        .await?;

    assert_eq!(client.recv().await?, "one");
    assert_eq!(client.recv().await?, "two");
    assert_eq!(client.recv().await?, EMPTY);
    Ok(())
}

#[tokio::test]
async fn test_line_split_across_packets() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.connect().await?;

    client.send_raw(b"PUSH frag").await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send_raw(b"mented\r").await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send_raw(b"\n").await?;

    assert_eq!(client.pop().await?, "fragmented");
    Ok(())
}

#[tokio::test]
async fn test_cross_connection_fifo_order() -> Result<()> {
    let server = TestServer::start().await?;
    let mut producer = server.connect().await?;
    let mut consumer = server.connect().await?;

    producer.send("PUSH m1").await?;
    producer.send("PUSH m2").await?;
    let queue = server.queue.clone();
    wait_until(|| queue.len() == 2).await?;

    assert_eq!(consumer.pop().await?, "m1");
    assert_eq!(consumer.pop().await?, "m2");
    assert_eq!(producer.pop().await?, EMPTY);
    Ok(())
}

#[tokio::test]
async fn test_many_producers_each_keep_their_order() -> Result<()> {
    let server = TestServer::start().await?;
    let mut producers = vec![];

    for p in 0..4 {
        let addr = server.addr;
        producers.push(tokio::spawn(async move {
            let mut client = TestClient::connect(addr).await?;
            for i in 0..50 {
                client.send(&format!("PUSH {p}:{i}")).await?;
            }
            anyhow::Ok(client)
        }));
    }

    let mut clients = vec![];
    for producer in producers {
        clients.push(producer.await??);
    }
    let queue = server.queue.clone();
    wait_until(|| queue.len() == 200).await?;

    let mut consumer = server.connect().await?;
    let mut last = [None::<u32>; 4];
    for _ in 0..200 {
        let reply = consumer.pop().await?;
        let (p, i) = reply.split_once(':').context("malformed message")?;
        let (p, i): (usize, u32) = (p.parse()?, i.parse()?);
        if let Some(previous) = last[p] {
            assert!(i > previous, "producer {p} out of order");
        }
        last[p] = Some(i);
    }
    assert_eq!(consumer.pop().await?, EMPTY);
    Ok(())
}

#[tokio::test]
async fn test_disconnect_releases_session_and_keeps_queue() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.connect().await?;
    let sessions = server.sessions.clone();
    wait_until(|| sessions.len() == 1).await?;

    client.send("PUSH survivor").await?;
    let queue = server.queue.clone();
    wait_until(|| queue.len() == 1).await?;
    drop(client);

    wait_until(|| sessions.is_empty()).await?;

    let mut other = server.connect().await?;
    assert_eq!(other.pop().await?, "survivor");
    Ok(())
}

#[tokio::test]
async fn test_listener_keeps_accepting_while_sessions_idle() -> Result<()> {
    let server = TestServer::start().await?;

    // an idle connection that never sends anything
    let _idle = server.connect().await?;

    let mut clients = vec![];
    for _ in 0..10 {
        clients.push(server.connect().await?);
    }
    assert_eq!(server.sessions.len(), 11);
    Ok(())
}

#[tokio::test]
async fn test_connection_reset_is_contained_to_its_session() -> Result<()> {
    let server = TestServer::start().await?;
    let mut bystander = server.connect().await?;
    let mut doomed = server.connect().await?;
    let sessions = server.sessions.clone();
    let queue = server.queue.clone();

    bystander.send("PUSH first").await?;
    doomed.send("PUSH second").await?;
    wait_until(|| queue.len() == 2).await?;

    // leave a half-sent line behind so the server is mid-read when reset
    doomed.send_raw(b"PUSH never-fin").await?;
    doomed.reset()?;

    wait_until(|| sessions.len() == 1).await?;
    assert_eq!(queue.len(), 2);

    assert_eq!(bystander.pop().await?, "first");
    assert_eq!(bystander.pop().await?, "second");
    assert_eq!(bystander.pop().await?, EMPTY);
    Ok(())
}
