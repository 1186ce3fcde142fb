// Shared helpers for the end-to-end suites: an in-process server driven
// over real TCP, and a client that speaks raw RESP so tests can assert
// exact wire bytes.
#![allow(dead_code)] // not every suite uses every helper

use std::net::SocketAddr;
use std::time::Duration;

use ferrodis::config::ServerConfig;
use ferrodis::protocol::{Reply, RespParser};
use ferrodis::server::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start(mut config: ServerConfig) -> Self {
        config.bind = "127.0.0.1".to_string();
        config.port = 0;
        let server = Server::bind(config).await.expect("failed to start server");
        let addr = server.local_addr().expect("listener has no local addr");
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));
        Self {
            addr,
            shutdown: Some(tx),
            handle,
        }
    }

    pub async fn start_default() -> Self {
        Self::start(ServerConfig::default()).await
    }

    pub async fn connect(&self) -> Client {
        Client::connect(self.addr).await
    }

    /// Graceful shutdown; panics if the server does not stop in time.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        timeout(Duration::from_secs(15), self.handle)
            .await
            .expect("server did not shut down in time")
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

pub struct Client {
    stream: TcpStream,
    parser: RespParser,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = timeout(TEST_TIMEOUT, TcpStream::connect(addr))
            .await
            .expect("connect timed out")
            .expect("connect failed");
        Self {
            stream,
            parser: RespParser::new(),
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write failed");
    }

    /// Reads exactly `expected.len()` bytes and asserts they match.
    pub async fn expect_raw(&mut self, expected: &[u8]) {
        let mut received = vec![0u8; expected.len()];
        timeout(TEST_TIMEOUT, self.stream.read_exact(&mut received))
            .await
            .expect("read timed out")
            .expect("read failed");
        assert_eq!(
            received,
            expected,
            "wire mismatch: got {:?}",
            String::from_utf8_lossy(&received)
        );
    }

    pub async fn send_cmd(&mut self, parts: &[&str]) -> Reply {
        let line: Vec<Vec<u8>> = parts.iter().map(|p| p.as_bytes().to_vec()).collect();
        let frame = Reply::MultiBulk(line).to_bytes();
        self.send_raw(&frame).await;
        self.read_reply().await
    }

    /// Reads until the connection's parser produces one payload.
    pub async fn read_reply(&mut self) -> Reply {
        let mut buf = [0u8; 4096];
        loop {
            let n = timeout(TEST_TIMEOUT, self.stream.read(&mut buf))
                .await
                .expect("read timed out")
                .expect("read failed");
            assert!(n > 0, "server closed the connection mid-reply");
            let mut payloads = self.parser.feed(&buf[..n]);
            if let Some(payload) = payloads.pop() {
                assert!(payloads.is_empty(), "unexpected extra payloads");
                return payload.expect("server sent a malformed reply");
            }
        }
    }
}
