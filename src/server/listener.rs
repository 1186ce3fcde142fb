// TCP server: accept loop and per-connection workers

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::protocol::{Reply, RespParser};

use super::connection::{Connection, DRAIN_TIMEOUT};

pub struct Server {
    listener: TcpListener,
    engine: Arc<Engine>,
}

impl Server {
    /// Builds the engine (running AOF replay) and binds the listener.
    /// Failure of either is a startup failure.
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let engine = Arc::new(Engine::new(&config)?);
        let listener = TcpListener::bind(config.addr())
            .await
            .with_context(|| format!("failed to bind {}", config.addr()))?;
        let addr = listener.local_addr()?;
        info!(
            %addr,
            databases = engine.db_count(),
            max_clients = config.max_clients,
            "server listening"
        );
        Ok(Self { listener, engine })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until a termination signal arrives, then shuts down
    /// gracefully.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Accept loop with an externally supplied shutdown future (tests
    /// drive this directly). On shutdown: stop accepting, signal every
    /// worker, wait for them to drain, then close the engine.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let Self { listener, engine } = self;
        let (notify_shutdown, _) = broadcast::channel::<()>(1);
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
                accepted = listener.accept() => {
                    let (socket, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            error!(%err, "failed to accept connection");
                            continue;
                        }
                    };
                    debug!(%addr, "accepted connection");
                    let engine = Arc::clone(&engine);
                    let mut shutdown_rx = notify_shutdown.subscribe();
                    let done = done_tx.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_client(socket, engine, &mut shutdown_rx).await {
                            error!(%err, "connection error");
                        }
                        drop(done);
                    });
                }
            }
        }

        // Refuse new connections, then let the workers finish what is in
        // flight. `done_rx` resolves once every worker dropped its clone.
        drop(listener);
        drop(notify_shutdown);
        drop(done_tx);
        if timeout(DRAIN_TIMEOUT, done_rx.recv()).await.is_err() {
            warn!("connections did not drain in time, exiting anyway");
        }
        engine.close();
        info!("server stopped");
        Ok(())
    }
}

/// One task per client. Bytes from the socket go through this
/// connection's parser; every complete payload is handled in arrival
/// order, so replies are sent in the order commands were received.
async fn handle_client(
    socket: TcpStream,
    engine: Arc<Engine>,
    shutdown: &mut broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let (mut reader, writer) = socket.into_split();
    let conn = Connection::new(writer);
    let mut parser = RespParser::new();
    let mut buf = BytesMut::with_capacity(4096);

    let result = loop {
        tokio::select! {
            _ = shutdown.recv() => break Ok(()),
            read = reader.read_buf(&mut buf) => match read {
                Err(err) => break Err(err.into()),
                Ok(0) => break Ok(()), // client closed its end
                Ok(_) => {
                    let outcome = dispatch_payloads(&mut parser, &engine, &conn, &buf).await;
                    buf.clear();
                    if let Err(err) = outcome {
                        break Err(err);
                    }
                }
            }
        }
    };

    conn.close().await;
    result
}

async fn dispatch_payloads(
    parser: &mut RespParser,
    engine: &Engine,
    conn: &Connection,
    chunk: &[u8],
) -> anyhow::Result<()> {
    for payload in parser.feed(chunk) {
        match payload {
            Err(err) => {
                // Malformed input: report it and keep the session alive.
                conn.write(&Reply::Error(err.to_string()).to_bytes())
                    .await
                    .context("failed to write error reply")?;
            }
            Ok(Reply::MultiBulk(args)) => {
                let reply = engine.exec(conn, &args);
                conn.write(&reply.to_bytes())
                    .await
                    .context("failed to write reply")?;
            }
            Ok(other) => {
                // clients must send commands as arrays
                warn!(payload = ?other, "ignoring non-array payload");
            }
        }
    }
    Ok(())
}

/// Resolves on any of the termination signals.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint =
        signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigquit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");
    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
        _ = sigquit.recv() => {}
        _ = sighup.recv() => {}
    }
}
