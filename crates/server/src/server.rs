//! Server lifecycle: listener, bounded job queue, worker pool.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use deepwell_core::auth::AuthTable;
use deepwell_core::config::ServerConfig;
use deepwell_drive::Drive;
use deepwell_wire::{Framed, WireResult};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

use crate::request::{self, Request};
use crate::tls;

/// Errors that take the server down.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Immutable state shared with every request handler. Built once at
/// startup; plain `Arc` sharing afterwards, no locking.
pub struct ServerState {
    pub drives: HashMap<String, Drive>,
    pub auth: AuthTable,
    pub timeout: Duration,
}

/// One accepted connection waiting for a worker. The TLS handshake has not
/// happened yet; the worker performs it so a slow peer cannot stall accept.
struct Job {
    stream: TcpStream,
    peer: SocketAddr,
}

/// The DEEPWELL server.
pub struct Server {
    state: Arc<ServerState>,
    acceptor: TlsAcceptor,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    backlog: usize,
    workers: usize,
    running: AtomicBool,
    stop_tx: broadcast::Sender<()>,
}

impl Server {
    /// Build the drive map, authentication table and TLS acceptor from the
    /// configuration, and bind the listener.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServeError> {
        config
            .validate()
            .map_err(|err| ServeError::Config(err.to_string()))?;
        let timeout = config
            .timeout_duration()
            .map_err(|err| ServeError::Config(err.to_string()))?;

        let mut drives = HashMap::new();
        for entry in &config.drive {
            drives.insert(entry.name.clone(), Drive::new(&entry.path));
        }

        let state = Arc::new(ServerState {
            drives,
            auth: AuthTable::from_config(&config.auth),
            timeout,
        });

        let tls_config = tls::server_config(&config.certificate)?;
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let listener = TcpListener::bind(config.listen_addr()).await?;
        let local_addr = listener.local_addr()?;

        let (stop_tx, _) = broadcast::channel(config.workers.max(1));

        Ok(Self {
            state,
            acceptor,
            listener: Mutex::new(Some(listener)),
            local_addr,
            backlog: config.backlog,
            workers: config.workers,
            running: AtomicBool::new(false),
            stop_tx,
        })
    }

    /// The bound listen address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawn the worker pool and run the accept loop until [`Server::stop`].
    pub async fn serve(self: &Arc<Self>) -> Result<(), ServeError> {
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or(ServeError::AlreadyRunning)?;

        self.running.store(true, Ordering::SeqCst);

        let (job_tx, job_rx) = mpsc::channel::<Job>(self.backlog);
        let job_rx = Arc::new(Mutex::new(job_rx));

        for _ in 0..self.workers {
            let server = Arc::clone(self);
            let jobs = Arc::clone(&job_rx);
            let stop = self.stop_tx.subscribe();
            tokio::spawn(async move {
                server.worker(jobs, stop).await;
            });
        }

        info!("starting server");
        self.listen(listener, job_tx).await
    }

    /// Stop serving. The accept loop exits, workers finish the request they
    /// hold and return; queued-but-unclaimed connections are dropped.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // Wakes the accept loop and every worker. Failure means nothing is
        // listening, which is already the goal.
        let _ = self.stop_tx.send(());
        info!("stopping server");
    }

    /// The accept loop. The bounded job channel is the admission control:
    /// when workers fall behind, the send blocks, accept stalls, and TCP
    /// backpressure reaches the clients.
    async fn listen(&self, listener: TcpListener, jobs: mpsc::Sender<Job>) -> Result<(), ServeError> {
        let mut stop = self.stop_tx.subscribe();
        while self.running.load(Ordering::SeqCst) {
            let accepted = tokio::select! {
                _ = stop.recv() => return Ok(()),
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    if !self.running.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    error!(error = %err, "failed to accept connection");
                    continue;
                }
            };

            tokio::select! {
                _ = stop.recv() => return Ok(()),
                sent = jobs.send(Job { stream, peer }) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// A worker: take one request at a time off the shared queue and handle
    /// it to completion. No cleanup on the stop branch.
    async fn worker(
        self: Arc<Self>,
        jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
        mut stop: broadcast::Receiver<()>,
    ) {
        while self.running.load(Ordering::SeqCst) {
            let job = tokio::select! {
                _ = stop.recv() => return,
                job = async { jobs.lock().await.recv().await } => job,
            };
            let Some(job) = job else { return };

            if let Err(err) = self.handle(job).await {
                error!(error = %err, "failed to handle request");
            }
        }
    }

    /// Handle one connection: TLS handshake, then the request state
    /// machine. The connection is closed when this returns, success or not.
    async fn handle(&self, job: Job) -> WireResult<()> {
        // The handshake happens before the deadline-enforcing wrapper
        // exists, so it gets its own timeout.
        let stream = tokio::time::timeout(self.state.timeout, self.acceptor.accept(job.stream))
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "TLS handshake timed out")
            })??;
        let framed = Framed::new(stream, self.state.timeout);
        let mut req = Request::new(framed, job.peer);

        let result = request::handle(&self.state, &mut req).await;

        // Best-effort close_notify; the peer has its response either way.
        let _ = req.into_framed().into_inner().shutdown().await;
        result
    }
}
