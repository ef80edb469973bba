//! Streaming file server session.
//!
//! This module owns the lifecycle of the HTTP file server: binding the
//! listener, creating the per-session event channel, spawning the serve
//! task, and tearing everything down in order (cancel, await, drain) when
//! the session stops.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use scriptlink_core::{channel, EventBridge, EventRecord, DEFAULT_CAPACITY};
use scriptlink_files::{MAX_FILE_SIZE, MAX_PATH_LEN, SCRATCH_SIZE};

use crate::routes::{self, ServerContext};

/// How long `stop` waits for the serve task before aborting it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the streaming file server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileServerConfig {
    /// Address to bind to. Port 0 picks an ephemeral port.
    pub bind_addr: SocketAddr,
    /// Base directory served files live under.
    pub base_dir: PathBuf,
    /// Scratch buffer size; bounds control payloads and streaming chunks.
    pub scratch_size: usize,
    /// Maximum size of an individual uploaded file.
    pub max_file_size: u64,
    /// Combined base + request path byte bound.
    pub max_path_len: usize,
    /// Capacity of the session's event channel.
    pub queue_capacity: usize,
}

impl Default for FileServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            base_dir: PathBuf::from("www"),
            scratch_size: SCRATCH_SIZE,
            max_file_size: MAX_FILE_SIZE,
            max_path_len: MAX_PATH_LEN,
            queue_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Errors that can occur while starting the file server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The configured address.
        addr: SocketAddr,
        /// The underlying error.
        source: std::io::Error,
    },
}

/// A running file server session.
///
/// Created by [`FileServerSession::start`]; holds the consumer half of the
/// session's event channel. Dropping the session without calling
/// [`stop`](FileServerSession::stop) still closes the channel, but `stop`
/// is the orderly path: cancel, await the serve task, then drain.
pub struct FileServerSession {
    local_addr: SocketAddr,
    receiver: scriptlink_core::EventReceiver,
    bridge: Arc<EventBridge>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl FileServerSession {
    /// Bind the listener and start serving.
    ///
    /// The event channel is created here and belongs to this session alone.
    pub async fn start(config: FileServerConfig) -> Result<Self, ServerError> {
        let (sender, receiver) = channel(config.queue_capacity);
        let bridge = Arc::new(EventBridge::new(sender));

        let context = Arc::new(ServerContext {
            base_dir: config.base_dir.clone(),
            scratch_size: config.scratch_size,
            max_file_size: config.max_file_size,
            max_path_len: config.max_path_len,
            bridge: bridge.clone(),
        });

        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: config.bind_addr,
            source,
        })?;

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let app = routes::router(context);

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = serve.await {
                error!("file server error: {}", e);
            }
        });

        info!("file server listening on {}", local_addr);
        info!("  base directory: {}", config.base_dir.display());

        Ok(Self {
            local_addr,
            receiver,
            bridge,
            cancel,
            task,
        })
    }

    /// The address the listener actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Poll the session's event channel without blocking.
    pub fn poll(&mut self) -> Option<EventRecord> {
        self.receiver.try_recv()
    }

    /// How many events were dropped because the channel was full.
    pub fn dropped_events(&self) -> u64 {
        self.bridge.dropped()
    }

    /// Stop the server: cancel the serve task, await it within a bounded
    /// timeout, then drain and close the channel.
    ///
    /// Returns the number of unconsumed events released during the drain.
    pub async fn stop(mut self) -> usize {
        self.cancel.cancel();
        if tokio::time::timeout(STOP_TIMEOUT, &mut self.task)
            .await
            .is_err()
        {
            error!("file server did not shut down in time, aborting task");
            self.task.abort();
        }

        let released = self.receiver.drain_and_close();
        if released > 0 {
            debug!("released {} unconsumed events on shutdown", released);
        }
        info!("file server stopped");
        released
    }
}
