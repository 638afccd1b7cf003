//! Observer: follows the chain head and reports when watched operations are included.
//!
//! [Observer::listen] spawns one background loop per observer. The loop first tries the
//! node's header stream and permanently falls back to polling the tip if the node reports
//! streaming as unsupported. For every new head it
//!
//! 1. signals "one more block" to watchers that already matched,
//! 2. fetches the block's operation hashes,
//! 3. rebuilds the recent-inclusion cache and reports first matches with their position,
//! 4. records the head as best.
//!
//! Steps 1, 3 and 4 run under the observer lock shared with [Observer::subscribe] and
//! [Observer::unsubscribe]; no lock is held across an RPC call or a wait.
//!
//! Limitations: no reorg detection (a head switching hash at the same height is treated as a
//! new block), no back-fill of skipped heights, one watcher per operation hash, and a failed
//! operation fetch loses that block's matches.

use crate::client::{ChainClient, ClientError, HeaderStream};
use crate::config::{ObserverConfig, DEFAULT_MIN_BLOCK_INTERVAL};
use crate::depth::{channel_callback, DepthEvent, DepthTracker, Strategy};
use crate::registry::Registry;
use crate::types::{BlockHeader, Confirmation, OpHash, WatchAction, WatcherId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("observer is closed")]
    Closed,
    #[error("no tokio runtime to run the observer on")]
    NoRuntime,
}

/// How the loop learns about new heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Streaming,
    Polling,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Operation confirmation observer. See the module docs.
pub struct Observer {
    registry: Arc<Mutex<Registry>>,
    cancel: CancellationToken,
    started: AtomicBool,
    config: ObserverConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Observer {
    pub fn new() -> Self {
        Self::with_config(ObserverConfig::default())
    }

    pub fn with_config(config: ObserverConfig) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            config,
            task: Mutex::new(None),
        }
    }

    /// Override the minimal block interval (takes precedence over the chain's value).
    pub fn with_min_block_interval(mut self, interval: Duration) -> Self {
        self.config.min_block_interval = Some(interval);
        self
    }

    /// Watch `op`. The callback receives one [Confirmation] with position data for the
    /// including block, then one per later block until it returns [WatchAction::Remove].
    ///
    /// If the block processed last already included `op`, the callback runs before this
    /// returns. Callbacks run under the observer lock and must not call back into it.
    pub fn subscribe<F>(&self, op: OpHash, callback: F) -> Result<WatcherId, ObserverError>
    where
        F: FnMut(&Confirmation) -> WatchAction + Send + 'static,
    {
        let mut registry = lock(&self.registry);
        if registry.is_closed() {
            return Err(ObserverError::Closed);
        }
        Ok(registry.subscribe(op, Box::new(callback)))
    }

    /// Watch `op` until `strategy` reports it final, receiving progress on a channel.
    pub fn subscribe_with_depth<S: Strategy + 'static>(
        &self,
        op: OpHash,
        strategy: S,
    ) -> Result<(WatcherId, mpsc::UnboundedReceiver<DepthEvent>), ObserverError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback = channel_callback(DepthTracker::new(op.clone(), strategy), tx);
        let id = self.subscribe(op, callback)?;
        Ok((id, rx))
    }

    /// Stop watching. Returns false if `id` is unknown or already removed.
    pub fn unsubscribe(&self, id: WatcherId) -> bool {
        lock(&self.registry).unsubscribe(id)
    }

    /// Start following blocks from `client` on the current tokio runtime.
    ///
    /// Returns `Ok(false)` if this observer was already started (by this or
    /// [Observer::listen_mempool]); only one loop ever runs.
    pub fn listen<C: ChainClient>(&self, client: Arc<C>) -> Result<bool, ObserverError> {
        let Some(handle) = self.claim_start()? else {
            return Ok(false);
        };
        let min_block_interval = self
            .config
            .min_block_interval
            .or_else(|| client.min_block_interval())
            .unwrap_or(DEFAULT_MIN_BLOCK_INTERVAL);
        let mode = if self.config.streaming {
            Mode::Streaming
        } else {
            Mode::Polling
        };
        tracing::info!(?mode, ?min_block_interval, "observer listening for blocks");

        let engine = Engine {
            client,
            registry: Arc::clone(&self.registry),
            cancel: self.cancel.clone(),
            min_block_interval,
            retry_backoff: self.config.retry_backoff,
            mode,
            stream: None,
        };
        let task = handle.spawn(engine.run());
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(true)
    }

    /// Reserved: mempool monitoring. Claims the start-once guard like [Observer::listen]
    /// but does no work.
    pub fn listen_mempool<C: ChainClient>(&self, _client: Arc<C>) -> Result<bool, ObserverError> {
        if self.claim_start()?.is_none() {
            return Ok(false);
        }
        tracing::debug!("mempool monitoring is not implemented");
        Ok(true)
    }

    fn claim_start(&self) -> Result<Option<Handle>, ObserverError> {
        if self.is_closed() {
            return Err(ObserverError::Closed);
        }
        let handle = Handle::try_current().map_err(|_| ObserverError::NoRuntime)?;
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("observer already started");
            return Ok(None);
        }
        Ok(Some(handle))
    }

    /// Stop the loop and drop all watchers and cached state. No callback runs after this
    /// returns. Terminal: later subscribe/listen calls fail with [ObserverError::Closed].
    pub fn close(&self) {
        let mut registry = lock(&self.registry);
        self.cancel.cancel();
        registry.close();
        tracing::debug!("observer closed");
    }

    /// [Observer::close] and wait for the background loop to release its connections.
    pub async fn shutdown(&self) {
        self.close();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(reason = %e, "observer loop ended abnormally");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Last head whose operations were fully reconciled.
    pub fn best_head(&self) -> Option<BlockHeader> {
        lock(&self.registry).cursor().head()
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.close();
    }
}

enum Next {
    Head(BlockHeader),
    Retry,
    Cancelled,
}

/// Loop state; the stream and mode are never shared with callers.
struct Engine<C: ChainClient> {
    client: Arc<C>,
    registry: Arc<Mutex<Registry>>,
    cancel: CancellationToken,
    min_block_interval: Duration,
    retry_backoff: Duration,
    mode: Mode,
    stream: Option<C::Stream>,
}

impl<C: ChainClient> Engine<C> {
    async fn run(mut self) {
        let mut first = true;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if self.stream.is_none() && self.mode == Mode::Streaming {
                match self.client.monitor_block_headers().await {
                    Ok(stream) => {
                        tracing::debug!("header stream opened");
                        self.stream = Some(stream);
                    }
                    Err(e) if e.is_unsupported() => {
                        tracing::info!(reason = %e, "header streaming unsupported, falling back to polling");
                        self.mode = Mode::Polling;
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(reason = %e, "cannot open header stream, retrying");
                        if !wait(&self.cancel, self.retry_backoff).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            // The first head is always polled so the current tip is handled right away.
            let head = match self.next_head(first).await {
                Next::Head(head) => head,
                Next::Retry => continue,
                Next::Cancelled => break,
            };
            first = false;

            if self.mode == Mode::Polling {
                let repeated = lock(&self.registry).cursor().is_best(&head.hash);
                if repeated {
                    // late blocks at the same height
                    if !wait(&self.cancel, self.min_block_interval / 2).await {
                        break;
                    }
                    continue;
                }
            }
            tracing::debug!(level = head.level, hash = %head.hash, "new block");

            lock(&self.registry).signal_depth(&head);

            let ops = match self.client.block_operation_hashes(&head.hash).await {
                Ok(ops) => ops,
                Err(e) => {
                    tracing::warn!(reason = %e, level = head.level, hash = %head.hash, "cannot fetch block operations, skipping block");
                    if self.mode == Mode::Polling && !wait(&self.cancel, self.retry_backoff).await {
                        break;
                    }
                    continue;
                }
            };

            lock(&self.registry).apply_block(&head, &ops);

            if self.mode == Mode::Polling && !wait(&self.cancel, self.min_block_interval).await {
                break;
            }
        }
        self.close_stream();
        tracing::debug!("observer loop stopped");
    }

    async fn next_head(&mut self, first: bool) -> Next {
        if !first {
            if let Some(stream) = self.stream.as_mut() {
                let res = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Next::Cancelled,
                    res = stream.next() => res,
                };
                return match res {
                    Ok(head) => {
                        tracing::debug!(level = head.level, hash = %head.hash, "streamed head");
                        Next::Head(head)
                    }
                    Err(e) => {
                        tracing::debug!(reason = %e, "header stream failed, reconnecting");
                        self.close_stream();
                        Next::Retry
                    }
                };
            }
        }

        match poll_tip(self.client.as_ref()).await {
            Ok(head) => Next::Head(head),
            Err(e) => {
                tracing::warn!(reason = %e, "cannot fetch chain tip");
                if wait(&self.cancel, self.retry_backoff).await {
                    Next::Retry
                } else {
                    Next::Cancelled
                }
            }
        }
    }

    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
    }
}

async fn poll_tip<C: ChainClient>(client: &C) -> Result<BlockHeader, ClientError> {
    let tip = client.tip_header().await?;
    let hash = client.block_hash_at(tip.level).await?;
    Ok(BlockHeader {
        hash,
        level: tip.level,
    })
}

/// Sleep for `d`; false if cancelled first.
async fn wait(cancel: &CancellationToken, d: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(d) => true,
    }
}
