//! Common helpers for integration tests: a scripted in-memory chain.
//! Some helpers are only used by specific test binaries.
#![allow(dead_code)]

use async_trait::async_trait;
use observer::{
    BlockHash, BlockHeader, ChainClient, ClientError, Confirmation, HeaderStream, Inclusion,
    OpHash, WatchAction,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

/// How [MockChain::monitor_block_headers] behaves.
#[derive(Debug, Clone, Copy)]
pub enum StreamSupport {
    /// Node has no header streaming (404).
    Unsupported,
    /// The first `n` opens fail with a 500, later opens succeed.
    FailFirst(usize),
    Supported,
}

#[derive(Default)]
struct ChainState {
    tip: Option<BlockHeader>,
    blocks: HashMap<BlockHash, Vec<Vec<OpHash>>>,
    failing_ops: HashSet<BlockHash>,
    stream_tx: Option<mpsc::UnboundedSender<BlockHeader>>,
}

pub struct MockChain {
    support: StreamSupport,
    state: Mutex<ChainState>,
    pub opens: AtomicUsize,
    pub tip_calls: AtomicUsize,
    pub ops_calls: AtomicUsize,
    pub stream_closes: Arc<AtomicUsize>,
}

impl MockChain {
    pub fn new(support: StreamSupport) -> Arc<Self> {
        Arc::new(Self {
            support,
            state: Mutex::new(ChainState::default()),
            opens: AtomicUsize::new(0),
            tip_calls: AtomicUsize::new(0),
            ops_calls: AtomicUsize::new(0),
            stream_closes: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Register a block's operations (batches of op hashes).
    pub fn add_block(&self, hash: &str, ops: &[&[&str]]) {
        let ops = ops
            .iter()
            .map(|b| b.iter().map(|s| OpHash::from(*s)).collect())
            .collect();
        self.state.lock().unwrap().blocks.insert(hash.into(), ops);
    }

    /// Register a block and make it the polled tip.
    pub fn set_tip(&self, hash: &str, level: u64, ops: &[&[&str]]) {
        self.add_block(hash, ops);
        self.state.lock().unwrap().tip = Some(BlockHeader::new(hash, level));
    }

    /// Register a block and push it on the open header stream.
    pub fn push_head(&self, hash: &str, level: u64, ops: &[&[&str]]) {
        self.add_block(hash, ops);
        let state = self.state.lock().unwrap();
        let tx = state.stream_tx.as_ref().expect("no open header stream");
        tx.send(BlockHeader::new(hash, level)).expect("stream receiver dropped");
    }

    /// Terminate the open header stream; the next receive fails.
    pub fn end_stream(&self) {
        self.state.lock().unwrap().stream_tx = None;
    }

    pub fn fail_ops(&self, hash: &str) {
        self.state.lock().unwrap().failing_ops.insert(hash.into());
    }

    pub fn heal_ops(&self, hash: &str) {
        self.state.lock().unwrap().failing_ops.remove(&BlockHash::from(hash));
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn tip_calls(&self) -> usize {
        self.tip_calls.load(Ordering::SeqCst)
    }

    pub fn stream_closes(&self) -> usize {
        self.stream_closes.load(Ordering::SeqCst)
    }

    /// Wait (in paused test time) until `n` streams have been opened.
    pub async fn wait_for_opens(&self, n: usize) {
        for _ in 0..1000 {
            let connected = self.state.lock().unwrap().stream_tx.is_some();
            if connected && self.opens() >= n {
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("header stream #{n} never opened");
    }
}

pub struct MockStream {
    rx: mpsc::UnboundedReceiver<BlockHeader>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl HeaderStream for MockStream {
    async fn next(&mut self) -> Result<BlockHeader, ClientError> {
        self.rx.recv().await.ok_or(ClientError::StreamClosed)
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    type Stream = MockStream;

    async fn monitor_block_headers(&self) -> Result<MockStream, ClientError> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst);
        match self.support {
            StreamSupport::Unsupported => {
                return Err(ClientError::Status {
                    status: 404,
                    body: "not found".into(),
                })
            }
            StreamSupport::FailFirst(k) if n < k => {
                return Err(ClientError::Status {
                    status: 500,
                    body: "connection reset".into(),
                })
            }
            _ => {}
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().stream_tx = Some(tx);
        Ok(MockStream {
            rx,
            closes: Arc::clone(&self.stream_closes),
        })
    }

    async fn tip_header(&self) -> Result<BlockHeader, ClientError> {
        self.tip_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .tip
            .clone()
            .ok_or_else(|| ClientError::Decode("no tip".into()))
    }

    async fn block_hash_at(&self, level: u64) -> Result<BlockHash, ClientError> {
        let state = self.state.lock().unwrap();
        match &state.tip {
            Some(tip) if tip.level == level => Ok(tip.hash.clone()),
            _ => Err(ClientError::Status {
                status: 404,
                body: format!("no block at {level}"),
            }),
        }
    }

    async fn block_operation_hashes(
        &self,
        block: &BlockHash,
    ) -> Result<Vec<Vec<OpHash>>, ClientError> {
        self.ops_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.failing_ops.contains(block) {
            return Err(ClientError::Status {
                status: 500,
                body: "internal error".into(),
            });
        }
        state
            .blocks
            .get(block)
            .cloned()
            .ok_or_else(|| ClientError::Decode(format!("unknown block {block}")))
    }
}

/// Callback that forwards every notification to a channel and applies `action`.
pub fn forward(
    action: fn(&Confirmation) -> WatchAction,
) -> (
    mpsc::UnboundedReceiver<Confirmation>,
    impl FnMut(&Confirmation) -> WatchAction + Send + 'static,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cb = move |c: &Confirmation| {
        let _ = tx.send(c.clone());
        action(c)
    };
    (rx, cb)
}

pub fn keep(_: &Confirmation) -> WatchAction {
    WatchAction::Continue
}

pub fn remove(_: &Confirmation) -> WatchAction {
    WatchAction::Remove
}

/// Next notification, failing the test if none arrives within a minute of test time.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Confirmation>) -> Confirmation {
    timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for confirmation")
        .expect("watcher channel closed")
}

pub fn included(block: &str, height: u64, batch: usize, position: usize) -> Confirmation {
    Confirmation {
        block: block.into(),
        height,
        inclusion: Some(Inclusion {
            height,
            batch,
            position,
        }),
        is_final: false,
    }
}

pub fn depth(block: &str, height: u64) -> Confirmation {
    Confirmation {
        block: block.into(),
        height,
        inclusion: None,
        is_final: false,
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
