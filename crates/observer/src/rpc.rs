//! [ChainClient] over the node's REST RPC.
//!
//! Unary reads are plain JSON GETs. The header stream is the long-lived
//! `/monitor/heads/<chain>` response: newline-separated JSON headers on a chunked body.

use crate::client::{ChainClient, ClientError, HeaderStream};
use crate::config::RpcConfig;
use crate::types::{BlockHash, BlockHeader, OpHash};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct Constants {
    minimal_block_delay: String,
}

/// Node REST RPC client.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base: String,
    chain: String,
    timeout: Duration,
    min_block_interval: Option<Duration>,
}

impl RpcClient {
    pub fn new(config: &RpcConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self {
            http,
            base: config.url.trim_end_matches('/').to_string(),
            chain: config.chain.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            min_block_interval: None,
        })
    }

    /// Fetch chain constants and remember the minimal block delay.
    pub async fn load_chain_params(mut self) -> Result<Self, ClientError> {
        let path = format!("/chains/{}/blocks/head/context/constants", self.chain);
        let constants: Constants = self.get_json(&path).await?;
        let secs: u64 = constants
            .minimal_block_delay
            .parse()
            .map_err(|e| ClientError::Decode(format!("minimal_block_delay: {e}")))?;
        tracing::debug!(secs, "loaded minimal block delay");
        self.min_block_interval = Some(Duration::from_secs(secs));
        Ok(self)
    }

    async fn get(
        &self,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut req = self.http.get(format!("{}{}", self.base, path));
        if let Some(t) = timeout {
            req = req.timeout(t);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.get(path, Some(self.timeout)).await?;
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(format!("{path}: {e}")))
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    type Stream = RpcHeaderStream;

    async fn monitor_block_headers(&self) -> Result<RpcHeaderStream, ClientError> {
        let resp = self.get(&format!("/monitor/heads/{}", self.chain), None).await?;
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(RpcHeaderStream {
            body: Some(body),
            buf: Vec::new(),
        })
    }

    async fn tip_header(&self) -> Result<BlockHeader, ClientError> {
        self.get_json(&format!("/chains/{}/blocks/head/header", self.chain))
            .await
    }

    async fn block_hash_at(&self, level: u64) -> Result<BlockHash, ClientError> {
        self.get_json(&format!("/chains/{}/blocks/{}/hash", self.chain, level))
            .await
    }

    async fn block_operation_hashes(
        &self,
        block: &BlockHash,
    ) -> Result<Vec<Vec<OpHash>>, ClientError> {
        self.get_json(&format!(
            "/chains/{}/blocks/{}/operation_hashes",
            self.chain, block
        ))
        .await
    }

    fn min_block_interval(&self) -> Option<Duration> {
        self.min_block_interval
    }
}

/// Header stream backed by a chunked `/monitor/heads` response.
pub struct RpcHeaderStream {
    body: Option<BoxStream<'static, reqwest::Result<Vec<u8>>>>,
    buf: Vec<u8>,
}

impl RpcHeaderStream {
    /// Pop one complete line from the buffer, skipping blank ones.
    fn next_line(&mut self) -> Option<Vec<u8>> {
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if !line.trim_ascii().is_empty() {
                return Some(line);
            }
        }
        None
    }
}

fn decode_header(line: &[u8]) -> Result<BlockHeader, ClientError> {
    serde_json::from_slice(line.trim_ascii())
        .map_err(|e| ClientError::Decode(format!("monitor header: {e}")))
}

#[async_trait]
impl HeaderStream for RpcHeaderStream {
    async fn next(&mut self) -> Result<BlockHeader, ClientError> {
        loop {
            if let Some(line) = self.next_line() {
                return decode_header(&line);
            }
            let body = self.body.as_mut().ok_or(ClientError::StreamClosed)?;
            match body.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e.into()),
                None => {
                    self.body = None;
                    // trailing object without newline
                    if self.buf.trim_ascii().is_empty() {
                        return Err(ClientError::StreamClosed);
                    }
                    let rest = std::mem::take(&mut self.buf);
                    return decode_header(&rest);
                }
            }
        }
    }

    fn close(&mut self) {
        self.body = None;
        self.buf.clear();
    }
}
