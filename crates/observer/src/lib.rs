//! Block and operation confirmation observer.
//!
//! - **Observer**: follows the chain head (header stream, or tip polling when the node has no
//!   streaming support) and reports to watchers when their operation is included, then once
//!   per later block so they can count confirmations. Not reorg-safe.
//! - **ChainClient**: the node reads the observer needs; [RpcClient] implements it over the
//!   node REST RPC.
//! - **Depth helpers**: [DepthTracker] and [ConfirmationDepth] turn raw notifications into
//!   depth-K finality (see [Observer::subscribe_with_depth]).

pub mod client;
pub mod config;
pub mod cursor;
pub mod depth;
pub mod observer;
pub mod recent;
pub mod registry;
pub mod rpc;
pub mod types;

pub use client::{ChainClient, ClientError, HeaderStream};
pub use config::{ConfigError, ObserverConfig, ProjectConfig, RpcConfig};
pub use cursor::Cursor;
pub use depth::{ConfirmationDepth, DepthEvent, DepthTracker, Strategy};
pub use observer::{Observer, ObserverError};
pub use rpc::{RpcClient, RpcHeaderStream};
pub use types::{
    BlockHash, BlockHeader, Confirmation, Inclusion, OpHash, WatchAction, WatcherId,
};
