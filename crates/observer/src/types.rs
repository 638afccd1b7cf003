//! Chain identifiers and the values handed to subscribers.
//!
//! Block and operation hashes are kept in the node's textual (base58) form; the observer
//! only compares them for equality and never decodes them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Block hash as reported by the node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(String);

impl BlockHash {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockHash {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Operation (transaction) hash; the subscription key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpHash(String);

impl OpHash {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OpHash {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Block header fields the observer needs (`hash`, `level`); other fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: BlockHash,
    pub level: u64,
}

impl BlockHeader {
    pub fn new(hash: impl Into<String>, level: u64) -> Self {
        Self {
            hash: BlockHash::new(hash),
            level,
        }
    }
}

/// Where an operation was included: block height, validation pass and index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inclusion {
    pub height: u64,
    pub batch: usize,
    pub position: usize,
}

/// Identifier of a watcher, unique for the lifetime of one observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatcherId(pub u64);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// One notification delivered to a watcher.
///
/// `inclusion` is `Some` exactly once per watcher, for the block that included the watched
/// operation. Every later processed block is reported with `inclusion == None` so the
/// subscriber can count confirmations itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub block: BlockHash,
    /// Level of `block`.
    pub height: u64,
    pub inclusion: Option<Inclusion>,
    /// Reserved for finality reporting; currently always false.
    pub is_final: bool,
}

impl Confirmation {
    pub(crate) fn included(block: BlockHash, inclusion: Inclusion) -> Self {
        Self {
            block,
            height: inclusion.height,
            inclusion: Some(inclusion),
            is_final: false,
        }
    }

    pub(crate) fn depth(head: &BlockHeader) -> Self {
        Self {
            block: head.hash.clone(),
            height: head.level,
            inclusion: None,
            is_final: false,
        }
    }

    /// True for the first-match notification carrying position data.
    pub fn is_inclusion(&self) -> bool {
        self.inclusion.is_some()
    }
}

/// What a watcher wants after handling a [Confirmation].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Continue,
    Remove,
}
