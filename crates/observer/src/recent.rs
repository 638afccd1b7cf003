//! Operations included in the most recently processed block.
//!
//! Rebuilt from scratch for every processed block, so a subscription can only be satisfied
//! retroactively for the block processed immediately before it.

use crate::types::{BlockHash, BlockHeader, Inclusion, OpHash};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct RecentInclusions {
    block: Option<BlockHash>,
    entries: HashMap<OpHash, Inclusion>,
}

impl RecentInclusions {
    /// Replace the cache with the operations of `head`.
    pub fn replace(&mut self, head: &BlockHeader, ops: &[Vec<OpHash>]) {
        self.entries.clear();
        for (batch, list) in ops.iter().enumerate() {
            for (position, op) in list.iter().enumerate() {
                self.entries.insert(
                    op.clone(),
                    Inclusion {
                        height: head.level,
                        batch,
                        position,
                    },
                );
            }
        }
        self.block = Some(head.hash.clone());
    }

    /// Block hash and position of `op`, if the last processed block included it.
    pub fn get(&self, op: &OpHash) -> Option<(&BlockHash, Inclusion)> {
        let block = self.block.as_ref()?;
        self.entries.get(op).map(|inc| (block, *inc))
    }

    pub fn clear(&mut self) {
        self.block = None;
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
