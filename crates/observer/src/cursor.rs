//! Best-known head of the observer (in-memory only).

use crate::types::{BlockHash, BlockHeader};

/// Last head whose operations were fully reconciled against watchers.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    pub best_hash: Option<BlockHash>,
    pub best_height: u64,
}

impl Cursor {
    pub fn advance(&mut self, head: &BlockHeader) {
        self.best_hash = Some(head.hash.clone());
        self.best_height = head.level;
    }

    /// True if `hash` is the head processed last.
    pub fn is_best(&self, hash: &BlockHash) -> bool {
        self.best_hash.as_ref() == Some(hash)
    }

    pub fn head(&self) -> Option<BlockHeader> {
        self.best_hash.clone().map(|hash| BlockHeader {
            hash,
            level: self.best_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_default() {
        let c = Cursor::default();
        assert!(c.head().is_none());
        assert!(!c.is_best(&"B1".into()));
    }

    #[test]
    fn cursor_advance() {
        let mut c = Cursor::default();
        c.advance(&BlockHeader::new("B1", 10));
        assert!(c.is_best(&"B1".into()));
        c.advance(&BlockHeader::new("B2", 11));
        assert!(!c.is_best(&"B1".into()));
        assert_eq!(c.head(), Some(BlockHeader::new("B2", 11)));
    }
}
