//! Confirmation-depth tracking on top of raw watcher callbacks.
//!
//! The observer only reports "included here" once and "another block passed" afterwards.
//! [DepthTracker] counts those notifications per watcher and decides, through a [Strategy],
//! when the operation is final and the watcher can be dropped.

use crate::types::{BlockHash, Confirmation, Inclusion, OpHash, WatchAction};
use serde::Serialize;
use tokio::sync::mpsc;

/// Decides when an included operation has enough confirmations.
pub trait Strategy: Send + Sync {
    /// `depth` is 1 for the including block and grows by one per later block.
    fn is_final(&self, depth: u64) -> bool;
}

/// Final once `depth >= K`. `ConfirmationDepth(1)` finalizes on inclusion.
#[derive(Debug, Clone)]
pub struct ConfirmationDepth(pub u64);

impl Strategy for ConfirmationDepth {
    fn is_final(&self, depth: u64) -> bool {
        depth >= self.0
    }
}

/// One step of an operation's confirmation progress, ready for JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepthEvent {
    pub op: OpHash,
    /// Block that included the operation.
    pub included_in: BlockHash,
    pub inclusion: Inclusion,
    /// Block that produced this event.
    pub block: BlockHash,
    pub height: u64,
    pub depth: u64,
    pub finalized: bool,
}

/// Per-watcher confirmation counter.
///
/// A block is counted once. The observer may report the same head twice (a re-announced
/// streamed head, or a head retried after a failed operation fetch); such repeats yield no
/// event.
pub struct DepthTracker<S> {
    op: OpHash,
    strategy: S,
    first: Option<(BlockHash, Inclusion)>,
    last: Option<BlockHash>,
    depth: u64,
}

impl<S: Strategy> DepthTracker<S> {
    pub fn new(op: OpHash, strategy: S) -> Self {
        Self {
            op,
            strategy,
            first: None,
            last: None,
            depth: 0,
        }
    }

    /// Fold one notification in. Returns `None` for notifications that do not change the
    /// depth: a depth notification before any inclusion, or one naming a block already
    /// counted.
    pub fn observe(&mut self, c: &Confirmation) -> Option<DepthEvent> {
        if self.last.as_ref() == Some(&c.block) {
            return None;
        }
        match c.inclusion {
            Some(inclusion) => {
                self.first = Some((c.block.clone(), inclusion));
                self.depth = 1;
            }
            None => {
                let (included_in, _) = self.first.as_ref()?;
                if *included_in == c.block {
                    return None;
                }
                self.depth += 1;
            }
        }
        self.last = Some(c.block.clone());

        let (included_in, inclusion) = self.first.clone()?;
        Some(DepthEvent {
            op: self.op.clone(),
            included_in,
            inclusion,
            block: c.block.clone(),
            height: c.height,
            depth: self.depth,
            finalized: self.strategy.is_final(self.depth),
        })
    }

    pub fn depth(&self) -> u64 {
        self.depth
    }
}

/// Watcher callback that forwards every [DepthEvent] to `tx` and asks for removal once the
/// strategy reports final or the receiver is gone.
pub fn channel_callback<S: Strategy + 'static>(
    mut tracker: DepthTracker<S>,
    tx: mpsc::UnboundedSender<DepthEvent>,
) -> impl FnMut(&Confirmation) -> WatchAction + Send + 'static {
    move |c: &Confirmation| {
        let Some(ev) = tracker.observe(c) else {
            return WatchAction::Continue;
        };
        let finalized = ev.finalized;
        if tx.send(ev).is_err() || finalized {
            WatchAction::Remove
        } else {
            WatchAction::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockHeader;

    fn passed(block: &str, height: u64) -> Confirmation {
        Confirmation::depth(&BlockHeader::new(block, height))
    }

    fn included(block: &str, height: u64) -> Confirmation {
        Confirmation::included(
            block.into(),
            Inclusion {
                height,
                batch: 3,
                position: 1,
            },
        )
    }

    #[test]
    fn confirmation_depth_strategy() {
        let s = ConfirmationDepth(3);
        assert!(!s.is_final(2));
        assert!(s.is_final(3));
        assert!(s.is_final(4));
        assert!(ConfirmationDepth(0).is_final(0));
    }

    #[test]
    fn tracker_counts_from_inclusion() {
        let mut t = DepthTracker::new("opA".into(), ConfirmationDepth(2));
        assert!(t.observe(&passed("h99", 99)).is_none());

        let ev = t.observe(&included("h100", 100)).unwrap();
        assert_eq!(ev.depth, 1);
        assert!(!ev.finalized);
        assert_eq!(ev.included_in.as_str(), "h100");

        let ev = t.observe(&passed("h101", 101)).unwrap();
        assert_eq!(ev.depth, 2);
        assert!(ev.finalized);
        assert_eq!((ev.block.as_str(), ev.height), ("h101", 101));
        assert_eq!(ev.included_in.as_str(), "h100");
        assert_eq!(ev.inclusion.height, 100);
    }

    #[test]
    fn repeated_blocks_are_counted_once() {
        let mut t = DepthTracker::new("opA".into(), ConfirmationDepth(3));
        assert_eq!(t.observe(&included("h100", 100)).unwrap().depth, 1);
        // including block re-announced, then its inclusion matched again
        assert!(t.observe(&passed("h100", 100)).is_none());
        assert!(t.observe(&included("h100", 100)).is_none());
        assert_eq!(t.depth(), 1);

        let ev = t.observe(&passed("h101", 101)).unwrap();
        assert_eq!((ev.depth, ev.finalized), (2, false));
        // same head retried after a failed cycle
        assert!(t.observe(&passed("h101", 101)).is_none());
        assert_eq!(t.depth(), 2);

        let ev = t.observe(&passed("h102", 102)).unwrap();
        assert_eq!((ev.depth, ev.finalized), (3, true));
    }

    #[test]
    fn inclusion_in_another_block_restarts_the_count() {
        let mut t = DepthTracker::new("opA".into(), ConfirmationDepth(3));
        t.observe(&included("h100", 100));
        t.observe(&passed("h101", 101));
        let ev = t.observe(&included("h101b", 101)).unwrap();
        assert_eq!(ev.depth, 1);
        assert_eq!(ev.included_in.as_str(), "h101b");
        assert!(t.observe(&passed("h101b", 101)).is_none());
        assert_eq!(t.observe(&passed("h102", 102)).unwrap().depth, 2);
    }

    #[test]
    fn channel_callback_removes_when_final() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut cb = channel_callback(DepthTracker::new("opA".into(), ConfirmationDepth(2)), tx);
        assert_eq!(cb(&included("h100", 100)), WatchAction::Continue);
        assert_eq!(cb(&passed("h100", 100)), WatchAction::Continue);
        assert_eq!(cb(&passed("h101", 101)), WatchAction::Remove);
        assert_eq!(rx.try_recv().unwrap().depth, 1);
        assert!(rx.try_recv().unwrap().finalized);
    }

    #[test]
    fn channel_callback_removes_when_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut cb = channel_callback(DepthTracker::new("opA".into(), ConfirmationDepth(5)), tx);
        assert_eq!(cb(&included("h100", 100)), WatchAction::Remove);
    }
}
