//! Subscription registry: watchers, the operation-hash index, the recent-inclusion cache and
//! the best head, all guarded together by the observer's single lock.
//!
//! Only one watcher per operation hash is indexed. Subscribing the same hash twice re-points
//! the index at the newer watcher; the older one stays registered but is never matched.

use crate::cursor::Cursor;
use crate::recent::RecentInclusions;
use crate::types::{BlockHeader, Confirmation, Inclusion, OpHash, WatchAction, WatcherId};
use std::collections::HashMap;

/// Watcher callback. Runs while the observer lock is held, so it must not call back into
/// the observer it is registered with.
pub type Callback = Box<dyn FnMut(&Confirmation) -> WatchAction + Send>;

struct Watcher {
    op: OpHash,
    callback: Callback,
    matched: bool,
}

#[derive(Default)]
pub struct Registry {
    seq: u64,
    subs: HashMap<WatcherId, Watcher>,
    watched: HashMap<OpHash, WatcherId>,
    recent: RecentInclusions,
    cursor: Cursor,
    closed: bool,
}

impl Registry {
    /// Register a watcher. If the last processed block already included `op`, the callback
    /// runs before this returns and may remove the watcher right away.
    pub fn subscribe(&mut self, op: OpHash, callback: Callback) -> WatcherId {
        self.seq += 1;
        let id = WatcherId(self.seq);
        self.watched.insert(op.clone(), id);
        let mut watcher = Watcher {
            op,
            callback,
            matched: false,
        };
        tracing::debug!(%id, op = %watcher.op, "subscribed");

        if let Some((block, inclusion)) = self.recent.get(&watcher.op) {
            tracing::debug!(%id, op = %watcher.op, %block, "matched in recent block");
            let c = Confirmation::included(block.clone(), inclusion);
            if (watcher.callback)(&c) == WatchAction::Remove {
                self.watched.remove(&watcher.op);
                return id;
            }
            watcher.matched = true;
        }
        self.subs.insert(id, watcher);
        id
    }

    /// Remove a watcher. Returns false if `id` is unknown.
    pub fn unsubscribe(&mut self, id: WatcherId) -> bool {
        match self.subs.remove(&id) {
            Some(w) => {
                unindex(&mut self.watched, &w.op, id);
                tracing::debug!(%id, op = %w.op, "unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Tell every previously matched watcher that `head` has passed.
    pub fn signal_depth(&mut self, head: &BlockHeader) {
        if self.closed {
            return;
        }
        let watched = &mut self.watched;
        self.subs.retain(|id, w| {
            if !w.matched {
                return true;
            }
            tracing::debug!(%id, op = %w.op, level = head.level, block = %head.hash, "signal n-th match");
            let keep = (w.callback)(&Confirmation::depth(head)) == WatchAction::Continue;
            if !keep {
                unindex(watched, &w.op, *id);
            }
            keep
        });
    }

    /// Reconcile the operations of `head` against watchers, rebuild the recent cache and
    /// advance the best head.
    pub fn apply_block(&mut self, head: &BlockHeader, ops: &[Vec<OpHash>]) {
        if self.closed {
            return;
        }
        self.recent.replace(head, ops);

        for (batch, list) in ops.iter().enumerate() {
            for (position, op) in list.iter().enumerate() {
                let Some(&id) = self.watched.get(op) else {
                    continue;
                };
                let Some(w) = self.subs.get_mut(&id) else {
                    tracing::debug!(%id, %op, "stale index entry");
                    continue;
                };
                if w.op != *op {
                    tracing::debug!(%id, %op, "index mismatch");
                    continue;
                }
                tracing::debug!(%id, %op, level = head.level, batch, position, "matched");
                let c = Confirmation::included(
                    head.hash.clone(),
                    Inclusion {
                        height: head.level,
                        batch,
                        position,
                    },
                );
                if (w.callback)(&c) == WatchAction::Remove {
                    self.unsubscribe(id);
                } else {
                    w.matched = true;
                }
            }
        }

        self.cursor.advance(head);
    }

    /// Drop all watchers and cached state; later dispatch passes are no-ops.
    pub fn close(&mut self) {
        self.closed = true;
        self.subs.clear();
        self.watched.clear();
        self.recent.clear();
        self.cursor = Cursor::default();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn contains(&self, id: WatcherId) -> bool {
        self.subs.contains_key(&id)
    }

    /// Watcher currently indexed for `op`.
    pub fn watcher_for(&self, op: &OpHash) -> Option<WatcherId> {
        self.watched.get(op).copied()
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}

/// Remove the index entry for `op` only if it still belongs to `id`.
fn unindex(watched: &mut HashMap<OpHash, WatcherId>, op: &OpHash, id: WatcherId) {
    if watched.get(op) == Some(&id) {
        watched.remove(op);
    }
}
