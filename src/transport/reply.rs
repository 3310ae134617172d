// MIT License - Copyright (c) 2026 Peter Wright
// Pending reply table

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::error::Result;
use crate::flow::{CommandFlow, ReplyPredicate};
use crate::protocol::Packet;

/// Resolved once the last step of a flow chain has been sent.
pub type Completion = oneshot::Sender<Result<()>>;

struct PendingReply {
    id: u64,
    predicate: ReplyPredicate,
    next: CommandFlow,
    done: Option<Completion>,
}

impl PendingReply {
    /// Whoever was waiting for the chain has given up on it.
    fn abandoned(&self) -> bool {
        self.done.as_ref().is_some_and(|tx| tx.is_closed())
    }
}

/// A continuation released by a matching packet.
pub struct Continuation {
    pub next: CommandFlow,
    pub done: Option<Completion>,
}

/// Continuations waiting for a matching packet, in registration order.
///
/// Matching and removal happen under one lock, so a packet fires at most one
/// continuation and a continuation fires at most once. Entries whose
/// completion receiver has been dropped are pruned and never fire.
#[derive(Default)]
pub struct PendingReplies {
    next_id: AtomicU64,
    entries: Mutex<Vec<PendingReply>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<PendingReply>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a continuation. The returned id withdraws it via [`remove`](Self::remove).
    pub fn insert(
        &self,
        predicate: ReplyPredicate,
        next: CommandFlow,
        done: Option<Completion>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push(PendingReply {
            id,
            predicate,
            next,
            done,
        });
        id
    }

    /// Withdraw a registration. Returns `None` when it already fired.
    pub fn remove(&self, id: u64) -> Option<Continuation> {
        let mut entries = self.entries();
        let pos = entries.iter().position(|e| e.id == id)?;
        let entry = entries.remove(pos);
        Some(Continuation {
            next: entry.next,
            done: entry.done,
        })
    }

    /// Remove and return the first continuation whose predicate accepts `packet`.
    pub fn take_match(&self, packet: &Packet) -> Option<Continuation> {
        let mut entries = self.entries();
        entries.retain(|e| !e.abandoned());
        let pos = entries.iter().position(|e| (e.predicate)(packet))?;
        let entry = entries.remove(pos);
        Some(Continuation {
            next: entry.next,
            done: entry.done,
        })
    }

    pub fn len(&self) -> usize {
        let mut entries = self.entries();
        entries.retain(|e| !e.abandoned());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}
