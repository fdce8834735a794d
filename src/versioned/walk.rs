use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};

use super::{Commit, Hash, OptionalCommit, VersionedStore};
use crate::error::{Error, Result};

struct Pending(Commit);

impl Pending {
    fn order_key(&self) -> (i64, Hash) {
        (self.0.meta.timestamp.timestamp_micros(), self.0.hash)
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.order_key() == other.order_key()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

/// Walks every commit reachable from a head, newest first, with ties broken
/// by hash. Each commit is yielded once. Parents that are missing from the
/// store are yielded as ghosts right after the first child naming them.
pub struct CommitWalk<'a> {
    store: &'a dyn VersionedStore,
    queue: BinaryHeap<Pending>,
    seen: HashSet<Hash>,
    ghosts: VecDeque<Hash>,
    error: Option<Error>,
    done: bool,
}

impl<'a> CommitWalk<'a> {
    pub fn new(store: &'a dyn VersionedStore, head: &Commit) -> Self {
        let mut seen = HashSet::new();
        seen.insert(head.hash);
        let mut queue = BinaryHeap::new();
        queue.push(Pending(head.clone()));
        Self {
            store,
            queue,
            seen,
            ghosts: VecDeque::new(),
            error: None,
            done: false,
        }
    }

    fn enqueue_parents(&mut self, commit: &Commit) -> Result<()> {
        for (idx, parent) in commit.parents.iter().enumerate() {
            if !self.seen.insert(*parent) {
                continue;
            }
            match self.store.resolve_parent(commit, idx)? {
                OptionalCommit::Resolved(parent) => self.queue.push(Pending(parent)),
                OptionalCommit::Ghost(hash) => self.ghosts.push_back(hash),
            }
        }
        Ok(())
    }
}

impl Iterator for CommitWalk<'_> {
    type Item = Result<OptionalCommit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(hash) = self.ghosts.pop_front() {
            return Some(Ok(OptionalCommit::Ghost(hash)));
        }
        if let Some(e) = self.error.take() {
            self.done = true;
            return Some(Err(e));
        }

        let Some(Pending(commit)) = self.queue.pop() else {
            self.done = true;
            return None;
        };
        if let Err(e) = self.enqueue_parents(&commit) {
            self.error = Some(e);
        }
        Some(Ok(OptionalCommit::Resolved(commit)))
    }
}
