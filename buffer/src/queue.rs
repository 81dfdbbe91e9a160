use crate::{Chain, Error};
use std::collections::VecDeque;
use tracing::trace;

/// Ordered list of chains (for example, a receive queue).
#[derive(Debug, Default)]
pub struct Queue {
    chains: VecDeque<Chain>,
}

impl Queue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued chains.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Returns true if no chain is queued.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Appends `chain` to the back of the queue.
    pub fn add_chain(&mut self, chain: Chain) {
        self.chains.push_back(chain);
        trace!(queued = self.chains.len(), "added chain");
    }

    /// Removes the chain at `index` and releases it.
    ///
    /// Returns [Error::NotQueued] if no chain sits at `index`.
    pub fn del_chain(&mut self, index: usize) -> Result<(), Error> {
        let chain = self.chains.remove(index).ok_or(Error::NotQueued(index))?;
        trace!(index, len = chain.len(), "deleted chain");
        chain.free();
        Ok(())
    }

    /// Removes and returns the chain at the front of the queue.
    pub fn pop_chain(&mut self) -> Option<Chain> {
        self.chains.pop_front()
    }

    /// Index of the first chain matching `predicate`.
    pub fn position(&self, predicate: impl FnMut(&Chain) -> bool) -> Option<usize> {
        self.chains.iter().position(predicate)
    }

    /// Iterates over the queued chains, front to back.
    pub fn iter(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter()
    }
}
