//! Ordered chunk store with random access
//!
//! Insertion order is playback order. The store only grows until it is
//! closed; closing is one-way and the only way to shrink it is a full
//! [`BufferStore::reset`].
//!
//! A scheduler that runs ahead of the data registers a one-shot wait for the
//! single index it needs next. `append` resolves that wait as soon as the
//! appended chunks cover the index and hands the index back to the caller.

use crate::audio::format::CHUNK_DURATION_MS;
use crate::error::{Error, Result};
use crate::playback::chunk::Chunk;
use std::sync::Arc;
use tracing::{debug, trace};

/// Result of closing the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Closed with `chunk_count` chunks; the last one is the end of stream
    Closed { chunk_count: usize },
    /// Closed before any chunk arrived: the stream is finished with zero data
    Empty,
}

#[derive(Debug, Default)]
pub struct BufferStore {
    chunks: Vec<Arc<Chunk>>,
    closed: bool,
    last_index: Option<usize>,
    waiting_for: Option<usize>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Total duration of what has arrived so far; fixed once closed
    pub fn duration_ms(&self) -> u64 {
        self.chunks.len() as u64 * CHUNK_DURATION_MS
    }

    /// Append chunks in order.
    ///
    /// Returns the index of a pending wait that these chunks satisfied.
    /// Fails without touching the store if it is closed.
    pub fn append(&mut self, chunks: Vec<Chunk>) -> Result<Option<usize>> {
        if self.closed {
            return Err(Error::AudioBufferClosed);
        }
        if chunks.is_empty() {
            return Ok(None);
        }

        for chunk in chunks {
            debug_assert_eq!(chunk.index(), self.chunks.len(), "chunk indices must be contiguous");
            self.chunks.push(Arc::new(chunk));
        }
        trace!("Buffer grew to {} chunks", self.chunks.len());

        match self.waiting_for {
            Some(index) if index < self.chunks.len() => {
                self.waiting_for = None;
                debug!("Growth wait for chunk {} resolved", index);
                Ok(Some(index))
            }
            _ => Ok(None),
        }
    }

    /// Append the final chunk (if any) and close.
    ///
    /// The designated last chunk is the final chunk in the store, whether or
    /// not `last` carried one.
    pub fn close_with_last(&mut self, last: Option<Chunk>) -> Result<(CloseOutcome, Option<usize>)> {
        let resolved = match last {
            Some(chunk) => self.append(vec![chunk])?,
            None => None,
        };
        if self.closed {
            return Err(Error::AudioBufferClosed);
        }

        self.closed = true;
        // Nothing will ever satisfy a wait past the end now
        self.waiting_for = None;

        if self.chunks.is_empty() {
            debug!("Buffer closed with zero chunks");
            return Ok((CloseOutcome::Empty, resolved));
        }

        self.last_index = Some(self.chunks.len() - 1);
        debug!("Buffer closed with {} chunks", self.chunks.len());
        Ok((
            CloseOutcome::Closed {
                chunk_count: self.chunks.len(),
            },
            resolved,
        ))
    }

    pub fn get(&self, index: usize) -> Option<Arc<Chunk>> {
        self.chunks.get(index).cloned()
    }

    /// Whether `index` is the designated last chunk of a closed store
    pub fn is_last(&self, index: usize) -> bool {
        self.last_index == Some(index)
    }

    pub fn last_index(&self) -> Option<usize> {
        self.last_index
    }

    /// Register the one index the scheduler is blocked on.
    ///
    /// Replaces any earlier registration. Ignored once closed, since no
    /// further chunk can arrive.
    pub fn wait_for(&mut self, index: usize) {
        if self.closed {
            return;
        }
        trace!("Waiting for chunk {}", index);
        self.waiting_for = Some(index);
    }

    pub fn pending_wait(&self) -> Option<usize> {
        self.waiting_for
    }

    pub fn cancel_wait(&mut self) {
        self.waiting_for = None;
    }

    /// Drop every chunk, reopen, and deregister any wait
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.closed = false;
        self.last_index = None;
        self.waiting_for = None;
    }
}
