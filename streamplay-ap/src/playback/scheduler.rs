//! Jitter-buffered chunk scheduler
//!
//! Keeps `window` chunks queued on the sink ahead of the one being rendered so
//! that irregular data arrival does not produce audible gaps.
//!
//! Scheduling is a pull loop: every event that can free a slot or make data
//! available (priming, growth of the store, a chunk completion, resume, seek)
//! calls [`JitterScheduler::pump`], which tops the sink back up to `window`
//! chunks in strictly increasing index order. When the next index has not
//! arrived yet, the loop parks on a one-shot wait registered with the store
//! for exactly that index and returns.
//!
//! The reported cursor is the most recently scheduled chunk. After a seek it
//! is the seek target until that chunk has finished rendering.

use crate::error::Result;
use crate::playback::buffer_store::BufferStore;
use crate::playback::sink::{ChunkCompletion, CompletionNotifier, Sink};
use tracing::{debug, trace, warn};

/// What a completion event led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Stale or unexpected event, nothing changed
    Ignored,
    /// Pipeline advanced (or parked waiting for data)
    Advanced,
    /// The designated last chunk finished rendering
    Finished,
}

/// Seek that has not yet been played through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingSeek {
    target: usize,
    /// The target chunk has been handed to the sink since the seek
    scheduled: bool,
}

pub struct JitterScheduler {
    window: usize,
    /// Index handed to the sink on the next free slot
    next: usize,
    last_scheduled: Option<usize>,
    seek: Option<PendingSeek>,
    primed: bool,
    in_flight: usize,
    generation: u64,
    notifier: CompletionNotifier,
}

impl JitterScheduler {
    pub fn new(window: usize, notifier: CompletionNotifier) -> Self {
        Self {
            window: window.max(1),
            next: 0,
            last_scheduled: None,
            seek: None,
            primed: false,
            in_flight: 0,
            generation: 0,
            notifier,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Playback position in chunks: a pending seek target, otherwise the
    /// last scheduled chunk (0 before anything was scheduled).
    pub fn cursor(&self) -> usize {
        match self.seek {
            Some(seek) => seek.target,
            None => self.last_scheduled.unwrap_or(0),
        }
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Chunks scheduled on the sink and not yet completed
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Stream generation stamped on every completion handle
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// React to chunks appended to the store.
    ///
    /// Primes once the store holds more than `window` chunks; afterwards
    /// refills the window (which also serves a resolved growth wait).
    pub fn on_growth(
        &mut self,
        store: &mut BufferStore,
        sink: &mut dyn Sink,
        resolved_wait: Option<usize>,
    ) -> Result<()> {
        if !self.primed {
            if store.len() > self.window {
                self.prime(store, sink)?;
            }
            return Ok(());
        }

        if let Some(index) = resolved_wait {
            debug!("Chunk {} arrived, resuming scheduling", index);
        }
        self.pump(store, sink)
    }

    /// React to the store being closed.
    ///
    /// A stream that never outgrew the window is primed with whatever it has.
    /// Returns true when the designated last chunk has already finished
    /// rendering, i.e. the sink drained everything before the close arrived.
    pub fn on_closed(&mut self, store: &mut BufferStore, sink: &mut dyn Sink) -> Result<bool> {
        if !self.primed {
            if !store.is_empty() {
                self.prime(store, sink)?;
            }
            return Ok(false);
        }
        self.pump(store, sink)?;
        Ok(match self.last_scheduled {
            Some(index) => self.in_flight == 0 && self.ended_at(index, store),
            None => false,
        })
    }

    fn prime(&mut self, store: &mut BufferStore, sink: &mut dyn Sink) -> Result<()> {
        self.primed = true;
        debug!(
            "Priming jitter buffer: window={}, buffered={}, start={}",
            self.window,
            store.len(),
            self.next
        );
        self.pump(store, sink)
    }

    /// Top the sink up to `window` chunks in index order.
    pub fn pump(&mut self, store: &mut BufferStore, sink: &mut dyn Sink) -> Result<()> {
        if !self.primed {
            return Ok(());
        }

        while self.in_flight < self.window {
            let next = self.next;
            match store.get(next) {
                Some(chunk) => {
                    let completion = ChunkCompletion::new(self.generation, next, self.notifier.clone());
                    sink.schedule_chunk(chunk, completion)?;
                    self.last_scheduled = Some(next);
                    self.next = next + 1;
                    self.in_flight += 1;
                    if let Some(seek) = self.seek.as_mut() {
                        if seek.target == next {
                            seek.scheduled = true;
                        }
                    }
                    trace!("Scheduled chunk {} ({} in flight)", next, self.in_flight);
                }
                None => {
                    if !store.is_closed() {
                        store.wait_for(next);
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handle a chunk completion re-dispatched from the sink.
    ///
    /// The caller has already discarded completions arriving after the player
    /// left its active states; this additionally ignores completions from an
    /// earlier generation.
    pub fn on_completion(
        &mut self,
        generation: u64,
        index: usize,
        store: &mut BufferStore,
        sink: &mut dyn Sink,
    ) -> Result<CompletionOutcome> {
        if generation != self.generation {
            debug!(
                "Ignoring stale completion of chunk {} (generation {} != {})",
                index, generation, self.generation
            );
            return Ok(CompletionOutcome::Ignored);
        }
        if self.in_flight == 0 {
            warn!("Completion of chunk {} with nothing in flight", index);
            return Ok(CompletionOutcome::Ignored);
        }
        self.in_flight -= 1;
        trace!("Chunk {} completed ({} in flight)", index, self.in_flight);

        if self.seek.map_or(false, |s| s.scheduled && s.target == index) {
            debug!("Seek target {} rendered", index);
            self.seek = None;
        }

        if self.in_flight == 0 && self.last_scheduled == Some(index) && self.ended_at(index, store) {
            debug!("Last chunk {} completed", index);
            return Ok(CompletionOutcome::Finished);
        }

        self.pump(store, sink)?;
        Ok(CompletionOutcome::Advanced)
    }

    /// Point the scheduler at `target`; in-flight chunks are left to drain.
    ///
    /// The target itself is the next chunk scheduled. Seeking again to a
    /// target that has not finished rendering changes nothing. The caller
    /// validates the range.
    pub fn seek(&mut self, target: usize, store: &mut BufferStore, sink: &mut dyn Sink) -> Result<()> {
        if self.seek.map_or(false, |s| s.target == target) {
            debug!("Seek to chunk {} already pending", target);
            return Ok(());
        }

        debug!(
            "Seek: cursor {} -> {} ({} in flight keep playing)",
            self.cursor(),
            target,
            self.in_flight
        );
        self.seek = Some(PendingSeek {
            target,
            scheduled: false,
        });
        self.next = target;
        store.cancel_wait();
        self.pump(store, sink)
    }

    /// Forget the stream. Completions issued before the reset become stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.next = 0;
        self.last_scheduled = None;
        self.seek = None;
        self.primed = false;
        self.in_flight = 0;
    }

    /// `index` is the designated last chunk and nothing after it is queued up
    fn ended_at(&self, index: usize, store: &BufferStore) -> bool {
        store.is_last(index) && self.next == index + 1
    }
}
