//! # Chunk Scheduler
//!
//! A fixed pool of worker threads fed through a bounded queue.
//!
//! ## Architecture
//!
//! ```text
//!   Host ── request(coord) ──> [Bounded Queue] ──> Worker 1..N ──> [Results] ──> Host
//!              unload(coord) ──> [Pending Map]  <── checked before and after generation
//! ```
//!
//! Every request gets a ticket in the pending map. `unload` removes the
//! ticket: a queued request is then skipped, an in-flight one runs to the
//! end and its result is dropped. A result is delivered only by the worker
//! that removes its own ticket, so a chunk is never delivered twice.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use terra_procedural::{ChunkCoord, GeneratedChunk, GenerationResult};

use crate::error::SchedulerError;
use crate::world::TerraWorld;

/// Scheduler sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Worker threads.
    pub workers: usize,
    /// Requests that may wait in the queue.
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(4, NonZeroUsize::get),
            queue_capacity: 4096,
        }
    }
}

/// A finished request.
#[derive(Debug)]
pub struct ChunkResult {
    /// The requested coordinate.
    pub coord: ChunkCoord,
    /// The chunk, or why it was refused.
    pub outcome: GenerationResult<GeneratedChunk>,
}

/// Scheduler counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Requests accepted.
    pub requested: u64,
    /// Chunks delivered.
    pub generated: u64,
    /// Refused coordinates delivered as errors.
    pub failed: u64,
    /// Requests skipped or dropped after `unload`.
    pub cancelled: u64,
    /// Requests not yet delivered.
    pub pending: usize,
}

#[derive(Default)]
struct Shared {
    /// Coordinate -> ticket of its live request.
    pending: Mutex<HashMap<ChunkCoord, u64>>,
    next_ticket: AtomicU64,
    requested: AtomicU64,
    generated: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl Shared {
    fn is_live(&self, coord: ChunkCoord, ticket: u64) -> bool {
        self.pending.lock().get(&coord) == Some(&ticket)
    }

    /// Removes the ticket if it is still live.
    fn claim(&self, coord: ChunkCoord, ticket: u64) -> bool {
        let mut pending = self.pending.lock();
        if pending.get(&coord) == Some(&ticket) {
            pending.remove(&coord);
            true
        } else {
            false
        }
    }
}

/// Generates chunks of one world on a worker pool.
pub struct ChunkScheduler {
    requests: Option<Sender<(ChunkCoord, u64)>>,
    results: Receiver<ChunkResult>,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ChunkScheduler {
    /// Starts the worker pool.
    ///
    /// # Arguments
    ///
    /// * `world` - The activated world, shared by every worker
    /// * `config` - Pool and queue size; zero values are raised to one
    #[must_use]
    pub fn start<B: Clone + Send + Sync + 'static>(
        world: Arc<TerraWorld<B>>,
        config: SchedulerConfig,
    ) -> Self {
        let (request_tx, request_rx) = bounded(config.queue_capacity.max(1));
        let (result_tx, result_rx) = unbounded();
        let shared = Arc::new(Shared::default());

        let workers = (0..config.workers.max(1))
            .map(|index| {
                let world = Arc::clone(&world);
                let requests = request_rx.clone();
                let results = result_tx.clone();
                let shared = Arc::clone(&shared);
                thread::spawn(move || Self::worker_loop(index, &world, &requests, &results, &shared))
            })
            .collect::<Vec<_>>();

        tracing::debug!("Chunk scheduler started with {} worker(s)", workers.len());
        Self {
            requests: Some(request_tx),
            results: result_rx,
            shared,
            workers,
        }
    }

    fn worker_loop<B: Clone + Send + Sync + 'static>(
        index: usize,
        world: &TerraWorld<B>,
        requests: &Receiver<(ChunkCoord, u64)>,
        results: &Sender<ChunkResult>,
        shared: &Shared,
    ) {
        for (coord, ticket) in requests {
            if !shared.is_live(coord, ticket) {
                shared.cancelled.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let outcome = world.generate(coord);

            if !shared.claim(coord, ticket) {
                shared.cancelled.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Chunk {} unloaded while generating, result dropped", coord);
                continue;
            }
            match &outcome {
                Ok(_) => shared.generated.fetch_add(1, Ordering::Relaxed),
                Err(e) => {
                    tracing::warn!("Chunk {}: {}", coord, e);
                    shared.failed.fetch_add(1, Ordering::Relaxed)
                }
            };
            if results.send(ChunkResult { coord, outcome }).is_err() {
                break;
            }
        }
        tracing::debug!("Chunk worker {} stopped", index);
    }

    /// Queues a chunk.
    ///
    /// Returns `Ok(false)` if the coordinate is already pending.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::QueueFull`] when the queue is at capacity
    /// and [`SchedulerError::ShutDown`] once no worker is left.
    pub fn request(&self, coord: ChunkCoord) -> Result<bool, SchedulerError> {
        let Some(sender) = &self.requests else {
            return Err(SchedulerError::ShutDown);
        };

        let ticket = {
            let mut pending = self.shared.pending.lock();
            if pending.contains_key(&coord) {
                return Ok(false);
            }
            let ticket = self.shared.next_ticket.fetch_add(1, Ordering::Relaxed);
            pending.insert(coord, ticket);
            ticket
        };

        match sender.try_send((coord, ticket)) {
            Ok(()) => {
                self.shared.requested.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Err(e) => {
                self.shared.claim(coord, ticket);
                Err(match e {
                    TrySendError::Full(_) => SchedulerError::QueueFull,
                    TrySendError::Disconnected(_) => SchedulerError::ShutDown,
                })
            }
        }
    }

    /// Cancels a pending request.
    ///
    /// Returns true if the request was pending; its result will not be
    /// delivered.
    pub fn unload(&self, coord: ChunkCoord) -> bool {
        self.shared.pending.lock().remove(&coord).is_some()
    }

    /// The result channel. Clones share one stream.
    #[must_use]
    pub fn results(&self) -> Receiver<ChunkResult> {
        self.results.clone()
    }

    /// Requests not yet delivered or cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            requested: self.shared.requested.load(Ordering::Relaxed),
            generated: self.shared.generated.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            cancelled: self.shared.cancelled.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }

    /// Finishes every queued request, then joins the workers.
    ///
    /// Results stay readable through receivers obtained from
    /// [`ChunkScheduler::results`].
    pub fn shutdown(mut self) -> SchedulerStats {
        self.stop();
        self.stats()
    }

    fn stop(&mut self) {
        // Workers drain the queue and exit once the sender is gone.
        drop(self.requests.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Chunk worker panicked");
            }
        }
    }
}

impl Drop for ChunkScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ChunkScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkScheduler")
            .field("workers", &self.workers.len())
            .field("stats", &self.stats())
            .finish()
    }
}
