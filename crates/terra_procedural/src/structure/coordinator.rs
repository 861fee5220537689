//! # Placement Coordinator
//!
//! The region ledger shared by every generating thread.
//!
//! ## Protocol
//!
//! 1. Look up (or create) the region's slot. The ledger lock is held only
//!    for this lookup.
//! 2. Lock the slot with a timeout. The first thread to get it finds the
//!    slot empty, plans the region and commits the plan while still holding
//!    the lock (reserve/commit).
//! 3. Every later thread finds the committed plan and shares it.
//!
//! Plans are a pure function of (seed, region, config), so the ledger is a
//! cache: dropping a plan with [`PlacementCoordinator::forget_outside`] and
//! planning it again later yields the same plan.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::placement::RegionPlan;
use crate::chunk::{ChunkCoord, CHUNK_SIZE};
use crate::error::CoordinatorError;
use crate::noise::WorldSeed;

/// Default time a thread waits for a region another thread is planning.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinate of a placement region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCoord {
    /// X coordinate (in regions).
    pub x: i32,
    /// Z coordinate (in regions).
    pub z: i32,
}

impl RegionCoord {
    /// Creates a region coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Region containing a block column.
    #[inline]
    #[must_use]
    pub const fn containing(block_x: i32, block_z: i32, region_size: i32) -> Self {
        Self {
            x: block_x.div_euclid(region_size),
            z: block_z.div_euclid(region_size),
        }
    }

    /// World coordinates of the region's corner.
    #[inline]
    #[must_use]
    pub const fn min_block(self, region_size: i32) -> (i32, i32) {
        (self.x * region_size, self.z * region_size)
    }

    /// Regions whose area overlaps a chunk, in x-major order.
    #[must_use]
    pub fn overlapping(chunk: ChunkCoord, region_size: i32) -> Vec<Self> {
        let last = CHUNK_SIZE as i32 - 1;
        let lo = Self::containing(chunk.world_x(), chunk.world_z(), region_size);
        let hi = Self::containing(chunk.world_x() + last, chunk.world_z() + last, region_size);
        (lo.x..=hi.x)
            .flat_map(|x| (lo.z..=hi.z).map(move |z| Self::new(x, z)))
            .collect()
    }
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// One ledger entry; `None` until the region is committed.
#[derive(Default)]
struct RegionSlot {
    plan: Mutex<Option<Arc<RegionPlan>>>,
}

/// Counters for the ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Regions planned (reserve + commit).
    pub planned: u64,
    /// Lookups served from a committed plan.
    pub reused: u64,
    /// Lock acquisitions that timed out.
    pub contended: u64,
    /// Regions currently held.
    pub resident: usize,
}

/// Region-scoped reserve/commit ledger for structure plans.
pub struct PlacementCoordinator {
    region_size: i32,
    lock_timeout: Duration,
    ledger: Mutex<HashMap<(WorldSeed, RegionCoord), Arc<RegionSlot>>>,
    planned: AtomicU64,
    reused: AtomicU64,
    contended: AtomicU64,
}

impl PlacementCoordinator {
    /// Creates an empty ledger for regions of `region_size` blocks.
    #[must_use]
    pub fn new(region_size: i32) -> Self {
        Self {
            region_size,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            ledger: Mutex::new(HashMap::new()),
            planned: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        }
    }

    /// Sets how long a thread waits for a region being planned elsewhere.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Region edge length in blocks.
    #[must_use]
    pub const fn region_size(&self) -> i32 {
        self.region_size
    }

    fn slot(&self, seed: WorldSeed, region: RegionCoord) -> Arc<RegionSlot> {
        let mut ledger = self.ledger.lock();
        Arc::clone(ledger.entry((seed, region)).or_default())
    }

    /// Returns the committed plan of a region, planning it first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Contended`] if the region lock could not
    /// be taken within the timeout.
    pub fn plan(
        &self,
        seed: WorldSeed,
        region: RegionCoord,
        planner: impl FnOnce() -> RegionPlan,
    ) -> Result<Arc<RegionPlan>, CoordinatorError> {
        let slot = self.slot(seed, region);

        let Some(mut committed) = slot.plan.try_lock_for(self.lock_timeout) else {
            self.contended.fetch_add(1, Ordering::Relaxed);
            return Err(CoordinatorError::Contended { region });
        };

        if let Some(plan) = committed.as_ref() {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(plan));
        }

        // Reserved: no other thread can plan this region until we commit.
        let plan = Arc::new(planner());
        *committed = Some(Arc::clone(&plan));
        self.planned.fetch_add(1, Ordering::Relaxed);
        Ok(plan)
    }

    /// [`PlacementCoordinator::plan`] with one retry on contention.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Contended`] if both attempts time out.
    pub fn plan_with_retry(
        &self,
        seed: WorldSeed,
        region: RegionCoord,
        planner: impl Fn() -> RegionPlan,
    ) -> Result<Arc<RegionPlan>, CoordinatorError> {
        match self.plan(seed, region, &planner) {
            Err(CoordinatorError::Contended { .. }) => {
                tracing::debug!(%region, "Region contended, retrying");
                self.plan(seed, region, &planner)
            }
            result => result,
        }
    }

    /// Drops every plan whose region lies farther than `radius` chunks from
    /// `center`. Returns the number of plans dropped.
    pub fn forget_outside(&self, center: ChunkCoord, radius: u32) -> usize {
        let region_size = self.region_size;
        let mut ledger = self.ledger.lock();
        let before = ledger.len();
        ledger.retain(|(_, region), _| {
            let (bx, bz) = region.min_block(region_size);
            // Keep the region if any of its chunks is within range.
            let lo = ChunkCoord::from_block_pos(bx, bz);
            let hi = ChunkCoord::from_block_pos(bx + region_size - 1, bz + region_size - 1);
            let nearest = ChunkCoord::new(center.x.clamp(lo.x, hi.x), center.z.clamp(lo.z, hi.z));
            nearest.distance(center) <= radius
        });
        before - ledger.len()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            planned: self.planned.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            resident: self.ledger.lock().len(),
        }
    }
}

impl fmt::Debug for PlacementCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlacementCoordinator")
            .field("region_size", &self.region_size)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_overlapping_regions() {
        assert_eq!(
            RegionCoord::overlapping(ChunkCoord::new(0, 0), 64),
            vec![RegionCoord::new(0, 0)]
        );
        assert_eq!(
            RegionCoord::overlapping(ChunkCoord::new(-1, 3), 64),
            vec![RegionCoord::new(-1, 0)]
        );
        // 40-block regions do not align with chunks.
        assert_eq!(
            RegionCoord::overlapping(ChunkCoord::new(2, 0), 40),
            vec![RegionCoord::new(0, 0), RegionCoord::new(1, 0)]
        );
    }

    #[test]
    fn test_region_planned_exactly_once_under_contention() {
        let coordinator = Arc::new(PlacementCoordinator::new(64));
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    coordinator
                        .plan(WorldSeed::new(1), RegionCoord::new(0, 0), || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            RegionPlan::default()
                        })
                        .unwrap()
                })
            })
            .collect();

        let plans: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(plans.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));

        let stats = coordinator.stats();
        assert_eq!(stats.planned, 1);
        assert_eq!(stats.reused, 7);
    }

    #[test]
    fn test_contention_times_out() {
        let coordinator = Arc::new(
            PlacementCoordinator::new(64).with_lock_timeout(Duration::from_millis(5)),
        );
        let started = Arc::new(Barrier::new(2));

        let planner = {
            let coordinator = Arc::clone(&coordinator);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                coordinator.plan(WorldSeed::new(1), RegionCoord::new(0, 0), || {
                    started.wait();
                    thread::sleep(Duration::from_millis(200));
                    RegionPlan::default()
                })
            })
        };

        started.wait();
        let result =
            coordinator.plan_with_retry(WorldSeed::new(1), RegionCoord::new(0, 0), RegionPlan::default);
        assert_eq!(
            result.unwrap_err(),
            CoordinatorError::Contended {
                region: RegionCoord::new(0, 0)
            }
        );
        assert!(planner.join().unwrap().is_ok());
        assert_eq!(coordinator.stats().contended, 2);
    }

    #[test]
    fn test_forget_outside() {
        let coordinator = PlacementCoordinator::new(64);
        for x in -4..4 {
            coordinator
                .plan(WorldSeed::new(1), RegionCoord::new(x, 0), RegionPlan::default)
                .unwrap();
        }
        // Regions 0 and -1 touch chunk (0, 0); region 1 starts at chunk 4.
        let dropped = coordinator.forget_outside(ChunkCoord::new(0, 0), 4);
        assert_eq!(dropped, 5);
        assert_eq!(coordinator.stats().resident, 3);
    }
}
