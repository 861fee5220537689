//! # Structures
//!
//! Schematic assets, site validation and the cross-chunk placement
//! protocol.

mod coordinator;
mod placement;
mod schematic;

pub use coordinator::{CoordinatorStats, PlacementCoordinator, RegionCoord, DEFAULT_LOCK_TIMEOUT};
pub use placement::{
    plan_region, region_candidates, stamp, try_place, BlockPos, Bounds, Candidate, Placement,
    PlacementOutcome, PlacementRecord, RegionPlan, Rejection, SearchMode, SpawnRequirement,
    StructureRule, TerrainView,
};
pub use schematic::{Schematic, SchematicLibrary};
