//! # Structure Placement
//!
//! Candidate generation and site validation.
//!
//! ## Regions
//!
//! Candidates of a placement region are confined to that region: their
//! footprint plus half their spacing fits inside it. A region's plan is
//! therefore a pure function of (seed, region, config) and never depends
//! on a neighbour, which is what lets every chunk a structure spans agree
//! on it without talking to each other.

use std::fmt;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::coordinator::RegionCoord;
use super::schematic::Schematic;
use crate::chunk::{BiomeId, Chunk, MaterialId, CHUNK_HEIGHT, CHUNK_SIZE};
use crate::noise::WorldSeed;

/// A world block position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
    /// Z coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Creates a position.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Axis-aligned box, `min` inclusive, `max` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Bounds {
    /// Lowest corner (inclusive).
    pub min: BlockPos,
    /// Highest corner (exclusive).
    pub max: BlockPos,
}

impl Bounds {
    /// Returns true if the boxes share at least one block.
    #[inline]
    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
            && self.min.z < other.max.z
            && other.min.z < self.max.z
    }

    /// Returns true if the box overlaps the chunk's columns.
    #[inline]
    #[must_use]
    pub fn touches_chunk(&self, chunk_x: i32, chunk_z: i32) -> bool {
        let wx = chunk_x * CHUNK_SIZE as i32;
        let wz = chunk_z * CHUNK_SIZE as i32;
        self.min.x < wx + CHUNK_SIZE as i32
            && wx < self.max.x
            && self.min.z < wz + CHUNK_SIZE as i32
            && wz < self.max.z
    }
}

/// Where a structure may stand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnRequirement {
    /// Above sea level, in open space, on solid ground.
    #[default]
    Land,
    /// At or below sea level, in open space (fluid).
    Ocean,
    /// Above sea level, with open space below.
    Air,
}

impl SpawnRequirement {
    /// Checks the requirement at a site.
    #[must_use]
    pub fn matches(self, view: &dyn TerrainView, x: i32, y: i32, z: i32) -> bool {
        if view.is_solid(x, y, z) {
            return false;
        }
        let above_sea = y > view.sea_level();
        match self {
            Self::Land => above_sea && view.is_solid(x, y - 1, z),
            Self::Ocean => !above_sea,
            Self::Air => above_sea && !view.is_solid(x, y - 1, z),
        }
    }
}

impl fmt::Display for SpawnRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Land => "land",
            Self::Ocean => "ocean",
            Self::Air => "air",
        })
    }
}

/// How the vertical position of a candidate is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SearchMode {
    /// One block above the highest solid block.
    #[default]
    Surface,
    /// A fixed height.
    Fixed {
        /// Origin height.
        y: i32,
    },
    /// The highest height in `[min, max]` meeting the spawn requirement.
    Scan {
        /// Lowest height tried.
        min: i32,
        /// Highest height tried.
        max: i32,
    },
}

/// A compiled structure rule.
#[derive(Clone, Debug)]
pub struct StructureRule {
    /// Rule name, reported in placement records.
    pub name: String,
    /// The pattern placed.
    pub schematic: Arc<Schematic>,
    /// Schematic palette index -> config material.
    pub materials: Vec<MaterialId>,
    /// Probability of each attempt producing a candidate.
    pub chance: f64,
    /// Candidates tried per region.
    pub attempts: u32,
    /// Allowed biomes; empty allows all.
    pub biomes: Vec<BiomeId>,
    /// Site requirement.
    pub spawn: SpawnRequirement,
    /// Open blocks required above the origin.
    pub clearance: u32,
    /// Minimum horizontal distance between two structures of this rule.
    pub spacing: u32,
    /// Vertical search.
    pub search: SearchMode,
    /// Mixed into the world seed for this rule's candidates.
    pub salt: u64,
}

impl StructureRule {
    /// Inclusive origin ranges `(x, z)` relative to a region's corner, or
    /// `None` if the footprint plus spacing margin does not fit.
    #[must_use]
    pub fn origin_range(&self, region_size: i32) -> Option<((i32, i32), (i32, i32))> {
        let size = self.schematic.size();
        let anchor = self.schematic.anchor();
        let margin = (self.spacing as i32 + 1) / 2;
        let axis = |extent: usize, anchor: i32| {
            let lo = margin + anchor;
            let hi = region_size - margin - (extent as i32 - anchor);
            (lo <= hi).then_some((lo, hi))
        };
        Some((axis(size[0], anchor[0])?, axis(size[2], anchor[2])?))
    }

    /// Bounds of the schematic placed with its anchor at `origin`.
    #[must_use]
    pub fn bounds_at(&self, origin: BlockPos) -> Bounds {
        let size = self.schematic.size();
        let anchor = self.schematic.anchor();
        let min = BlockPos::new(origin.x - anchor[0], origin.y - anchor[1], origin.z - anchor[2]);
        Bounds {
            min,
            max: BlockPos::new(
                min.x + size[0] as i32,
                min.y + size[1] as i32,
                min.z + size[2] as i32,
            ),
        }
    }
}

/// Terrain queries needed to validate a site.
///
/// Implemented over the pure field functions, so sites are checked
/// without generating neighbouring chunks.
pub trait TerrainView {
    /// Highest solid block of a column, `None` if the column is empty.
    fn height_at(&self, x: i32, z: i32) -> Option<i32>;
    /// Biome of a column.
    fn biome_at(&self, x: i32, z: i32) -> BiomeId;
    /// Whether the terrain fields make a block solid.
    fn is_solid(&self, x: i32, y: i32, z: i32) -> bool;
    /// Sea level.
    fn sea_level(&self) -> i32;
}

/// A proposed structure origin column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Rule index.
    pub rule: usize,
    /// Attempt number within the region.
    pub attempt: u32,
    /// Origin X.
    pub x: i32,
    /// Origin Z.
    pub z: i32,
}

/// A committed structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Rule index.
    pub rule: usize,
    /// Anchor position.
    pub origin: BlockPos,
    /// Blocks the schematic may write.
    pub bounds: Bounds,
}

/// Why a candidate was not placed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rejection {
    /// The column's biome is not allowed.
    BiomeMismatch,
    /// Solid terrain above the origin.
    InsufficientClearance,
    /// Intersects an already placed structure.
    Overlap,
    /// Closer to a structure of the same rule than its spacing.
    TooClose {
        /// Horizontal distance to the nearest one.
        distance: f64,
        /// Required spacing.
        required: f64,
    },
    /// The site does not meet the spawn requirement.
    SpawnRequirement(SpawnRequirement),
    /// The vertical search found no site.
    NoSiteFound,
    /// The schematic would leave the world vertically.
    OutOfBounds,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BiomeMismatch => f.write_str("biome mismatch"),
            Self::InsufficientClearance => f.write_str("insufficient clearance"),
            Self::Overlap => f.write_str("overlaps another structure"),
            Self::TooClose { distance, required } => {
                write!(f, "too close: {distance:.1} < {required:.1}")
            }
            Self::SpawnRequirement(requirement) => write!(f, "not a {requirement} site"),
            Self::NoSiteFound => f.write_str("no site found"),
            Self::OutOfBounds => f.write_str("out of world bounds"),
        }
    }
}

/// Result of [`try_place`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlacementOutcome {
    /// The candidate was placed.
    Placed(Placement),
    /// The candidate was rejected.
    Rejected(Rejection),
}

/// One decided candidate, as reported to the host.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacementRecord {
    /// Rule name.
    pub rule: String,
    /// Candidate origin; `y` is 0 when no site was found.
    pub origin: BlockPos,
    /// Decision.
    pub outcome: PlacementOutcome,
}

/// Validates one candidate against terrain and already placed structures.
///
/// Checks run in a fixed order: biome, vertical site, world bounds, spawn
/// requirement, clearance, overlap, spacing.
#[must_use]
pub fn try_place(
    rule: &StructureRule,
    schematic: &Schematic,
    candidate: &Candidate,
    view: &dyn TerrainView,
    placed: &[Placement],
) -> PlacementOutcome {
    use PlacementOutcome::Rejected;

    let (x, z) = (candidate.x, candidate.z);

    if !rule.biomes.is_empty() && !rule.biomes.contains(&view.biome_at(x, z)) {
        return Rejected(Rejection::BiomeMismatch);
    }

    let y = match rule.search {
        SearchMode::Surface => match view.height_at(x, z) {
            Some(top) => top + 1,
            None => return Rejected(Rejection::NoSiteFound),
        },
        SearchMode::Fixed { y } => y,
        SearchMode::Scan { min, max } => {
            match (min..=max).rev().find(|&y| rule.spawn.matches(view, x, y, z)) {
                Some(y) => y,
                None => return Rejected(Rejection::NoSiteFound),
            }
        }
    };

    let origin = BlockPos::new(x, y, z);
    let size = schematic.size();
    let anchor = schematic.anchor();
    let min_y = y - anchor[1];
    if min_y < 0 || min_y + size[1] as i32 > CHUNK_HEIGHT as i32 {
        return Rejected(Rejection::OutOfBounds);
    }

    if !rule.spawn.matches(view, x, y, z) {
        return Rejected(Rejection::SpawnRequirement(rule.spawn));
    }

    let bounds = rule.bounds_at(origin);
    if rule.clearance > 0 {
        let columns = [
            (x, z),
            (bounds.min.x, bounds.min.z),
            (bounds.max.x - 1, bounds.min.z),
            (bounds.min.x, bounds.max.z - 1),
            (bounds.max.x - 1, bounds.max.z - 1),
        ];
        let top = (y + rule.clearance as i32).min(CHUNK_HEIGHT as i32);
        let blocked = columns
            .iter()
            .any(|&(cx, cz)| (y..top).any(|cy| view.is_solid(cx, cy, cz)));
        if blocked {
            return Rejected(Rejection::InsufficientClearance);
        }
    }

    if placed.iter().any(|other| other.bounds.intersects(&bounds)) {
        return Rejected(Rejection::Overlap);
    }

    if rule.spacing > 0 {
        let required = f64::from(rule.spacing);
        let nearest = placed
            .iter()
            .filter(|other| other.rule == candidate.rule)
            .map(|other| {
                f64::from(other.origin.x - x).hypot(f64::from(other.origin.z - z))
            })
            .fold(f64::INFINITY, f64::min);
        if nearest < required {
            return Rejected(Rejection::TooClose {
                distance: nearest,
                required,
            });
        }
    }

    PlacementOutcome::Placed(Placement {
        rule: candidate.rule,
        origin,
        bounds,
    })
}

/// Candidates of one rule in one region, in attempt order.
#[must_use]
pub fn region_candidates(
    rule_index: usize,
    rule: &StructureRule,
    region: RegionCoord,
    region_size: i32,
    seed: WorldSeed,
) -> Vec<Candidate> {
    let Some(((lo_x, hi_x), (lo_z, hi_z))) = rule.origin_range(region_size) else {
        return Vec::new();
    };
    let base = region.min_block(region_size);
    let stream = seed
        .derive(rule.salt)
        .derive_pos(i64::from(region.x), i64::from(region.z));

    (0..rule.attempts)
        .filter_map(|attempt| {
            let mut rng = ChaCha8Rng::seed_from_u64(stream.derive(u64::from(attempt)).value());
            if rng.gen::<f64>() >= rule.chance {
                return None;
            }
            Some(Candidate {
                rule: rule_index,
                attempt,
                x: base.0 + rng.gen_range(lo_x..=hi_x),
                z: base.1 + rng.gen_range(lo_z..=hi_z),
            })
        })
        .collect()
}

/// The decided structures of one region.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionPlan {
    /// Committed structures, in decision order.
    pub placements: Vec<Placement>,
    /// Every candidate with its outcome.
    pub records: Vec<PlacementRecord>,
}

/// Decides every candidate of a region in rule order, then attempt order.
#[must_use]
pub fn plan_region(
    rules: &[StructureRule],
    region: RegionCoord,
    region_size: i32,
    seed: WorldSeed,
    view: &dyn TerrainView,
) -> RegionPlan {
    let mut plan = RegionPlan::default();

    for (index, rule) in rules.iter().enumerate() {
        for candidate in region_candidates(index, rule, region, region_size, seed) {
            let outcome = try_place(rule, &rule.schematic, &candidate, view, &plan.placements);
            let origin = match outcome {
                PlacementOutcome::Placed(placement) => {
                    plan.placements.push(placement);
                    placement.origin
                }
                PlacementOutcome::Rejected(_) => BlockPos::new(candidate.x, 0, candidate.z),
            };
            plan.records.push(PlacementRecord {
                rule: rule.name.clone(),
                origin,
                outcome,
            });
        }
    }

    plan
}

/// Writes the slice of a placed structure that falls inside `chunk`.
///
/// Returns the number of blocks written.
pub fn stamp(chunk: &mut Chunk, rule: &StructureRule, placement: &Placement) -> u32 {
    let coord = chunk.coord();
    let (wx, wz) = (coord.world_x(), coord.world_z());
    let bounds = placement.bounds;

    let x0 = bounds.min.x.max(wx);
    let x1 = bounds.max.x.min(wx + CHUNK_SIZE as i32);
    let z0 = bounds.min.z.max(wz);
    let z1 = bounds.max.z.min(wz + CHUNK_SIZE as i32);

    let mut written = 0;
    for world_z in z0..z1 {
        for world_x in x0..x1 {
            for world_y in bounds.min.y.max(0)..bounds.max.y.min(CHUNK_HEIGHT as i32) {
                let cell = rule.schematic.get(
                    (world_x - bounds.min.x) as usize,
                    (world_y - bounds.min.y) as usize,
                    (world_z - bounds.min.z) as usize,
                );
                let Some(material) = cell.and_then(|i| rule.materials.get(usize::from(i))) else {
                    continue;
                };
                chunk.set(
                    (world_x - wx) as usize,
                    world_y as usize,
                    (world_z - wz) as usize,
                    *material,
                );
                written += 1;
            }
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkCoord;

    /// Flat ground at `ground`, sea at 10, biome 1 for x >= 0.
    struct FlatView {
        ground: i32,
    }

    impl TerrainView for FlatView {
        fn height_at(&self, _x: i32, _z: i32) -> Option<i32> {
            Some(self.ground)
        }
        fn biome_at(&self, x: i32, _z: i32) -> BiomeId {
            BiomeId(u8::from(x >= 0))
        }
        fn is_solid(&self, _x: i32, y: i32, _z: i32) -> bool {
            y <= self.ground
        }
        fn sea_level(&self) -> i32 {
            10
        }
    }

    fn cube(name: &str, side: usize) -> Arc<Schematic> {
        Arc::new(
            Schematic::new(
                name,
                [side, side, side],
                [0, 0, 0],
                vec!["planks".into()],
                vec![Some(0); side * side * side],
            )
            .unwrap(),
        )
    }

    fn rule(schematic: Arc<Schematic>) -> StructureRule {
        StructureRule {
            name: "hut".into(),
            schematic,
            materials: vec![MaterialId(3)],
            chance: 1.0,
            attempts: 4,
            biomes: Vec::new(),
            spawn: SpawnRequirement::Land,
            clearance: 0,
            spacing: 0,
            search: SearchMode::Surface,
            salt: 1,
        }
    }

    fn candidate(x: i32, z: i32) -> Candidate {
        Candidate {
            rule: 0,
            attempt: 0,
            x,
            z,
        }
    }

    fn place(rule: &StructureRule, view: &FlatView, x: i32, z: i32, placed: &[Placement]) -> PlacementOutcome {
        try_place(rule, &rule.schematic, &candidate(x, z), view, placed)
    }

    #[test]
    fn test_places_on_surface() {
        let rule = rule(cube("hut", 3));
        let outcome = place(&rule, &FlatView { ground: 20 }, 5, 5, &[]);
        let PlacementOutcome::Placed(placement) = outcome else {
            panic!("expected placement, got {outcome:?}");
        };
        assert_eq!(placement.origin, BlockPos::new(5, 21, 5));
        assert_eq!(placement.bounds.max, BlockPos::new(8, 24, 8));
    }

    #[test]
    fn test_rejections() {
        let view = FlatView { ground: 20 };
        let mut hut = rule(cube("hut", 3));

        hut.biomes = vec![BiomeId(1)];
        assert_eq!(
            place(&hut, &view, -5, 0, &[]),
            PlacementOutcome::Rejected(Rejection::BiomeMismatch)
        );
        hut.biomes.clear();

        let ocean = FlatView { ground: 4 };
        assert_eq!(
            place(&hut, &ocean, 0, 0, &[]),
            PlacementOutcome::Rejected(Rejection::SpawnRequirement(SpawnRequirement::Land))
        );

        let sky = FlatView { ground: 254 };
        assert_eq!(
            place(&hut, &sky, 0, 0, &[]),
            PlacementOutcome::Rejected(Rejection::OutOfBounds)
        );

        hut.search = SearchMode::Fixed { y: 15 };
        hut.clearance = 2;
        hut.spawn = SpawnRequirement::Air;
        assert_eq!(
            place(&hut, &view, 0, 0, &[]),
            PlacementOutcome::Rejected(Rejection::SpawnRequirement(SpawnRequirement::Air))
        );
        hut.spawn = SpawnRequirement::Land;
        hut.search = SearchMode::Scan { min: 0, max: 19 };
        assert_eq!(
            place(&hut, &view, 0, 0, &[]),
            PlacementOutcome::Rejected(Rejection::NoSiteFound)
        );
    }

    #[test]
    fn test_overlap_and_spacing() {
        let view = FlatView { ground: 20 };
        let mut hut = rule(cube("hut", 3));
        let PlacementOutcome::Placed(first) = place(&hut, &view, 0, 0, &[]) else {
            panic!("first placement failed");
        };

        assert_eq!(
            place(&hut, &view, 2, 2, &[first]),
            PlacementOutcome::Rejected(Rejection::Overlap)
        );

        hut.spacing = 10;
        assert!(matches!(
            place(&hut, &view, 6, 0, &[first]),
            PlacementOutcome::Rejected(Rejection::TooClose { required, .. }) if required == 10.0
        ));
        assert!(matches!(
            place(&hut, &view, 12, 0, &[first]),
            PlacementOutcome::Placed(_)
        ));
    }

    #[test]
    fn test_candidates_stay_inside_region() {
        let mut hut = rule(cube("hut", 5));
        hut.spacing = 8;
        hut.attempts = 64;
        let region = RegionCoord::new(-3, 2);
        let (bx, bz) = region.min_block(64);

        let candidates = region_candidates(0, &hut, region, 64, WorldSeed::new(99));
        assert_eq!(candidates.len(), 64);
        for c in candidates {
            assert!(c.x - 4 >= bx && c.x + 5 + 4 <= bx + 64, "{c:?}");
            assert!(c.z - 4 >= bz && c.z + 5 + 4 <= bz + 64, "{c:?}");
        }
    }

    #[test]
    fn test_oversized_rule_has_no_candidates() {
        let mut hut = rule(cube("hut", 30));
        hut.spacing = 40;
        assert_eq!(hut.origin_range(64), None);
        assert!(region_candidates(0, &hut, RegionCoord::new(0, 0), 64, WorldSeed::new(1)).is_empty());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let rules = vec![rule(cube("hut", 3))];
        let view = FlatView { ground: 30 };
        let a = plan_region(&rules, RegionCoord::new(1, 1), 64, WorldSeed::new(5), &view);
        let b = plan_region(&rules, RegionCoord::new(1, 1), 64, WorldSeed::new(5), &view);
        assert_eq!(a, b);
        assert_eq!(a.records.len(), 4);
        assert!(!a.placements.is_empty());
    }

    #[test]
    fn test_stamp_clips_to_chunk() {
        let rule = rule(cube("hut", 4));
        let placement = Placement {
            rule: 0,
            origin: BlockPos::new(14, 40, 0),
            bounds: rule.bounds_at(BlockPos::new(14, 40, 0)),
        };

        let mut left = Chunk::new(ChunkCoord::new(0, 0));
        let mut right = Chunk::new(ChunkCoord::new(1, 0));
        let written = stamp(&mut left, &rule, &placement) + stamp(&mut right, &rule, &placement);

        assert_eq!(written, 64);
        assert_eq!(left.get(15, 40, 0), MaterialId(3));
        assert_eq!(right.get(1, 43, 3), MaterialId(3));
        assert_eq!(right.get(2, 40, 0), MaterialId::AIR);
    }
}
