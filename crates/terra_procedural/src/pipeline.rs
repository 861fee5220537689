//! # Generation Pipeline
//!
//! `generate(coord, config, seed)` turns a chunk coordinate into a chunk.
//!
//! ## Stages
//!
//! ```text
//! Requested -> FieldsEvaluated -> PaletteApplied -> StructuresAttempted -> Finalized
//! ```
//!
//! 1. **FieldsEvaluated**: per column, 2D noise, `height` and the biome;
//!    per point, 3D noise and `density` (`height - y` by default).
//! 2. **PaletteApplied**: solid points (`density > 0`) get the biome
//!    palette's material, open points at or below sea level get the fluid.
//!    Carvers and ore veins run afterwards.
//! 3. **StructuresAttempted**: the committed plan of every placement region
//!    overlapping the chunk is stamped.
//!
//! ## Failure Policy
//!
//! A failing evaluation never fails the chunk. The point takes the
//! configured fallback, a per-field counter goes up and the first failure
//! of each field is kept as a [`Diagnostic`]. Only a coordinate outside the
//! supported range is an error.

use std::cell::RefCell;
use std::fmt;

use terra_expr::{EvalError, Evaluator};

use crate::carver::carve;
use crate::chunk::{BiomeId, Chunk, ChunkCoord, CHUNK_HEIGHT, CHUNK_SIZE};
use crate::config::CompiledConfig;
use crate::error::{CoordinatorError, GenerationError, GenerationResult};
use crate::noise::{NoiseSet, WorldSeed};
use crate::ore::place_ores;
use crate::structure::{plan_region, stamp, PlacementRecord, RegionCoord, TerrainView};

/// How far a chunk got.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkStage {
    /// Accepted, nothing evaluated yet.
    Requested,
    /// Height, biome and density known for every point.
    FieldsEvaluated,
    /// Materials written; carvers and ores applied.
    PaletteApplied,
    /// Structure slices stamped.
    StructuresAttempted,
    /// Height map rebuilt; the chunk is complete.
    Finalized,
    /// The request was refused.
    Failed,
}

impl fmt::Display for ChunkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A field whose evaluation can fall back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    /// `fields.height`.
    Height,
    /// `fields.density`.
    Density,
    /// A biome condition.
    Biome,
}

impl Field {
    const ALL: [Self; 3] = [Self::Height, Self::Density, Self::Biome];
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Height => "height",
            Self::Density => "density",
            Self::Biome => "biome",
        })
    }
}

/// Something worth telling the host about a generated chunk.
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// Evaluations of one field fell back.
    Fallback {
        /// Field that failed.
        field: Field,
        /// First error met.
        error: EvalError,
        /// World X of the first failure.
        x: i32,
        /// World Y of the first failure (0 for column fields).
        y: i32,
        /// World Z of the first failure.
        z: i32,
        /// Failures of this field in the chunk.
        count: u32,
    },
    /// A placement region stayed locked by another thread; its structures
    /// are missing from this chunk.
    ConcurrencyConflict {
        /// The skipped region.
        region: RegionCoord,
    },
}

/// Fallback counters per field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FallbackCounts {
    /// Columns whose height fell back.
    pub height: u32,
    /// Points whose density fell back.
    pub density: u32,
    /// Columns with a failing biome condition.
    pub biome: u32,
}

impl FallbackCounts {
    /// Sum over all fields.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.height + self.density + self.biome
    }

    fn get_mut(&mut self, field: Field) -> &mut u32 {
        match field {
            Field::Height => &mut self.height,
            Field::Density => &mut self.density,
            Field::Biome => &mut self.biome,
        }
    }
}

/// What happened while generating one chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationReport {
    /// The chunk.
    pub coord: ChunkCoord,
    /// Stage reached.
    pub stage: ChunkStage,
    /// Fallback counters.
    pub fallbacks: FallbackCounts,
    /// First failures and skipped regions.
    pub diagnostics: Vec<Diagnostic>,
    /// Structure candidates whose origin column is in this chunk.
    pub placements: Vec<PlacementRecord>,
    /// Blocks written by structures.
    pub stamped: u32,
    /// Blocks cleared by carvers.
    pub carved: u32,
    /// Blocks replaced by ore veins.
    pub ore_blocks: u32,
}

impl GenerationReport {
    fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            stage: ChunkStage::Requested,
            fallbacks: FallbackCounts::default(),
            diagnostics: Vec::new(),
            placements: Vec::new(),
            stamped: 0,
            carved: 0,
            ore_blocks: 0,
        }
    }

    /// Returns true if nothing fell back and no region was skipped.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// A generated chunk with its report.
#[derive(Clone, Debug)]
pub struct GeneratedChunk {
    /// The chunk.
    pub chunk: Chunk,
    /// What happened.
    pub report: GenerationReport,
}

/// Fields of one column.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSample {
    /// Surface height (fallback applied).
    pub height: f64,
    /// Selected biome.
    pub biome: BiomeId,
    /// 2D noise values in layer order.
    pub noise: Vec<f64>,
}

#[derive(Default)]
struct Scratch {
    evaluator: Evaluator,
    noise: Vec<f64>,
    slots: Vec<f64>,
}

#[derive(Clone, Default)]
struct Tally {
    count: u32,
    first: Option<(EvalError, [i32; 3])>,
}

/// Per-thread evaluator of the pure field functions.
///
/// Every query recomputes from (seed, config, position); the sampler only
/// holds scratch buffers, a one-column cache and fallback tallies. Not
/// `Sync`: create one per thread.
pub struct FieldSampler<'a> {
    config: &'a CompiledConfig,
    noise: &'a NoiseSet,
    scratch: RefCell<Scratch>,
    last_column: RefCell<Option<(i32, i32, ColumnSample)>>,
    tallies: RefCell<[Tally; 3]>,
}

impl<'a> FieldSampler<'a> {
    /// Creates a sampler over seeded noise.
    #[must_use]
    pub fn new(config: &'a CompiledConfig, noise: &'a NoiseSet) -> Self {
        Self {
            config,
            noise,
            scratch: RefCell::default(),
            last_column: RefCell::new(None),
            tallies: RefCell::default(),
        }
    }

    fn tally(&self, field: Field, error: EvalError, position: [i32; 3]) {
        let mut tallies = self.tallies.borrow_mut();
        let tally = &mut tallies[field as usize];
        tally.count += 1;
        if tally.first.is_none() {
            tally.first = Some((error, position));
        }
    }

    /// Evaluates height and biome of a world column.
    #[must_use]
    pub fn column(&self, x: i32, z: i32) -> ColumnSample {
        if let Some((cx, cz, sample)) = self.last_column.borrow().as_ref() {
            if (*cx, *cz) == (x, z) {
                return sample.clone();
            }
        }

        let config = self.config;
        let (fx, fz) = (f64::from(x), f64::from(z));
        let mut noise = Vec::with_capacity(config.noise_2d);
        self.noise.sample_columns(fx, fz, &mut noise);

        let mut scratch = self.scratch.borrow_mut();
        let Scratch {
            evaluator, slots, ..
        } = &mut *scratch;

        slots.clear();
        slots.extend([fx, fz]);
        slots.extend_from_slice(&noise);
        let height = match config.height.evaluate_with(evaluator, slots) {
            Ok(height) => height,
            Err(e) => {
                self.tally(Field::Height, e, [x, 0, z]);
                config.fallback_height
            }
        };

        slots.clear();
        slots.extend([fx, fz, height]);
        slots.extend_from_slice(&noise);
        let choice = config.biomes.select(evaluator, slots);
        drop(scratch);
        if let Some(e) = choice.error {
            self.tally(Field::Biome, e, [x, 0, z]);
        }

        let sample = ColumnSample {
            height,
            biome: choice.id,
            noise,
        };
        *self.last_column.borrow_mut() = Some((x, z, sample.clone()));
        sample
    }

    /// Evaluates density at a world point of an already sampled column.
    #[must_use]
    pub fn density(&self, column: &ColumnSample, x: i32, y: i32, z: i32) -> f64 {
        let Some(expression) = &self.config.density else {
            return column.height - f64::from(y);
        };

        let (fx, fy, fz) = (f64::from(x), f64::from(y), f64::from(z));
        let mut scratch = self.scratch.borrow_mut();
        let Scratch {
            evaluator,
            noise,
            slots,
        } = &mut *scratch;

        self.noise.sample_points(fx, fy, fz, noise);
        slots.clear();
        slots.extend([fx, fy, fz, column.height]);
        slots.extend_from_slice(&column.noise);
        slots.extend_from_slice(noise);

        match expression.evaluate_with(evaluator, slots) {
            Ok(density) => density,
            Err(e) => {
                drop(scratch);
                self.tally(Field::Density, e, [x, y, z]);
                self.config.fallback_density
            }
        }
    }

    /// Fallback counters so far.
    #[must_use]
    pub fn fallbacks(&self) -> FallbackCounts {
        let tallies = self.tallies.borrow();
        let mut counts = FallbackCounts::default();
        for field in Field::ALL {
            *counts.get_mut(field) = tallies[field as usize].count;
        }
        counts
    }

    /// One diagnostic per field that fell back.
    fn diagnostics(&self) -> Vec<Diagnostic> {
        let tallies = self.tallies.borrow();
        Field::ALL
            .iter()
            .filter_map(|&field| {
                let tally = &tallies[field as usize];
                tally.first.clone().map(|(error, [x, y, z])| Diagnostic::Fallback {
                    field,
                    error,
                    x,
                    y,
                    z,
                    count: tally.count,
                })
            })
            .collect()
    }
}

impl TerrainView for FieldSampler<'_> {
    fn height_at(&self, x: i32, z: i32) -> Option<i32> {
        let column = self.column(x, z);
        let top = CHUNK_HEIGHT as i32 - 1;
        if self.config.density.is_none() {
            // height - y > 0  <=>  y < height
            let highest = column.height.ceil() as i32 - 1;
            return (highest >= 0).then_some(highest.min(top));
        }
        (0..=top).rev().find(|&y| self.density(&column, x, y, z) > 0.0)
    }

    fn biome_at(&self, x: i32, z: i32) -> BiomeId {
        self.column(x, z).biome
    }

    fn is_solid(&self, x: i32, y: i32, z: i32) -> bool {
        if y < 0 {
            return true;
        }
        if y >= CHUNK_HEIGHT as i32 {
            return false;
        }
        let column = self.column(x, z);
        self.density(&column, x, y, z) > 0.0
    }

    fn sea_level(&self) -> i32 {
        self.config.sea_level
    }
}

/// Generates chunks of one (config, seed) pair.
pub struct Generator<'a> {
    config: &'a CompiledConfig,
    seed: WorldSeed,
    noise: NoiseSet,
}

impl<'a> Generator<'a> {
    /// Seeds the noise layers.
    #[must_use]
    pub fn new(config: &'a CompiledConfig, seed: WorldSeed) -> Self {
        Self {
            config,
            seed,
            noise: NoiseSet::new(&config.noise, seed),
        }
    }

    /// A field sampler over this generator's noise.
    #[must_use]
    pub fn sampler(&self) -> FieldSampler<'_> {
        FieldSampler::new(self.config, &self.noise)
    }

    /// Generates one chunk.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::OutOfRange`] for coordinates beyond
    /// [`MAX_CHUNK_COORD`](crate::chunk::MAX_CHUNK_COORD).
    pub fn generate(&self, coord: ChunkCoord) -> GenerationResult<GeneratedChunk> {
        if !coord.is_supported() {
            return Err(GenerationError::OutOfRange { coord });
        }

        let config = self.config;
        let mut report = GenerationReport::new(coord);
        let mut chunk = Chunk::new(coord);
        let sampler = self.sampler();
        let (wx, wz) = (coord.world_x(), coord.world_z());

        // Fields
        let mut densities = vec![0.0; CHUNK_SIZE * CHUNK_SIZE * CHUNK_HEIGHT];
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let (bx, bz) = (wx + x as i32, wz + z as i32);
                let column = sampler.column(bx, bz);
                chunk.set_biome(x, z, column.biome);
                for y in 0..CHUNK_HEIGHT {
                    densities[(y * CHUNK_SIZE + z) * CHUNK_SIZE + x] =
                        sampler.density(&column, bx, y as i32, bz);
                }
            }
        }
        report.stage = ChunkStage::FieldsEvaluated;

        // Palette
        let sea_level = config.sea_level;
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let palette = config.biomes.palette_for(chunk.biome(x, z), &config.palette);
                for y in 0..CHUNK_HEIGHT {
                    let density = densities[(y * CHUNK_SIZE + z) * CHUNK_SIZE + x];
                    if density > 0.0 {
                        chunk.set(x, y, z, palette.material_for(density));
                    } else if y as i32 <= sea_level {
                        chunk.set(x, y, z, config.fluid);
                    }
                }
            }
        }
        drop(densities);

        // Neighbourhood queries get their own tallies; only this chunk's
        // lattice counts towards its report.
        let neighbours = self.sampler();
        report.carved = carve(&mut chunk, &config.carvers, self.seed, &neighbours, config.fluid);
        report.ore_blocks = place_ores(&mut chunk, &config.ores, self.seed, &neighbours);
        report.stage = ChunkStage::PaletteApplied;

        self.attempt_structures(&mut chunk, &mut report);
        report.stage = ChunkStage::StructuresAttempted;

        chunk.recompute_heights();
        report.fallbacks = sampler.fallbacks();
        let mut diagnostics = sampler.diagnostics();
        diagnostics.append(&mut report.diagnostics);
        report.diagnostics = diagnostics;
        for diagnostic in &report.diagnostics {
            if let Diagnostic::Fallback {
                field,
                error,
                x,
                y,
                z,
                count,
            } = diagnostic
            {
                tracing::warn!(
                    "Chunk {}: {} {} evaluation(s) fell back, first at ({}, {}, {}): {}",
                    coord,
                    count,
                    field,
                    x,
                    y,
                    z,
                    error
                );
            }
        }
        report.stage = ChunkStage::Finalized;

        tracing::debug!(
            "Chunk {} finalized: {} carved, {} ore, {} stamped, {} fallbacks",
            coord,
            report.carved,
            report.ore_blocks,
            report.stamped,
            report.fallbacks.total()
        );
        Ok(GeneratedChunk { chunk, report })
    }

    fn attempt_structures(&self, chunk: &mut Chunk, report: &mut GenerationReport) {
        let config = self.config;
        if config.structures.is_empty() {
            return;
        }
        let coord = chunk.coord();
        let coordinator = &config.coordinator;
        let region_size = coordinator.region_size();

        for region in RegionCoord::overlapping(coord, region_size) {
            let planned = coordinator.plan_with_retry(self.seed, region, || {
                plan_region(&config.structures, region, region_size, self.seed, &self.sampler())
            });
            let plan = match planned {
                Ok(plan) => plan,
                Err(CoordinatorError::Contended { region }) => {
                    tracing::warn!("Chunk {}: region {} stayed locked, structures skipped", coord, region);
                    report
                        .diagnostics
                        .push(Diagnostic::ConcurrencyConflict { region });
                    continue;
                }
            };

            report.placements.extend(
                plan.records
                    .iter()
                    .filter(|record| {
                        ChunkCoord::from_block_pos(record.origin.x, record.origin.z) == coord
                    })
                    .cloned(),
            );
            for placement in &plan.placements {
                if placement.bounds.touches_chunk(coord.x, coord.z) {
                    report.stamped += stamp(chunk, &config.structures[placement.rule], placement);
                }
            }
        }
    }
}

/// Generates one chunk.
///
/// A pure function of its arguments: the same (coord, config, seed) always
/// yields the same [`Chunk::as_bytes`], whatever else is being generated.
///
/// # Errors
///
/// Returns [`GenerationError::OutOfRange`] for unsupported coordinates.
pub fn generate(
    coord: ChunkCoord,
    config: &CompiledConfig,
    seed: WorldSeed,
) -> GenerationResult<GeneratedChunk> {
    Generator::new(config, seed).generate(coord)
}
