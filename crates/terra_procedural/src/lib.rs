//! # TERRA Procedural Generation
//!
//! Turns a declarative world configuration into 16x256x16 chunks.
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: a chunk is a pure function of (seed, coordinate, config)
//! 2. **Order independent**: chunks may be generated in any order, on any thread
//! 3. **Never abort**: a failing expression falls back to a configured value
//!    and is reported, the chunk is still produced
//! 4. **Exactly once**: a structure that straddles chunks is placed by one
//!    region plan and stamped into every chunk it touches
//!
//! ## Pipeline
//!
//! ```text
//! Requested -> FieldsEvaluated -> PaletteApplied -> StructuresAttempted -> Finalized
//! ```
//!
//! ## Core Components
//!
//! - [`GenerationConfig`]: the TOML document
//! - [`CompiledConfig`]: validated config with compiled expressions
//! - [`Generator`]: produces chunks and their [`GenerationReport`]
//! - [`PlacementCoordinator`]: shared ledger of region structure plans
//! - [`ChunkCache`]: compressed cache of finished chunks
//!
//! ## Example
//!
//! ```
//! use terra_procedural::{generate, ChunkCoord, CompiledConfig, SchematicLibrary, WorldSeed};
//!
//! let text = r#"
//! version = 1
//! name = "flat"
//!
//! [fields]
//! height = "64"
//!
//! [[palette]]
//! material = "stone"
//! "#;
//! let config = CompiledConfig::from_toml_str(text, &SchematicLibrary::new()).unwrap();
//! let generated = generate(ChunkCoord::new(0, 0), &config, WorldSeed::new(7)).unwrap();
//! assert_eq!(generated.chunk.height(0, 0), Some(63));
//! assert!(generated.report.is_clean());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod biome;
pub mod carver;
pub mod chunk;
pub mod chunk_cache;
pub mod config;
pub mod error;
pub mod noise;
pub mod ore;
pub mod palette;
pub mod pipeline;
pub mod structure;

pub use biome::{Biome, BiomeChoice, BiomeTable};
pub use carver::Carver;
pub use chunk::{BiomeId, Chunk, ChunkCoord, MaterialId, CHUNK_HEIGHT, CHUNK_SIZE};
pub use chunk_cache::{CacheStats, ChunkCache};
pub use config::{CompiledConfig, GenerationConfig, MaterialTable, CONFIG_VERSION};
pub use error::{
    ChunkDataError, ConfigError, ConfigResult, CoordinatorError, GenerationError,
    GenerationResult, SchematicError,
};
pub use noise::{NoiseKind, NoiseLayer, NoiseSet, SimplexNoise, WorldSeed};
pub use ore::OreVein;
pub use palette::{Palette, PaletteLayer};
pub use pipeline::{
    generate, ChunkStage, ColumnSample, Diagnostic, FallbackCounts, Field, FieldSampler,
    GeneratedChunk, GenerationReport, Generator,
};
pub use structure::{
    PlacementCoordinator, PlacementOutcome, RegionCoord, Schematic, SchematicLibrary,
    StructureRule, TerrainView,
};
