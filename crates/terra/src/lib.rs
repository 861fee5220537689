//! # TERRA
//!
//! Host-facing side of the generator.
//!
//! ## Design Principles
//!
//! 1. **Resolve once**: every material name becomes a host block at
//!    activation; an unknown material refuses the world
//! 2. **Interfaces, not inheritance**: the host implements [`HostAdapter`]
//!    and [`ChunkSink`], nothing else
//! 3. **Off-thread**: [`ChunkScheduler`] generates on a worker pool and
//!    hands finished chunks back over a channel
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use terra::{BlockGrid, MaterialNames, TerraWorld};
//! use terra_procedural::{ChunkCoord, CompiledConfig, SchematicLibrary};
//!
//! let text = r#"
//! version = 1
//! name = "flat"
//! seed = 3
//! sea_level = 0
//!
//! [fields]
//! height = "10"
//!
//! [[palette]]
//! material = "stone"
//! "#;
//! let config = CompiledConfig::from_toml_str(text, &SchematicLibrary::new()).unwrap();
//! let world = TerraWorld::activate(&MaterialNames, Arc::new(config), None).unwrap();
//!
//! let mut grid = BlockGrid::new();
//! world.generate_into(ChunkCoord::new(0, 0), &mut grid).unwrap();
//! assert_eq!(grid.get(0, 9, 0).map(String::as_str), Some("stone"));
//! assert_eq!(grid.get(0, 10, 0), None);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod host;
pub mod scheduler;
pub mod world;

pub use error::{ActivationError, ActivationResult, SchedulerError};
pub use host::{BlockGrid, ChunkSink, HostAdapter, MaterialNames};
pub use scheduler::{ChunkResult, ChunkScheduler, SchedulerConfig, SchedulerStats};
pub use world::TerraWorld;
