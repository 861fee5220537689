//! # Terra World
//!
//! A [`TerraWorld`] binds a compiled config and a seed to the host's
//! blocks. Activation is the only fallible step that touches the host:
//! after it, generation needs nothing but the chunk coordinate.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use terra_procedural::{
    generate, Chunk, ChunkCache, ChunkCoord, CompiledConfig, GeneratedChunk, GenerationConfig,
    GenerationReport, GenerationResult, MaterialId, SchematicLibrary, WorldSeed, CHUNK_HEIGHT,
    CHUNK_SIZE,
};

use crate::error::{ActivationError, ActivationResult};
use crate::host::{ChunkSink, HostAdapter};

/// An activated world.
///
/// `Send + Sync` whenever the block type is; share it as `Arc<TerraWorld<B>>`.
pub struct TerraWorld<B> {
    config: Arc<CompiledConfig>,
    seed: WorldSeed,
    /// Host block per material id; `None` for air.
    blocks: Vec<Option<B>>,
    cache: Option<ChunkCache>,
}

impl<B: Clone + Send + Sync + 'static> TerraWorld<B> {
    /// Resolves every material of `config` through the host.
    ///
    /// # Arguments
    ///
    /// * `adapter` - The host's material resolver
    /// * `config` - Compiled config
    /// * `seed` - World seed; the config's default seed when `None`
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::UnresolvedMaterials`] listing every
    /// material the host cannot provide.
    pub fn activate<H>(
        adapter: &H,
        config: Arc<CompiledConfig>,
        seed: Option<WorldSeed>,
    ) -> ActivationResult<Self>
    where
        H: HostAdapter<Block = B>,
    {
        let mut blocks = Vec::with_capacity(config.materials().len());
        let mut unresolved = Vec::new();
        for (id, name) in config.materials().iter() {
            if id == MaterialId::AIR {
                blocks.push(None);
                continue;
            }
            let block = adapter.resolve_material(name);
            if block.is_none() {
                unresolved.push(name.to_string());
            }
            blocks.push(block);
        }
        if !unresolved.is_empty() {
            tracing::warn!(
                "World {}: host refused {} material(s)",
                config.name(),
                unresolved.len()
            );
            return Err(ActivationError::UnresolvedMaterials { names: unresolved });
        }

        let seed = seed.unwrap_or_else(|| config.seed());
        tracing::info!(
            "World {} activated: seed {}, {} materials, {} biomes, {} structure rules",
            config.name(),
            seed.value(),
            blocks.len(),
            config.biomes().len(),
            config.structure_rules().len()
        );
        Ok(Self {
            config,
            seed,
            blocks,
            cache: None,
        })
    }

    /// Reads a config file and an optional schematic directory, then
    /// activates.
    ///
    /// # Errors
    ///
    /// Returns the first load, compile or resolution failure.
    pub fn load<H>(
        adapter: &H,
        config_path: &Path,
        schematic_dir: Option<&Path>,
        seed: Option<WorldSeed>,
    ) -> ActivationResult<Self>
    where
        H: HostAdapter<Block = B>,
    {
        let library = match schematic_dir {
            Some(dir) => SchematicLibrary::load_dir(dir)?,
            None => SchematicLibrary::new(),
        };
        let document = GenerationConfig::load(config_path)?;
        let config = CompiledConfig::compile(&document, &library)?;
        Self::activate(adapter, Arc::new(config), seed)
    }

    /// Keeps up to `capacity` finished chunks, compressed.
    #[must_use]
    pub fn with_cache(mut self, capacity: usize) -> Self {
        self.cache = Some(ChunkCache::new(capacity));
        self
    }

    /// The compiled config.
    #[must_use]
    pub fn config(&self) -> &Arc<CompiledConfig> {
        &self.config
    }

    /// The world seed.
    #[must_use]
    pub const fn seed(&self) -> WorldSeed {
        self.seed
    }

    /// The chunk cache, if enabled.
    #[must_use]
    pub fn cache(&self) -> Option<&ChunkCache> {
        self.cache.as_ref()
    }

    /// Host block of a material; `None` for air and unknown ids.
    #[must_use]
    pub fn block(&self, material: MaterialId) -> Option<&B> {
        self.blocks.get(material.index()).and_then(Option::as_ref)
    }

    /// Generates a chunk with its report, bypassing the cache lookup.
    ///
    /// The result is stored in the cache when one is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::OutOfRange`](terra_procedural::GenerationError)
    /// for unsupported coordinates.
    pub fn generate(&self, coord: ChunkCoord) -> GenerationResult<GeneratedChunk> {
        let generated = generate(coord, &self.config, self.seed)?;
        if let Some(cache) = &self.cache {
            cache.insert(self.seed, &generated.chunk);
        }
        Ok(generated)
    }

    /// A chunk from the cache, or freshly generated.
    ///
    /// # Errors
    ///
    /// As [`TerraWorld::generate`].
    pub fn chunk(&self, coord: ChunkCoord) -> GenerationResult<Chunk> {
        if let Some(chunk) = self.cache.as_ref().and_then(|c| c.get(self.seed, coord)) {
            return Ok(chunk);
        }
        self.generate(coord).map(|generated| generated.chunk)
    }

    /// Generates a chunk straight into a host sink.
    ///
    /// # Errors
    ///
    /// As [`TerraWorld::generate`].
    pub fn generate_into(
        &self,
        coord: ChunkCoord,
        sink: &mut impl ChunkSink<B>,
    ) -> GenerationResult<GenerationReport> {
        let generated = self.generate(coord)?;
        self.write_chunk(&generated.chunk, sink);
        Ok(generated.report)
    }

    /// Releases structure plans and cached chunks farther than `radius`
    /// chunks from `center`. Returns the number of region plans dropped.
    ///
    /// Dropped plans are recomputed identically if their area comes back.
    pub fn release_outside(&self, center: ChunkCoord, radius: u32) -> usize {
        let dropped = self.config.coordinator().forget_outside(center, radius);
        if let Some(cache) = &self.cache {
            cache.retain(|coord| coord.distance(center) <= radius);
        }
        tracing::debug!(
            "World {}: released {} region plan(s) outside {} chunks of {}",
            self.config.name(),
            dropped,
            radius,
            center
        );
        dropped
    }

    /// Writes every non-air block and every column biome of `chunk`.
    pub fn write_chunk(&self, chunk: &Chunk, sink: &mut impl ChunkSink<B>) {
        let biomes = self.config.biomes();
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                if let Some(biome) = biomes.get(chunk.biome(x, z)) {
                    sink.set_biome(x, z, &biome.name);
                }
                let top = chunk.height(x, z).map_or(0, |h| h + 1);
                for y in 0..top.min(CHUNK_HEIGHT) {
                    if let Some(block) = self.block(chunk.get(x, y, z)) {
                        sink.set_block(x, y, z, block);
                    }
                }
            }
        }
    }
}

impl<B> fmt::Debug for TerraWorld<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerraWorld")
            .field("config", &self.config.name())
            .field("seed", &self.seed)
            .field("materials", &self.blocks.len())
            .field("cache", &self.cache.as_ref().map(ChunkCache::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{BlockGrid, MaterialNames};

    const CONFIG: &str = r#"
version = 1
name = "terraces"
seed = 11
sea_level = 30

[fields]
height = "32 + 4 * floor(x / 8)"

[[palette]]
material = "grass"
max = 2.0

[[palette]]
material = "stone"
"#;

    fn config() -> Arc<CompiledConfig> {
        Arc::new(CompiledConfig::from_toml_str(CONFIG, &SchematicLibrary::new()).unwrap())
    }

    /// Knows stone and water but has no grass.
    struct NoGrass;

    impl HostAdapter for NoGrass {
        type Block = u8;

        fn resolve_material(&self, name: &str) -> Option<u8> {
            match name {
                "stone" => Some(1),
                "water" => Some(2),
                _ => None,
            }
        }
    }

    #[test]
    fn test_unresolved_material_refuses_activation() {
        let err = TerraWorld::activate(&NoGrass, config(), None).unwrap_err();
        match err {
            ActivationError::UnresolvedMaterials { names } => assert_eq!(names, vec!["grass"]),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_default_seed_from_config() {
        let world = TerraWorld::activate(&MaterialNames, config(), None).unwrap();
        assert_eq!(world.seed(), WorldSeed::new(11));
        let world = TerraWorld::activate(&MaterialNames, config(), Some(WorldSeed::new(5))).unwrap();
        assert_eq!(world.seed(), WorldSeed::new(5));
    }

    #[test]
    fn test_generate_into_matches_chunk() {
        let world = TerraWorld::activate(&MaterialNames, config(), None).unwrap();
        let coord = ChunkCoord::new(0, 0);
        let mut grid = BlockGrid::new();
        let report = world.generate_into(coord, &mut grid).unwrap();
        assert!(report.is_clean());

        let chunk = world.chunk(coord).unwrap();
        assert_eq!(grid.count(), chunk.count_non_air());
        // x = 0..8 tops out at 31, x = 8..16 at 35.
        assert_eq!(grid.get(0, 31, 0).map(String::as_str), Some("grass"));
        assert_eq!(grid.get(0, 30, 0).map(String::as_str), Some("stone"));
        assert_eq!(grid.get(8, 35, 0).map(String::as_str), Some("grass"));
        assert_eq!(grid.get(0, 32, 0), None);
        assert_eq!(grid.biome(3, 3), "default");
    }

    #[test]
    fn test_release_outside_drops_far_chunks() {
        let world = TerraWorld::activate(&MaterialNames, config(), None)
            .unwrap()
            .with_cache(16);
        world.chunk(ChunkCoord::new(0, 0)).unwrap();
        world.chunk(ChunkCoord::new(40, 0)).unwrap();

        world.release_outside(ChunkCoord::new(0, 0), 4);
        let cache = world.cache().unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.get(world.seed(), ChunkCoord::new(0, 0)).is_some());
    }

    #[test]
    fn test_cache_serves_repeat_requests() {
        let world = TerraWorld::activate(&MaterialNames, config(), None)
            .unwrap()
            .with_cache(16);
        let coord = ChunkCoord::new(-2, 9);

        let first = world.chunk(coord).unwrap();
        let second = world.chunk(coord).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());

        let stats = world.cache().unwrap().stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }
}
