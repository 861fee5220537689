//! # Host Boundary
//!
//! The host (a game server, a map renderer, a test) supplies two things:
//! a way to turn material names into its own block values, and a place to
//! write them.

use terra_procedural::{CHUNK_HEIGHT, CHUNK_SIZE};

/// Translates config material names into host blocks.
///
/// Called once per material at activation, never while generating.
pub trait HostAdapter {
    /// The host's block value.
    type Block: Clone + Send + Sync + 'static;

    /// The block for a material name, `None` if the host has none.
    fn resolve_material(&self, name: &str) -> Option<Self::Block>;
}

/// Receives generated blocks, chunk-local coordinates.
pub trait ChunkSink<B> {
    /// Sets one block. Air is never written.
    fn set_block(&mut self, x: usize, y: usize, z: usize, block: &B);

    /// Sets the biome of a column.
    fn set_biome(&mut self, _x: usize, _z: usize, _biome: &str) {}
}

/// Resolves every material to its own name.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaterialNames;

impl HostAdapter for MaterialNames {
    type Block = String;

    fn resolve_material(&self, name: &str) -> Option<String> {
        Some(name.to_string())
    }
}

/// A plain in-memory chunk of host blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockGrid<B> {
    blocks: Vec<Option<B>>,
    biomes: Vec<String>,
}

impl<B: Clone> Default for BlockGrid<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Clone> BlockGrid<B> {
    /// An empty (all air) grid.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: vec![None; CHUNK_SIZE * CHUNK_HEIGHT * CHUNK_SIZE],
            biomes: vec![String::new(); CHUNK_SIZE * CHUNK_SIZE],
        }
    }

    #[inline]
    const fn index(x: usize, y: usize, z: usize) -> usize {
        (y * CHUNK_SIZE + z) * CHUNK_SIZE + x
    }

    /// Block at a local position, `None` for air or out of bounds.
    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<&B> {
        if x >= CHUNK_SIZE || y >= CHUNK_HEIGHT || z >= CHUNK_SIZE {
            return None;
        }
        self.blocks[Self::index(x, y, z)].as_ref()
    }

    /// Biome name of a column; empty until written.
    #[must_use]
    pub fn biome(&self, x: usize, z: usize) -> &str {
        self.biomes
            .get(z * CHUNK_SIZE + x)
            .map_or("", String::as_str)
    }

    /// Number of non-air blocks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }
}

impl<B: Clone> ChunkSink<B> for BlockGrid<B> {
    fn set_block(&mut self, x: usize, y: usize, z: usize, block: &B) {
        if x < CHUNK_SIZE && y < CHUNK_HEIGHT && z < CHUNK_SIZE {
            self.blocks[Self::index(x, y, z)] = Some(block.clone());
        }
    }

    fn set_biome(&mut self, x: usize, z: usize, biome: &str) {
        if x < CHUNK_SIZE && z < CHUNK_SIZE {
            biome.clone_into(&mut self.biomes[z * CHUNK_SIZE + x]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_grid_bounds() {
        let mut grid = BlockGrid::new();
        grid.set_block(15, 255, 15, &7u32);
        grid.set_block(16, 0, 0, &9u32);
        assert_eq!(grid.get(15, 255, 15), Some(&7));
        assert_eq!(grid.get(16, 0, 0), None);
        assert_eq!(grid.count(), 1);
    }

    #[test]
    fn test_material_names_resolve_everything() {
        assert_eq!(MaterialNames.resolve_material("stone").as_deref(), Some("stone"));
    }
}
