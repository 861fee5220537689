//! # Chunk System
//!
//! A chunk is a 16 x 256 x 16 column of material indices plus per-column
//! biome and height maps.
//!
//! ## Identity
//!
//! [`Chunk::as_bytes`] exposes the material lattice exactly as stored
//! (`[y][z][x]`, little-endian `u16`). Two chunks are "identical" when those
//! bytes are equal.
//!
//! ## Storage
//!
//! [`Chunk::to_compressed`] / [`Chunk::from_compressed`] pack the lattice
//! and biome map with LZ4. Terrain usually compresses better than 10:1.

use bytemuck::{Pod, Zeroable};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::error::{ChunkDataError, ChunkDataResult};

/// Chunk width/depth in blocks.
pub const CHUNK_SIZE: usize = 16;

/// Chunk height in blocks.
pub const CHUNK_HEIGHT: usize = 256;

/// Total blocks per chunk.
pub const BLOCKS_PER_CHUNK: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_HEIGHT;

/// Largest supported absolute chunk coordinate.
pub const MAX_CHUNK_COORD: i32 = 1 << 20;

/// Chunk coordinate (identifies a chunk in the world grid).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    /// X coordinate (in chunks, not blocks).
    pub x: i32,
    /// Z coordinate (in chunks, not blocks).
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Converts world block coordinates to chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn from_block_pos(block_x: i32, block_z: i32) -> Self {
        Self {
            x: block_x.div_euclid(CHUNK_SIZE as i32),
            z: block_z.div_euclid(CHUNK_SIZE as i32),
        }
    }

    /// Returns the world X coordinate of the chunk's origin (corner).
    #[inline]
    #[must_use]
    pub const fn world_x(self) -> i32 {
        self.x * CHUNK_SIZE as i32
    }

    /// Returns the world Z coordinate of the chunk's origin.
    #[inline]
    #[must_use]
    pub const fn world_z(self) -> i32 {
        self.z * CHUNK_SIZE as i32
    }

    /// Returns true if the coordinate lies in the supported range.
    #[inline]
    #[must_use]
    pub const fn is_supported(self) -> bool {
        self.x.unsigned_abs() <= MAX_CHUNK_COORD as u32
            && self.z.unsigned_abs() <= MAX_CHUNK_COORD as u32
    }

    /// Chebyshev distance in chunks.
    #[inline]
    #[must_use]
    pub const fn distance(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dz = self.z.abs_diff(other.z);
        if dx > dz {
            dx
        } else {
            dz
        }
    }
}

impl std::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Index into a configuration's material table.
///
/// `MaterialId::AIR` (0) is always air.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct MaterialId(pub u16);

impl MaterialId {
    /// Air (empty).
    pub const AIR: Self = Self(0);

    /// Returns true if this is air.
    #[inline]
    #[must_use]
    pub const fn is_air(self) -> bool {
        self.0 == 0
    }

    /// Table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index into a configuration's biome table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct BiomeId(pub u8);

impl BiomeId {
    /// Table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A chunk of world data.
#[derive(Clone, PartialEq, Eq)]
pub struct Chunk {
    coord: ChunkCoord,
    /// Material lattice, indexed `[y][z][x]`.
    materials: Box<[MaterialId]>,
    /// Biome of each column, indexed `[z][x]`.
    biomes: [[BiomeId; CHUNK_SIZE]; CHUNK_SIZE],
    /// Highest non-air block of each column, -1 for an empty column.
    height_map: [[i16; CHUNK_SIZE]; CHUNK_SIZE],
}

impl Chunk {
    /// Creates an all-air chunk at the given coordinates.
    #[must_use]
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            materials: vec![MaterialId::AIR; BLOCKS_PER_CHUNK].into_boxed_slice(),
            biomes: [[BiomeId::default(); CHUNK_SIZE]; CHUNK_SIZE],
            height_map: [[-1; CHUNK_SIZE]; CHUNK_SIZE],
        }
    }

    #[inline]
    const fn index(x: usize, y: usize, z: usize) -> usize {
        (y * CHUNK_SIZE + z) * CHUNK_SIZE + x
    }

    /// Chunk position in the world.
    #[inline]
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Gets a material at local coordinates; air outside the chunk.
    ///
    /// # Arguments
    ///
    /// * `x` - Local X (0-15)
    /// * `y` - Y level (0-255)
    /// * `z` - Local Z (0-15)
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize) -> MaterialId {
        if x < CHUNK_SIZE && y < CHUNK_HEIGHT && z < CHUNK_SIZE {
            self.materials[Self::index(x, y, z)]
        } else {
            MaterialId::AIR
        }
    }

    /// Sets a material at local coordinates. Out-of-range writes are ignored.
    ///
    /// The height map is refreshed by [`Chunk::recompute_heights`].
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, material: MaterialId) {
        if x < CHUNK_SIZE && y < CHUNK_HEIGHT && z < CHUNK_SIZE {
            self.materials[Self::index(x, y, z)] = material;
        }
    }

    /// Gets the biome at a local column.
    #[inline]
    #[must_use]
    pub fn biome(&self, x: usize, z: usize) -> BiomeId {
        if x < CHUNK_SIZE && z < CHUNK_SIZE {
            self.biomes[z][x]
        } else {
            BiomeId::default()
        }
    }

    /// Sets the biome at a local column.
    #[inline]
    pub fn set_biome(&mut self, x: usize, z: usize, biome: BiomeId) {
        if x < CHUNK_SIZE && z < CHUNK_SIZE {
            self.biomes[z][x] = biome;
        }
    }

    /// Highest non-air block in a local column.
    #[inline]
    #[must_use]
    pub fn height(&self, x: usize, z: usize) -> Option<usize> {
        if x < CHUNK_SIZE && z < CHUNK_SIZE {
            usize::try_from(self.height_map[z][x]).ok()
        } else {
            None
        }
    }

    /// Rebuilds the height map from the lattice.
    pub fn recompute_heights(&mut self) {
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                self.height_map[z][x] = (0..CHUNK_HEIGHT)
                    .rev()
                    .find(|&y| !self.materials[Self::index(x, y, z)].is_air())
                    .map_or(-1, |y| y as i16);
            }
        }
    }

    /// The material lattice as raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.materials)
    }

    /// Counts blocks of one material.
    #[must_use]
    pub fn count(&self, material: MaterialId) -> usize {
        self.materials.iter().filter(|&&m| m == material).count()
    }

    /// Counts non-air blocks.
    #[must_use]
    pub fn count_non_air(&self) -> usize {
        self.materials.iter().filter(|m| !m.is_air()).count()
    }

    /// Packs the lattice and biome map into an LZ4 block.
    #[must_use]
    pub fn to_compressed(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(Self::data_size());
        raw.extend_from_slice(self.as_bytes());
        raw.extend(self.biomes.iter().flatten().map(|biome| biome.0));
        compress_prepend_size(&raw)
    }

    /// Unpacks a chunk written by [`Chunk::to_compressed`].
    ///
    /// # Errors
    ///
    /// Returns error if decompression fails or the data has the wrong size.
    pub fn from_compressed(coord: ChunkCoord, data: &[u8]) -> ChunkDataResult<Self> {
        let raw = decompress_size_prepended(data)
            .map_err(|e| ChunkDataError::Decompress(e.to_string()))?;

        if raw.len() != Self::data_size() {
            return Err(ChunkDataError::Size {
                expected: Self::data_size(),
                found: raw.len(),
            });
        }

        let (material_bytes, biome_bytes) = raw.split_at(BLOCKS_PER_CHUNK * 2);
        let mut chunk = Self::new(coord);

        // The byte buffer carries no alignment guarantee for u16.
        for (slot, pair) in chunk.materials.iter_mut().zip(material_bytes.chunks_exact(2)) {
            *slot = MaterialId(u16::from_ne_bytes([pair[0], pair[1]]));
        }
        for (i, &biome) in biome_bytes.iter().enumerate() {
            chunk.biomes[i / CHUNK_SIZE][i % CHUNK_SIZE] = BiomeId(biome);
        }

        chunk.recompute_heights();
        Ok(chunk)
    }

    /// Uncompressed size of the packed form in bytes.
    #[must_use]
    pub const fn data_size() -> usize {
        BLOCKS_PER_CHUNK * std::mem::size_of::<MaterialId>() + CHUNK_SIZE * CHUNK_SIZE
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("coord", &self.coord)
            .field("non_air", &self.count_non_air())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_coord_from_block() {
        assert_eq!(ChunkCoord::from_block_pos(0, 0), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_block_pos(15, 15), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_block_pos(16, 16), ChunkCoord::new(1, 1));
        assert_eq!(ChunkCoord::from_block_pos(-1, -1), ChunkCoord::new(-1, -1));
        assert_eq!(ChunkCoord::from_block_pos(-16, -16), ChunkCoord::new(-1, -1));
        assert_eq!(ChunkCoord::from_block_pos(-17, -17), ChunkCoord::new(-2, -2));
    }

    #[test]
    fn test_supported_range() {
        assert!(ChunkCoord::new(MAX_CHUNK_COORD, -MAX_CHUNK_COORD).is_supported());
        assert!(!ChunkCoord::new(MAX_CHUNK_COORD + 1, 0).is_supported());
        assert!(!ChunkCoord::new(0, i32::MIN).is_supported());
    }

    #[test]
    fn test_set_get_and_heights() {
        let mut chunk = Chunk::new(ChunkCoord::new(3, -2));
        chunk.set(1, 10, 2, MaterialId(5));
        chunk.set(1, 40, 2, MaterialId(6));
        chunk.set(99, 0, 0, MaterialId(7));
        chunk.recompute_heights();

        assert_eq!(chunk.get(1, 10, 2), MaterialId(5));
        assert_eq!(chunk.get(1, 300, 2), MaterialId::AIR);
        assert_eq!(chunk.height(1, 2), Some(40));
        assert_eq!(chunk.height(0, 0), None);
        assert_eq!(chunk.count_non_air(), 2);
    }

    #[test]
    fn test_bytes_follow_lattice_order() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        chunk.set(1, 0, 0, MaterialId(0x0102));
        let bytes = chunk.as_bytes();
        assert_eq!(bytes.len(), BLOCKS_PER_CHUNK * 2);
        assert_eq!(u16::from_ne_bytes([bytes[2], bytes[3]]), 0x0102);
    }

    #[test]
    fn test_chunk_compression() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        for y in 0..64 {
            for z in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    chunk.set(x, y, z, MaterialId(1 + (y % 3) as u16));
                }
            }
        }
        chunk.set_biome(4, 5, BiomeId(2));
        chunk.recompute_heights();

        let packed = chunk.to_compressed();
        println!(
            "Compressed: {} bytes, Uncompressed: {} bytes, Ratio: {:.1}x",
            packed.len(),
            Chunk::data_size(),
            Chunk::data_size() as f64 / packed.len() as f64
        );

        let loaded = Chunk::from_compressed(ChunkCoord::new(0, 0), &packed).unwrap();
        assert_eq!(loaded, chunk);
        assert_eq!(loaded.biome(4, 5), BiomeId(2));
    }

    #[test]
    fn test_corrupt_data_rejected() {
        assert!(matches!(
            Chunk::from_compressed(ChunkCoord::new(0, 0), &compress_prepend_size(&[1, 2, 3])),
            Err(ChunkDataError::Size { found: 3, .. })
        ));
        assert!(Chunk::from_compressed(ChunkCoord::new(0, 0), &[0xff; 3]).is_err());
    }
}
