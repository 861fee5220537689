//! # Ore Veins
//!
//! Each source chunk rolls a number of veins; each vein is a rough blob
//! of one material replacing a set of host materials. Like carvers, a
//! chunk replays the veins of its neighbours and keeps the part that falls
//! inside itself.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::chunk::{BiomeId, Chunk, ChunkCoord, MaterialId, CHUNK_HEIGHT, CHUNK_SIZE};
use crate::config::{FloatRange, IntRange};
use crate::noise::WorldSeed;
use crate::structure::TerrainView;

/// A compiled ore vein rule.
#[derive(Clone, Debug, PartialEq)]
pub struct OreVein {
    /// Material placed.
    pub material: MaterialId,
    /// Materials the vein may replace.
    pub replace: Vec<MaterialId>,
    /// Vein center height range.
    pub height: IntRange,
    /// Veins per source chunk.
    pub veins: IntRange,
    /// Blob radius range.
    pub size: FloatRange,
    /// Allowed biomes; empty allows all.
    pub biomes: Vec<BiomeId>,
    /// Mixed into the world seed for this rule's veins.
    pub salt: u64,
}

impl OreVein {
    /// Chunks a blob can extend past its source chunk.
    #[must_use]
    pub fn reach_chunks(&self) -> i32 {
        (self.size.max / CHUNK_SIZE as f64).ceil() as i32
    }
}

/// Roughness of a blob edge at one block, in [0, 1).
fn edge_noise(stream: WorldSeed, x: i32, y: i32, z: i32) -> f64 {
    let bits = stream
        .derive_pos(i64::from(x), i64::from(z))
        .derive(y as u64)
        .value();
    (bits >> 11) as f64 / (1u64 << 53) as f64
}

/// Places the veins of every rule over `chunk`. Returns blocks replaced.
pub fn place_ores(chunk: &mut Chunk, ores: &[OreVein], seed: WorldSeed, view: &dyn TerrainView) -> u32 {
    let coord = chunk.coord();
    let (wx, wz) = (coord.world_x(), coord.world_z());
    let mut placed = 0;

    for ore in ores {
        let stream = seed.derive(ore.salt);
        let reach = ore.reach_chunks();
        for sz in coord.z - reach..=coord.z + reach {
            for sx in coord.x - reach..=coord.x + reach {
                let source = ChunkCoord::new(sx, sz);
                let mut rng = ChaCha8Rng::seed_from_u64(
                    stream.derive_pos(i64::from(sx), i64::from(sz)).value(),
                );
                let count = ore.veins.sample(&mut rng).max(0);
                for _ in 0..count {
                    // Draw everything first so a biome miss keeps the stream aligned.
                    let cx = source.world_x() + rng.gen_range(0..CHUNK_SIZE as i32);
                    let cz = source.world_z() + rng.gen_range(0..CHUNK_SIZE as i32);
                    let cy = ore.height.sample(&mut rng);
                    let radius = ore.size.sample(&mut rng);

                    let r = radius.ceil() as i32;
                    if cx + r < wx || cx - r >= wx + CHUNK_SIZE as i32 {
                        continue;
                    }
                    if cz + r < wz || cz - r >= wz + CHUNK_SIZE as i32 {
                        continue;
                    }
                    if !ore.biomes.is_empty() && !ore.biomes.contains(&view.biome_at(cx, cz)) {
                        continue;
                    }

                    for y in (cy - r).max(0)..=(cy + r).min(CHUNK_HEIGHT as i32 - 1) {
                        for z in (cz - r).max(wz)..=(cz + r).min(wz + CHUNK_SIZE as i32 - 1) {
                            for x in (cx - r).max(wx)..=(cx + r).min(wx + CHUNK_SIZE as i32 - 1) {
                                let d2 = f64::from((x - cx).pow(2) + (y - cy).pow(2) + (z - cz).pow(2));
                                let limit = radius * radius * (0.6 + 0.4 * edge_noise(stream, x, y, z));
                                if d2 > limit {
                                    continue;
                                }
                                let (lx, ly, lz) = ((x - wx) as usize, y as usize, (z - wz) as usize);
                                if ore.replace.contains(&chunk.get(lx, ly, lz)) {
                                    chunk.set(lx, ly, lz, ore.material);
                                    placed += 1;
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    placed
}
