//! # Worm Carvers
//!
//! Caves are random walks ("worms") that clear an ellipsoid around every
//! step.
//!
//! ## Seams
//!
//! A worm starts in a *source* chunk but may wander into its neighbours.
//! Every chunk therefore replays the worms of all source chunks within
//! [`Carver::reach_chunks`] and keeps only the blocks that fall inside
//! itself. A worm is a pure function of (seed, carver, source chunk), so
//! the pieces meet exactly regardless of generation order.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::chunk::{BiomeId, Chunk, ChunkCoord, MaterialId, CHUNK_HEIGHT, CHUNK_SIZE};
use crate::config::{FloatRange, IntRange};
use crate::noise::WorldSeed;
use crate::structure::TerrainView;

/// Farthest a carver may reach from its source chunk.
pub const MAX_CARVER_REACH: i32 = 8;

/// A compiled worm carver.
#[derive(Clone, Debug, PartialEq)]
pub struct Carver {
    /// Name, used for logs and the default salt.
    pub name: String,
    /// Percent chance that a source chunk starts a worm.
    pub chance: f64,
    /// Per-biome overrides of `chance`, keyed by the source chunk's biome.
    pub biome_chance: Vec<(BiomeId, f64)>,
    /// Start height range.
    pub height: IntRange,
    /// Length range; a worm takes half this many steps.
    pub length: IntRange,
    /// Radius range; the upper bound also caps the running radius.
    pub radius: FloatRange,
    /// Per-axis radius scale.
    pub radius_multiplier: [f64; 3],
    /// Per-axis spread of the initial direction.
    pub start: [f64; 3],
    /// Per-axis turn rate and the radius drift.
    pub mutate: [f64; 4],
    /// Distance travelled per step.
    pub step: f64,
    /// Steps between direction changes.
    pub recalc: IntRange,
    /// Size of a direction change, in multiples of `mutate`.
    pub recalc_magnitude: f64,
    /// Blocks removed from the top of each ellipsoid.
    pub top_cut: u32,
    /// Blocks removed from the bottom of each ellipsoid.
    pub bottom_cut: u32,
    /// Mixed into the world seed for this carver's worms.
    pub salt: u64,
}

impl Carver {
    /// Chunks a worm can travel from its source chunk.
    #[must_use]
    pub fn reach_chunks(&self) -> i32 {
        let steps = f64::from(self.length.max.max(0) / 2);
        let widest = self.radius_multiplier.iter().copied().fold(1.0, f64::max);
        let travel = steps * self.step + self.radius.max * widest;
        (travel / CHUNK_SIZE as f64).ceil() as i32
    }

    fn chance_in(&self, biome: BiomeId) -> f64 {
        self.biome_chance
            .iter()
            .find(|(id, _)| *id == biome)
            .map_or(self.chance, |(_, chance)| *chance)
    }

    /// Simulates the worm of one source chunk, if the chunk has one.
    fn worm(&self, seed: WorldSeed, source: ChunkCoord, view: &dyn TerrainView) -> Option<Worm<'_>> {
        let stream = seed
            .derive(self.salt)
            .derive_pos(i64::from(source.x), i64::from(source.z));
        let mut rng = ChaCha8Rng::seed_from_u64(stream.value());

        let roll = rng.gen::<f64>() * 100.0;
        let chance = if self.biome_chance.is_empty() {
            self.chance
        } else {
            self.chance_in(view.biome_at(source.world_x(), source.world_z()))
        };
        if roll >= chance {
            return None;
        }

        let origin = [
            f64::from(source.world_x()) + rng.gen_range(0.0..CHUNK_SIZE as f64),
            f64::from(self.height.sample(&mut rng)),
            f64::from(source.world_z()) + rng.gen_range(0.0..CHUNK_SIZE as f64),
        ];
        let steps = self.length.sample(&mut rng).max(0) as u32 / 2;
        let radius = self.radius.sample(&mut rng);

        let mut direction = [
            (rng.gen::<f64>() - 0.5) * self.start[0],
            (rng.gen::<f64>() - 0.5) * self.start[1],
            (rng.gen::<f64>() - 0.5) * self.start[2],
        ];
        let length = direction.iter().map(|v| v * v).sum::<f64>().sqrt();
        if length > f64::EPSILON {
            for v in &mut direction {
                *v = *v / length * self.step;
            }
        } else {
            direction = [self.step, 0.0, 0.0];
        }

        Some(Worm {
            carver: self,
            rng,
            position: origin,
            direction,
            radius,
            rotation: [0.0; 3],
            steps_left: steps,
            step: 0,
            next_turn: 0,
        })
    }
}

/// One walking worm.
struct Worm<'a> {
    carver: &'a Carver,
    rng: ChaCha8Rng,
    position: [f64; 3],
    direction: [f64; 3],
    radius: f64,
    rotation: [f64; 3],
    steps_left: u32,
    step: u32,
    next_turn: u32,
}

impl Worm<'_> {
    /// Advances one step; returns the center and per-axis radii to clear.
    fn advance(&mut self) -> Option<([f64; 3], [i32; 3])> {
        if self.steps_left == 0 {
            return None;
        }
        self.steps_left -= 1;
        let carver = self.carver;

        if self.step == self.next_turn {
            for axis in 0..3 {
                let turn = gaussian(&mut self.rng) * carver.mutate[axis] * carver.recalc_magnitude;
                rotate(&mut self.direction, axis, turn);
            }
            for axis in 0..3 {
                self.rotation[axis] = gaussian(&mut self.rng) * carver.mutate[axis];
            }
            self.next_turn += carver.recalc.sample(&mut self.rng).max(1) as u32;
        }
        self.step += 1;

        let center = self.position;
        let radii = [0, 1, 2].map(|axis| {
            ((self.radius * carver.radius_multiplier[axis]) as i32).max(1)
        });

        self.radius += (self.rng.gen::<f64>() - 0.5) * carver.mutate[3];
        self.radius = self.radius.min(carver.radius.max).max(1.0);
        for axis in 0..3 {
            rotate(&mut self.direction, axis, self.rotation[axis] * carver.mutate[axis]);
        }
        for axis in 0..3 {
            self.position[axis] += self.direction[axis];
        }

        Some((center, radii))
    }
}

/// Standard normal sample (Box-Muller).
fn gaussian(rng: &mut impl Rng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Rotates `v` around axis 0 (x), 1 (y) or 2 (z) by `degrees`.
fn rotate(v: &mut [f64; 3], axis: usize, degrees: f64) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let [x, y, z] = *v;
    *v = match axis {
        0 => [x, y * cos - z * sin, y * sin + z * cos],
        1 => [x * cos + z * sin, y, -x * sin + z * cos],
        _ => [x * cos - y * sin, x * sin + y * cos, z],
    };
}

/// Clears one ellipsoid, clipped to the chunk. Returns blocks cleared.
fn clear_ellipsoid(
    chunk: &mut Chunk,
    carver: &Carver,
    center: [f64; 3],
    radii: [i32; 3],
    fluid: MaterialId,
) -> u32 {
    let coord = chunk.coord();
    let (wx, wz) = (coord.world_x(), coord.world_z());
    let c = center.map(|v| v.floor() as i32);
    let [rx, ry, rz] = radii;

    let x0 = (c[0] - rx).max(wx);
    let x1 = (c[0] + rx).min(wx + CHUNK_SIZE as i32 - 1);
    let z0 = (c[2] - rz).max(wz);
    let z1 = (c[2] + rz).min(wz + CHUNK_SIZE as i32 - 1);
    let y_lo = -ry + carver.bottom_cut as i32;
    let y_hi = ry - carver.top_cut as i32;

    let mut cleared = 0;
    for dy in y_lo..=y_hi {
        let y = c[1] + dy;
        if y < 0 || y >= CHUNK_HEIGHT as i32 {
            continue;
        }
        let fy = f64::from(dy) / f64::from(ry);
        for z in z0..=z1 {
            let fz = f64::from(z - c[2]) / f64::from(rz);
            for x in x0..=x1 {
                let fx = f64::from(x - c[0]) / f64::from(rx);
                if fx * fx + fy * fy + fz * fz > 1.0 {
                    continue;
                }
                let (lx, ly, lz) = ((x - wx) as usize, y as usize, (z - wz) as usize);
                let current = chunk.get(lx, ly, lz);
                if !current.is_air() && current != fluid {
                    chunk.set(lx, ly, lz, MaterialId::AIR);
                    cleared += 1;
                }
            }
        }
    }
    cleared
}

/// Runs every carver over `chunk`. Returns the number of blocks cleared.
///
/// # Arguments
///
/// * `chunk` - Chunk after the palette pass
/// * `carvers` - Compiled carvers, in config order
/// * `seed` - World seed
/// * `view` - Terrain queries for source chunk biomes
/// * `fluid` - Material carvers leave in place
pub fn carve(
    chunk: &mut Chunk,
    carvers: &[Carver],
    seed: WorldSeed,
    view: &dyn TerrainView,
    fluid: MaterialId,
) -> u32 {
    let coord = chunk.coord();
    let mut cleared = 0;

    for carver in carvers {
        let reach = carver.reach_chunks();
        for sz in coord.z - reach..=coord.z + reach {
            for sx in coord.x - reach..=coord.x + reach {
                let Some(mut worm) = carver.worm(seed, ChunkCoord::new(sx, sz), view) else {
                    continue;
                };
                while let Some((center, radii)) = worm.advance() {
                    if touches(coord, center, radii) {
                        cleared += clear_ellipsoid(chunk, carver, center, radii, fluid);
                    }
                }
            }
        }
    }
    cleared
}

fn touches(coord: ChunkCoord, center: [f64; 3], radii: [i32; 3]) -> bool {
    let (x, z) = (center[0].floor() as i32, center[2].floor() as i32);
    let (wx, wz) = (coord.world_x(), coord.world_z());
    x + radii[0] >= wx
        && x - radii[0] < wx + CHUNK_SIZE as i32
        && z + radii[2] >= wz
        && z - radii[2] < wz + CHUNK_SIZE as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uniform;

    impl TerrainView for Uniform {
        fn height_at(&self, _x: i32, _z: i32) -> Option<i32> {
            Some(200)
        }
        fn biome_at(&self, x: i32, _z: i32) -> BiomeId {
            BiomeId(u8::from(x < 0))
        }
        fn is_solid(&self, _x: i32, y: i32, _z: i32) -> bool {
            y <= 200
        }
        fn sea_level(&self) -> i32 {
            0
        }
    }

    fn carver() -> Carver {
        Carver {
            name: "caves".into(),
            chance: 100.0,
            biome_chance: Vec::new(),
            height: IntRange { min: 40, max: 60 },
            length: IntRange { min: 40, max: 60 },
            radius: FloatRange { min: 2.0, max: 4.0 },
            radius_multiplier: [1.0, 1.0, 1.0],
            start: [1.0, 0.3, 1.0],
            mutate: [2.0, 1.0, 2.0, 0.4],
            step: 2.0,
            recalc: IntRange { min: 8, max: 10 },
            recalc_magnitude: 3.0,
            top_cut: 0,
            bottom_cut: 0,
            salt: 7,
        }
    }

    fn stone_chunk(coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::new(coord);
        for y in 0..=200 {
            for z in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    chunk.set(x, y, z, MaterialId(2));
                }
            }
        }
        chunk
    }

    #[test]
    fn test_reach() {
        let carver = carver();
        // 30 steps * 2 + 4 = 64 blocks.
        assert_eq!(carver.reach_chunks(), 4);
    }

    #[test]
    fn test_carving_is_deterministic() {
        let carvers = vec![carver()];
        let mut a = stone_chunk(ChunkCoord::new(3, -2));
        let mut b = stone_chunk(ChunkCoord::new(3, -2));
        let cleared = carve(&mut a, &carvers, WorldSeed::new(11), &Uniform, MaterialId(9));
        carve(&mut b, &carvers, WorldSeed::new(11), &Uniform, MaterialId(9));

        println!("Cleared {cleared} blocks");
        assert!(cleared > 0);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_fluid_and_air_untouched() {
        let carvers = vec![carver()];
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        for y in 0..CHUNK_HEIGHT {
            chunk.set(0, y, 0, MaterialId(9));
        }
        assert_eq!(carve(&mut chunk, &carvers, WorldSeed::new(1), &Uniform, MaterialId(9)), 0);
        assert_eq!(chunk.count(MaterialId(9)), CHUNK_HEIGHT);
    }

    #[test]
    fn test_biome_chance_override() {
        let mut carver = carver();
        carver.chance = 0.0;
        carver.biome_chance = vec![(BiomeId(1), 100.0)];
        let carvers = vec![carver];

        // Biome 1 covers x < 0, so only western source chunks start worms.
        let mut east = stone_chunk(ChunkCoord::new(40, 0));
        assert_eq!(carve(&mut east, &carvers, WorldSeed::new(3), &Uniform, MaterialId(9)), 0);
        let mut west = stone_chunk(ChunkCoord::new(-40, 0));
        assert!(carve(&mut west, &carvers, WorldSeed::new(3), &Uniform, MaterialId(9)) > 0);
    }

    #[test]
    fn test_rotation_preserves_length() {
        let mut v = [1.0, 2.0, 2.0];
        for axis in 0..3 {
            rotate(&mut v, axis, 37.0);
        }
        let length = v.iter().map(|c| c * c).sum::<f64>().sqrt();
        assert!((length - 3.0).abs() < 1e-9);
    }
}
