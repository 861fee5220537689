//! # Simplex Noise
//!
//! Deterministic 2D and 3D simplex noise plus the fractal variants the
//! configuration can ask for.
//!
//! ## Determinism Guarantee
//!
//! Given the same `WorldSeed`, this implementation produces **exactly** the
//! same values on any platform, any time. Permutation tables are shuffled
//! with a fixed xorshift stream, never with an OS-seeded RNG.

use serde::{Deserialize, Serialize};

/// World seed for deterministic generation.
///
/// All procedural generation derives from this seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldSeed(u64);

impl WorldSeed {
    /// Creates a new world seed.
    #[inline]
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Returns the raw seed value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Derives a sub-seed for a specific purpose (noise layer, carver, ...).
    ///
    /// Uses a hash function to create independent streams from one seed.
    #[inline]
    #[must_use]
    pub const fn derive(self, purpose: u64) -> Self {
        let mut hash = self.0;
        hash ^= purpose;
        hash = hash.wrapping_mul(0x517c_c1b7_2722_0a95);
        hash ^= hash >> 32;
        Self(hash)
    }

    /// Derives a sub-seed from a signed lattice position.
    #[inline]
    #[must_use]
    pub const fn derive_pos(self, a: i64, b: i64) -> Self {
        self.derive(a as u64).derive((b as u64).rotate_left(29) ^ 0x9e37_79b9_7f4a_7c15)
    }
}

impl Default for WorldSeed {
    fn default() -> Self {
        Self(0xDEAD_BEEF_CAFE_BABE)
    }
}

/// Stable 64-bit FNV-1a hash of a name, used as a default salt.
#[must_use]
pub fn name_salt(name: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Pre-computed permutation table for noise.
///
/// This is computed once from the seed and reused.
struct PermutationTable {
    /// 512-entry permutation table (256 entries, doubled for overflow handling).
    perm: [u8; 512],
}

impl PermutationTable {
    /// 12 gradients for 2D simplex.
    const GRAD2: [[i8; 2]; 12] = [
        [1, 0], [1, 1], [0, 1], [-1, 1],
        [-1, 0], [-1, -1], [0, -1], [1, -1],
        [1, 0], [0, 1], [-1, 0], [0, -1],
    ];

    /// The 12 cube-edge midpoints for 3D simplex.
    const GRAD3: [[i8; 3]; 12] = [
        [1, 1, 0], [-1, 1, 0], [1, -1, 0], [-1, -1, 0],
        [1, 0, 1], [-1, 0, 1], [1, 0, -1], [-1, 0, -1],
        [0, 1, 1], [0, -1, 1], [0, 1, -1], [0, -1, -1],
    ];

    /// Creates a new permutation table from a seed.
    fn new(seed: WorldSeed) -> Self {
        let mut perm = [0u8; 512];

        for (i, slot) in perm.iter_mut().take(256).enumerate() {
            *slot = i as u8;
        }

        // Fisher-Yates shuffle driven by xorshift64. A zero state would stick.
        let mut rng_state = seed.value() | 1;
        for i in (1..256).rev() {
            rng_state ^= rng_state << 13;
            rng_state ^= rng_state >> 7;
            rng_state ^= rng_state << 17;

            let j = (rng_state as usize) % (i + 1);
            perm.swap(i, j);
        }

        // Double the table to avoid index wrapping
        for i in 0..256 {
            perm[256 + i] = perm[i];
        }

        Self { perm }
    }

    /// Gets a permutation value (with automatic wrapping).
    #[inline]
    fn get(&self, index: usize) -> usize {
        usize::from(self.perm[index & 511])
    }
}

/// Simplex noise generator over one permutation table.
///
/// Produces smooth, continuous noise values in the range [-1, 1].
///
/// # Performance
///
/// - O(1) per sample
/// - No allocations
pub struct SimplexNoise {
    perm_table: PermutationTable,
}

impl SimplexNoise {
    /// Skewing factor for 2D simplex grid.
    const F2: f64 = 0.366_025_403_784_439; // (sqrt(3) - 1) / 2
    /// Unskewing factor for 2D simplex grid.
    const G2: f64 = 0.211_324_865_405_187; // (3 - sqrt(3)) / 6
    /// Skewing factor for 3D simplex grid.
    const F3: f64 = 1.0 / 3.0;
    /// Unskewing factor for 3D simplex grid.
    const G3: f64 = 1.0 / 6.0;

    /// Creates a new simplex noise generator from a seed.
    #[must_use]
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            perm_table: PermutationTable::new(seed),
        }
    }

    /// Samples 2D simplex noise at the given coordinates.
    ///
    /// # Returns
    ///
    /// A value in the range [-1, 1].
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        // Skew input coordinates to simplex grid
        let skew = (x + y) * Self::F2;
        let i = fast_floor(x + skew);
        let j = fast_floor(y + skew);

        // Unskew to get first corner in simplex
        let unskew = f64::from(i + j) * Self::G2;
        let x0 = x - (f64::from(i) - unskew);
        let y0 = y - (f64::from(j) - unskew);

        // Upper or lower triangle
        let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

        let x1 = x0 - i1 as f64 + Self::G2;
        let y1 = y0 - j1 as f64 + Self::G2;
        let x2 = x0 - 1.0 + 2.0 * Self::G2;
        let y2 = y0 - 1.0 + 2.0 * Self::G2;

        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;
        let p = &self.perm_table;

        let gi0 = p.get(ii + p.get(jj));
        let gi1 = p.get(ii + i1 + p.get(jj + j1));
        let gi2 = p.get(ii + 1 + p.get(jj + 1));

        let n0 = Self::contribution2(x0, y0, gi0);
        let n1 = Self::contribution2(x1, y1, gi1);
        let n2 = Self::contribution2(x2, y2, gi2);

        // 70.0 normalizes the sum to [-1, 1]
        (70.0 * (n0 + n1 + n2)).clamp(-1.0, 1.0)
    }

    /// Samples 3D simplex noise at the given coordinates.
    ///
    /// # Returns
    ///
    /// A value in the range [-1, 1].
    #[must_use]
    pub fn sample_3d(&self, x: f64, y: f64, z: f64) -> f64 {
        let skew = (x + y + z) * Self::F3;
        let i = fast_floor(x + skew);
        let j = fast_floor(y + skew);
        let k = fast_floor(z + skew);

        let unskew = f64::from(i + j + k) * Self::G3;
        let x0 = x - (f64::from(i) - unskew);
        let y0 = y - (f64::from(j) - unskew);
        let z0 = z - (f64::from(k) - unskew);

        // Which of the six tetrahedra we are in
        let (i1, j1, k1, i2, j2, k2) = if x0 >= y0 {
            if y0 >= z0 {
                (1, 0, 0, 1, 1, 0)
            } else if x0 >= z0 {
                (1, 0, 0, 1, 0, 1)
            } else {
                (0, 0, 1, 1, 0, 1)
            }
        } else if y0 < z0 {
            (0, 0, 1, 0, 1, 1)
        } else if x0 < z0 {
            (0, 1, 0, 0, 1, 1)
        } else {
            (0, 1, 0, 1, 1, 0)
        };

        let x1 = x0 - i1 as f64 + Self::G3;
        let y1 = y0 - j1 as f64 + Self::G3;
        let z1 = z0 - k1 as f64 + Self::G3;
        let x2 = x0 - i2 as f64 + 2.0 * Self::G3;
        let y2 = y0 - j2 as f64 + 2.0 * Self::G3;
        let z2 = z0 - k2 as f64 + 2.0 * Self::G3;
        let x3 = x0 - 1.0 + 3.0 * Self::G3;
        let y3 = y0 - 1.0 + 3.0 * Self::G3;
        let z3 = z0 - 1.0 + 3.0 * Self::G3;

        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;
        let kk = (k & 255) as usize;
        let p = &self.perm_table;

        let gi0 = p.get(ii + p.get(jj + p.get(kk)));
        let gi1 = p.get(ii + i1 + p.get(jj + j1 + p.get(kk + k1)));
        let gi2 = p.get(ii + i2 + p.get(jj + j2 + p.get(kk + k2)));
        let gi3 = p.get(ii + 1 + p.get(jj + 1 + p.get(kk + 1)));

        let n0 = Self::contribution3(x0, y0, z0, gi0);
        let n1 = Self::contribution3(x1, y1, z1, gi1);
        let n2 = Self::contribution3(x2, y2, z2, gi2);
        let n3 = Self::contribution3(x3, y3, z3, gi3);

        (32.0 * (n0 + n1 + n2 + n3)).clamp(-1.0, 1.0)
    }

    #[inline]
    fn contribution2(x: f64, y: f64, hash: usize) -> f64 {
        let t = 0.5 - x * x - y * y;
        if t < 0.0 {
            0.0
        } else {
            let grad = PermutationTable::GRAD2[hash % 12];
            let t2 = t * t;
            t2 * t2 * (x * f64::from(grad[0]) + y * f64::from(grad[1]))
        }
    }

    #[inline]
    fn contribution3(x: f64, y: f64, z: f64, hash: usize) -> f64 {
        let t = 0.6 - x * x - y * y - z * z;
        if t < 0.0 {
            0.0
        } else {
            let grad = PermutationTable::GRAD3[hash % 12];
            let t2 = t * t;
            t2 * t2 * (x * f64::from(grad[0]) + y * f64::from(grad[1]) + z * f64::from(grad[2]))
        }
    }

    /// Generates octaved (fractal) 2D noise.
    ///
    /// # Arguments
    ///
    /// * `x`, `y` - Coordinates
    /// * `octaves` - Number of noise layers (typically 4-8)
    /// * `persistence` - Amplitude decay per octave (typically 0.5)
    /// * `lacunarity` - Frequency increase per octave (typically 2.0)
    ///
    /// # Returns
    ///
    /// A value in the range [-1, 1].
    #[must_use]
    pub fn octaved(&self, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
        fractal(octaves, persistence, lacunarity, |f| self.sample(x * f, y * f))
    }

    /// Generates octaved (fractal) 3D noise.
    #[must_use]
    pub fn octaved_3d(
        &self,
        x: f64,
        y: f64,
        z: f64,
        octaves: u32,
        persistence: f64,
        lacunarity: f64,
    ) -> f64 {
        fractal(octaves, persistence, lacunarity, |f| {
            self.sample_3d(x * f, y * f, z * f)
        })
    }

    /// Generates ridged noise (good for mountains).
    ///
    /// Creates sharp ridges by taking the absolute value and inverting.
    /// Output lies in [0, 1].
    #[must_use]
    pub fn ridged(&self, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
        fractal(octaves, persistence, lacunarity, |f| {
            ridge(self.sample(x * f, y * f))
        })
    }

    /// Generates ridged 3D noise.
    #[must_use]
    pub fn ridged_3d(
        &self,
        x: f64,
        y: f64,
        z: f64,
        octaves: u32,
        persistence: f64,
        lacunarity: f64,
    ) -> f64 {
        fractal(octaves, persistence, lacunarity, |f| {
            ridge(self.sample_3d(x * f, y * f, z * f))
        })
    }
}

#[inline]
fn ridge(noise: f64) -> f64 {
    let ridge = 1.0 - noise.abs();
    ridge * ridge
}

/// Sums `octaves` layers of `layer(frequency)`, normalized by total amplitude.
#[inline]
fn fractal(octaves: u32, persistence: f64, lacunarity: f64, layer: impl Fn(f64) -> f64) -> f64 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut max_amplitude = 0.0;

    for _ in 0..octaves.max(1) {
        total += layer(frequency) * amplitude;
        max_amplitude += amplitude;
        amplitude *= persistence;
        frequency *= lacunarity;
    }

    total / max_amplitude
}

/// Fast floor function.
///
/// Faster than `f64::floor()` for our use case.
#[inline]
fn fast_floor(x: f64) -> i32 {
    let xi = x as i32;
    if x < f64::from(xi) {
        xi - 1
    } else {
        xi
    }
}

/// How a noise layer combines octaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    /// A single simplex sample; octave settings are ignored.
    Simplex,
    /// Fractal Brownian motion, [-1, 1].
    #[default]
    Fbm,
    /// Ridged multifractal, [0, 1].
    Ridged,
}

/// Fully specified settings of one named noise layer.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseLayer {
    /// Variable name the layer is bound to in expressions.
    pub name: String,
    /// Octave combination.
    pub kind: NoiseKind,
    /// `true` for per-point 3D sampling, `false` for per-column 2D.
    pub three_d: bool,
    /// Base frequency in cycles per block.
    pub frequency: f64,
    /// Octave count.
    pub octaves: u32,
    /// Amplitude decay per octave.
    pub persistence: f64,
    /// Frequency growth per octave.
    pub lacunarity: f64,
    /// Mixed into the world seed to give the layer its own stream.
    pub salt: u64,
}

impl NoiseLayer {
    fn sample_2d(&self, noise: &SimplexNoise, x: f64, z: f64) -> f64 {
        let (x, z) = (x * self.frequency, z * self.frequency);
        match self.kind {
            NoiseKind::Simplex => noise.sample(x, z),
            NoiseKind::Fbm => noise.octaved(x, z, self.octaves, self.persistence, self.lacunarity),
            NoiseKind::Ridged => noise.ridged(x, z, self.octaves, self.persistence, self.lacunarity),
        }
    }

    fn sample_3d(&self, noise: &SimplexNoise, x: f64, y: f64, z: f64) -> f64 {
        let f = self.frequency;
        let (x, y, z) = (x * f, y * f, z * f);
        match self.kind {
            NoiseKind::Simplex => noise.sample_3d(x, y, z),
            NoiseKind::Fbm => {
                noise.octaved_3d(x, y, z, self.octaves, self.persistence, self.lacunarity)
            }
            NoiseKind::Ridged => {
                noise.ridged_3d(x, y, z, self.octaves, self.persistence, self.lacunarity)
            }
        }
    }
}

/// Seeded generators for every layer of a configuration.
///
/// Built once per (seed, config) and shared read-only.
pub struct NoiseSet {
    layers: Vec<(NoiseLayer, SimplexNoise)>,
}

impl NoiseSet {
    /// Seeds every layer from the world seed and the layer's salt.
    #[must_use]
    pub fn new(layers: &[NoiseLayer], seed: WorldSeed) -> Self {
        Self {
            layers: layers
                .iter()
                .map(|layer| (layer.clone(), SimplexNoise::new(seed.derive(layer.salt))))
                .collect(),
        }
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns true if there are no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Samples layer `index` at a world position.
    ///
    /// 2D layers ignore `y`.
    #[must_use]
    pub fn sample(&self, index: usize, x: f64, y: f64, z: f64) -> f64 {
        self.layers.get(index).map_or(0.0, |(layer, noise)| {
            if layer.three_d {
                layer.sample_3d(noise, x, y, z)
            } else {
                layer.sample_2d(noise, x, z)
            }
        })
    }

    /// Writes every 2D layer's value at `(x, z)` into `out`, in layer order.
    pub fn sample_columns(&self, x: f64, z: f64, out: &mut Vec<f64>) {
        out.clear();
        out.extend(
            self.layers
                .iter()
                .filter(|(layer, _)| !layer.three_d)
                .map(|(layer, noise)| layer.sample_2d(noise, x, z)),
        );
    }

    /// Writes every 3D layer's value at `(x, y, z)` into `out`, in layer order.
    pub fn sample_points(&self, x: f64, y: f64, z: f64, out: &mut Vec<f64>) {
        out.clear();
        out.extend(
            self.layers
                .iter()
                .filter(|(layer, _)| layer.three_d)
                .map(|(layer, noise)| layer.sample_3d(noise, x, y, z)),
        );
    }
}
