//! # Generation Config
//!
//! A world is described by one TOML document ([`GenerationConfig`]) and
//! compiled once into an immutable [`CompiledConfig`] that every generating
//! thread shares.
//!
//! ## Loading
//!
//! 1. The `version` key is read first; other versions are refused.
//! 2. The document is parsed strictly (unknown keys are errors).
//! 3. Every value is validated and every expression compiled. The first
//!    problem aborts the load with its key path; nothing is half applied.
//!
//! ## Expression Scopes
//!
//! | Expression | Variables |
//! |------------|-----------|
//! | `fields.height` | `x`, `z`, 2D noise layers |
//! | `biomes[].condition` | `x`, `z`, `height`, 2D noise layers |
//! | `fields.density` | `x`, `y`, `z`, `height`, 2D then 3D noise layers |
//!
//! `sea_level` and every `[constants]` entry are constants in all scopes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use terra_expr::{Expression, Scope, ScopeError};

use crate::biome::{Biome, BiomeTable, MAX_BIOMES};
use crate::carver::{Carver, MAX_CARVER_REACH};
use crate::chunk::{BiomeId, MaterialId, CHUNK_HEIGHT, CHUNK_SIZE};
use crate::error::{ConfigError, ConfigResult};
use crate::noise::{name_salt, NoiseKind, NoiseLayer, WorldSeed};
use crate::ore::OreVein;
use crate::palette::{Palette, PaletteLayer};
use crate::structure::{
    PlacementCoordinator, SchematicLibrary, SearchMode, SpawnRequirement, StructureRule,
};

/// The only document version this build reads.
pub const CONFIG_VERSION: u32 = 1;

/// Most noise layers a config may declare.
pub const MAX_NOISE_LAYERS: usize = 32;

/// Inclusive integer range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntRange {
    /// Lowest value.
    pub min: i32,
    /// Highest value.
    pub max: i32,
}

impl IntRange {
    /// Creates a range.
    #[must_use]
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Uniform sample in `[min, max]`.
    pub fn sample(self, rng: &mut impl Rng) -> i32 {
        if self.max <= self.min {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }

    fn validate(self, key: &str, lo: i32, hi: i32) -> ConfigResult<Self> {
        if self.min > self.max {
            return Err(ConfigError::invalid(key, format!("min {} exceeds max {}", self.min, self.max)));
        }
        if self.min < lo || self.max > hi {
            return Err(ConfigError::invalid(key, format!("must lie within [{lo}, {hi}]")));
        }
        Ok(self)
    }
}

/// Half-open float range `[min, max)`; a single value when equal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FloatRange {
    /// Lowest value.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl FloatRange {
    /// Creates a range.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Uniform sample.
    pub fn sample(self, rng: &mut impl Rng) -> f64 {
        self.min + rng.gen::<f64>() * (self.max - self.min)
    }

    fn validate(self, key: &str, lo: f64, hi: f64) -> ConfigResult<Self> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(ConfigError::invalid(key, "expected finite min <= max"));
        }
        if self.min < lo || self.max > hi {
            return Err(ConfigError::invalid(key, format!("must lie within [{lo}, {hi}]")));
        }
        Ok(self)
    }
}

// =============================================================================
// Document
// =============================================================================

/// One `[[noise]]` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoiseDocument {
    /// Variable name in expressions.
    pub name: String,
    /// Octave combination.
    #[serde(default)]
    pub kind: NoiseKind,
    /// 2 (per column) or 3 (per point).
    #[serde(default = "default_dimensions")]
    pub dimensions: u8,
    /// Base frequency in cycles per block.
    #[serde(default = "default_frequency")]
    pub frequency: f64,
    /// Octave count.
    #[serde(default = "default_octaves")]
    pub octaves: u32,
    /// Amplitude decay per octave.
    #[serde(default = "default_persistence")]
    pub persistence: f64,
    /// Frequency growth per octave.
    #[serde(default = "default_lacunarity")]
    pub lacunarity: f64,
    /// Seed salt; defaults to a hash of the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<i64>,
}

/// The `[fields]` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldsDocument {
    /// Surface height per column.
    pub height: String,
    /// Density per point; `height - y` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<String>,
}

/// The `[fallback]` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackDocument {
    /// Height used when `fields.height` fails; `sea_level` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Density used when `fields.density` fails.
    #[serde(default = "default_fallback_density")]
    pub density: f64,
}

impl Default for FallbackDocument {
    fn default() -> Self {
        Self {
            height: None,
            density: default_fallback_density(),
        }
    }
}

/// One palette range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaletteLayerDocument {
    /// Material name.
    pub material: String,
    /// Lower density bound (inclusive); unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper density bound (exclusive); unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// One `[[biomes]]` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BiomeDocument {
    /// Unique name.
    pub name: String,
    /// Selection condition; required on every biome but the last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Palette override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub palette: Vec<PaletteLayerDocument>,
}

/// One `[[structures.rules]]` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructureRuleDocument {
    /// Unique rule name.
    pub name: String,
    /// Schematic library entry.
    pub schematic: String,
    /// Probability per attempt, `[0, 1]`.
    #[serde(default = "default_structure_chance")]
    pub chance: f64,
    /// Attempts per region.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Allowed biomes; empty allows all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub biomes: Vec<String>,
    /// Site requirement.
    #[serde(default)]
    pub spawn: SpawnRequirement,
    /// Open blocks required above the origin.
    #[serde(default)]
    pub clearance: u32,
    /// Minimum distance between two structures of this rule.
    #[serde(default)]
    pub spacing: u32,
    /// Vertical search.
    #[serde(default)]
    pub search: SearchMode,
    /// Seed salt; defaults to a hash of the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<i64>,
}

/// The `[structures]` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuresDocument {
    /// Placement region edge in blocks.
    #[serde(default = "default_region_size")]
    pub region_size: i32,
    /// Rules, decided in this order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<StructureRuleDocument>,
}

impl Default for StructuresDocument {
    fn default() -> Self {
        Self {
            region_size: default_region_size(),
            rules: Vec::new(),
        }
    }
}

/// One `[[carvers]]` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarverDocument {
    /// Unique name.
    pub name: String,
    /// Percent chance per chunk.
    #[serde(default = "default_carver_chance")]
    pub chance: f64,
    /// Per-biome percent overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub biome_chance: BTreeMap<String, f64>,
    /// Start height.
    #[serde(default = "default_carver_height")]
    pub height: IntRange,
    /// Worm length.
    #[serde(default = "default_carver_length")]
    pub length: IntRange,
    /// Tunnel radius.
    #[serde(default = "default_carver_radius")]
    pub radius: FloatRange,
    /// Per-axis radius scale.
    #[serde(default = "default_radius_multiplier")]
    pub radius_multiplier: [f64; 3],
    /// Per-axis spread of the initial direction.
    #[serde(default = "default_carver_start")]
    pub start: [f64; 3],
    /// Per-axis turn rate, then radius drift.
    #[serde(default = "default_carver_mutate")]
    pub mutate: [f64; 4],
    /// Distance per step.
    #[serde(default = "default_carver_step")]
    pub step: f64,
    /// Steps between direction changes.
    #[serde(default = "default_carver_recalc")]
    pub recalc: IntRange,
    /// Size of a direction change.
    #[serde(default = "default_recalc_magnitude")]
    pub recalc_magnitude: f64,
    /// Blocks cut from the top of each step.
    #[serde(default)]
    pub top_cut: u32,
    /// Blocks cut from the bottom of each step.
    #[serde(default)]
    pub bottom_cut: u32,
    /// Seed salt; defaults to a hash of the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<i64>,
}

/// One `[[ores]]` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OreDocument {
    /// Material placed.
    pub material: String,
    /// Materials replaced.
    #[serde(default = "default_ore_replace")]
    pub replace: Vec<String>,
    /// Vein center height.
    #[serde(default = "default_ore_height")]
    pub height: IntRange,
    /// Veins per chunk.
    #[serde(default = "default_ore_veins")]
    pub veins: IntRange,
    /// Blob radius.
    #[serde(default = "default_ore_size")]
    pub size: FloatRange,
    /// Allowed biomes; empty allows all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub biomes: Vec<String>,
    /// Seed salt; defaults to a hash of the material and index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<i64>,
}

/// The raw, versioned config document.
///
/// Field order matches the canonical file layout so that
/// [`GenerationConfig::to_toml_string`] writes scalars before tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Document format version.
    pub version: u32,
    /// World type name.
    pub name: String,
    /// Default world seed; the host may override it.
    #[serde(default)]
    pub seed: i64,
    /// Fluid level; non-solid points at or below it become `fluid`.
    #[serde(default = "default_sea_level")]
    pub sea_level: i32,
    /// Fluid material.
    #[serde(default = "default_fluid")]
    pub fluid: String,
    /// Named constants, visible in every expression.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constants: BTreeMap<String, f64>,
    /// Noise layers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub noise: Vec<NoiseDocument>,
    /// Terrain fields.
    pub fields: FieldsDocument,
    /// Values substituted for failing evaluations.
    #[serde(default)]
    pub fallback: FallbackDocument,
    /// Global palette.
    pub palette: Vec<PaletteLayerDocument>,
    /// Biomes, in selection order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub biomes: Vec<BiomeDocument>,
    /// Structure placement.
    #[serde(default)]
    pub structures: StructuresDocument,
    /// Cave carvers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub carvers: Vec<CarverDocument>,
    /// Ore veins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ores: Vec<OreDocument>,
}

fn default_dimensions() -> u8 {
    2
}
fn default_frequency() -> f64 {
    0.01
}
fn default_octaves() -> u32 {
    4
}
fn default_persistence() -> f64 {
    0.5
}
fn default_lacunarity() -> f64 {
    2.0
}
fn default_fallback_density() -> f64 {
    -1.0
}
fn default_structure_chance() -> f64 {
    1.0
}
fn default_attempts() -> u32 {
    1
}
fn default_region_size() -> i32 {
    64
}
fn default_carver_chance() -> f64 {
    5.0
}
fn default_carver_height() -> IntRange {
    IntRange::new(8, 64)
}
fn default_carver_length() -> IntRange {
    IntRange::new(60, 120)
}
fn default_carver_radius() -> FloatRange {
    FloatRange::new(2.0, 4.0)
}
fn default_radius_multiplier() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}
fn default_carver_start() -> [f64; 3] {
    [1.0, 0.3, 1.0]
}
fn default_carver_mutate() -> [f64; 4] {
    [2.0, 1.0, 2.0, 0.4]
}
fn default_carver_step() -> f64 {
    2.0
}
fn default_carver_recalc() -> IntRange {
    IntRange::new(8, 10)
}
fn default_recalc_magnitude() -> f64 {
    3.0
}
fn default_ore_replace() -> Vec<String> {
    vec![String::from("stone")]
}
fn default_ore_height() -> IntRange {
    IntRange::new(0, 64)
}
fn default_ore_veins() -> IntRange {
    IntRange::new(1, 4)
}
fn default_ore_size() -> FloatRange {
    FloatRange::new(2.0, 3.5)
}
fn default_sea_level() -> i32 {
    62
}
fn default_fluid() -> String {
    String::from("water")
}

/// Only the version key, read before the strict parse.
#[derive(Deserialize)]
struct VersionProbe {
    version: Option<u32>,
}

/// 1-based line and column of a byte offset.
pub(crate) fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &text[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map_or(0, |tail| tail.chars().count())
        + 1;
    (line, column)
}

fn syntax_error(text: &str, error: &toml::de::Error) -> ConfigError {
    let (line, column) = error
        .span()
        .map_or((1, 1), |span| line_column(text, span.start));
    ConfigError::Syntax {
        line,
        column,
        message: error.message().to_string(),
    }
}

impl GenerationConfig {
    /// Parses a document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Syntax`] with line and column for malformed
    /// TOML or unknown keys, [`ConfigError::UnsupportedVersion`] for another
    /// format version.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let probe: VersionProbe = toml::from_str(text).map_err(|e| syntax_error(text, &e))?;
        match probe.version {
            None => return Err(ConfigError::invalid("version", "missing")),
            Some(found) if found != CONFIG_VERSION => {
                return Err(ConfigError::UnsupportedVersion {
                    found,
                    supported: CONFIG_VERSION,
                })
            }
            Some(_) => {}
        }
        toml::from_str(text).map_err(|e| syntax_error(text, &e))
    }

    /// Reads and parses a document file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`GenerationConfig::from_toml_str`].
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Writes the document back as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if a value has no TOML form.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            message: e.to_string(),
        })
    }
}

// =============================================================================
// Materials
// =============================================================================

/// Interned material names. Index 0 is always `air`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialTable {
    names: Vec<String>,
    ids: HashMap<String, MaterialId>,
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialTable {
    /// A table holding only `air`.
    #[must_use]
    pub fn new() -> Self {
        let mut table = Self {
            names: Vec::new(),
            ids: HashMap::new(),
        };
        table.names.push(String::from("air"));
        table.ids.insert(String::from("air"), MaterialId::AIR);
        table
    }

    /// Returns the id of `name`, adding it if new.
    ///
    /// `None` once the table is full.
    pub fn intern(&mut self, name: &str) -> Option<MaterialId> {
        if let Some(id) = self.ids.get(name) {
            return Some(*id);
        }
        let id = MaterialId(u16::try_from(self.names.len()).ok()?);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        Some(id)
    }

    /// Id of an interned name.
    #[must_use]
    pub fn id(&self, name: &str) -> Option<MaterialId> {
        self.ids.get(name).copied()
    }

    /// Name of an id.
    #[must_use]
    pub fn name(&self, id: MaterialId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    /// Number of materials, `air` included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false; `air` is always present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Every material in id order.
    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (MaterialId(i as u16), name.as_str()))
    }

    fn intern_at(&mut self, key: &str, name: &str) -> ConfigResult<MaterialId> {
        if name.trim().is_empty() {
            return Err(ConfigError::invalid(key, "material name is empty"));
        }
        self.intern(name)
            .ok_or_else(|| ConfigError::invalid(key, "too many distinct materials"))
    }
}

// =============================================================================
// Compiled config
// =============================================================================

/// A validated, compiled config. Immutable apart from the placement
/// coordinator's plan cache; share it as `Arc<CompiledConfig>`.
pub struct CompiledConfig {
    pub(crate) name: String,
    pub(crate) seed: WorldSeed,
    pub(crate) sea_level: i32,
    pub(crate) fluid: MaterialId,
    pub(crate) materials: MaterialTable,
    pub(crate) noise: Vec<NoiseLayer>,
    pub(crate) noise_2d: usize,
    pub(crate) height: Expression,
    pub(crate) density: Option<Expression>,
    pub(crate) fallback_height: f64,
    pub(crate) fallback_density: f64,
    pub(crate) palette: Palette,
    pub(crate) biomes: BiomeTable,
    pub(crate) carvers: Vec<Carver>,
    pub(crate) ores: Vec<OreVein>,
    pub(crate) structures: Vec<StructureRule>,
    pub(crate) coordinator: PlacementCoordinator,
    document: GenerationConfig,
}

impl CompiledConfig {
    /// Validates a document and compiles every expression.
    ///
    /// # Arguments
    ///
    /// * `document` - Parsed config
    /// * `library` - Schematics that structure rules may reference
    ///
    /// # Errors
    ///
    /// Returns the first problem found, located by key path.
    pub fn compile(document: &GenerationConfig, library: &SchematicLibrary) -> ConfigResult<Self> {
        Compiler::new(document, library).compile()
    }

    /// Parses and compiles a document in one step.
    ///
    /// # Errors
    ///
    /// As [`GenerationConfig::from_toml_str`] and [`CompiledConfig::compile`].
    pub fn from_toml_str(text: &str, library: &SchematicLibrary) -> ConfigResult<Self> {
        Self::compile(&GenerationConfig::from_toml_str(text)?, library)
    }

    /// World type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default seed from the document.
    #[must_use]
    pub const fn seed(&self) -> WorldSeed {
        self.seed
    }

    /// Fluid level.
    #[must_use]
    pub const fn sea_level(&self) -> i32 {
        self.sea_level
    }

    /// Fluid material.
    #[must_use]
    pub const fn fluid(&self) -> MaterialId {
        self.fluid
    }

    /// Every material the config can write.
    #[must_use]
    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    /// Noise layers in declaration order.
    #[must_use]
    pub fn noise_layers(&self) -> &[NoiseLayer] {
        &self.noise
    }

    /// Compiled height expression.
    #[must_use]
    pub fn height_expression(&self) -> &Expression {
        &self.height
    }

    /// Compiled density expression, if configured.
    #[must_use]
    pub fn density_expression(&self) -> Option<&Expression> {
        self.density.as_ref()
    }

    /// Biome table.
    #[must_use]
    pub fn biomes(&self) -> &BiomeTable {
        &self.biomes
    }

    /// Compiled carvers.
    #[must_use]
    pub fn carvers(&self) -> &[Carver] {
        &self.carvers
    }

    /// Largest carver reach in chunks, 0 without carvers.
    #[must_use]
    pub fn carver_range(&self) -> i32 {
        self.carvers.iter().map(Carver::reach_chunks).max().unwrap_or(0)
    }

    /// Compiled ore rules.
    #[must_use]
    pub fn ores(&self) -> &[OreVein] {
        &self.ores
    }

    /// Compiled structure rules.
    #[must_use]
    pub fn structure_rules(&self) -> &[StructureRule] {
        &self.structures
    }

    /// Region ledger for structure plans.
    #[must_use]
    pub fn coordinator(&self) -> &PlacementCoordinator {
        &self.coordinator
    }

    /// The document this config was compiled from.
    #[must_use]
    pub fn document(&self) -> &GenerationConfig {
        &self.document
    }
}

impl fmt::Debug for CompiledConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledConfig")
            .field("name", &self.name)
            .field("materials", &self.materials.len())
            .field("noise", &self.noise.len())
            .field("biomes", &self.biomes.len())
            .field("carvers", &self.carvers.len())
            .field("ores", &self.ores.len())
            .field("structures", &self.structures.len())
            .finish_non_exhaustive()
    }
}

fn scope_error(key: String, error: ScopeError) -> ConfigError {
    match error {
        ScopeError::Duplicate(name) => ConfigError::DuplicateName { key, name },
        other => ConfigError::Invalid {
            key,
            reason: other.to_string(),
        },
    }
}

fn salt_or(salt: Option<i64>, fallback: impl FnOnce() -> u64) -> u64 {
    salt.map_or_else(fallback, |s| s as u64)
}

fn finite(key: &str, value: f64) -> ConfigResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::invalid(key, "must be finite"))
    }
}

/// Which variables a scope exposes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Height,
    Biome,
    Density,
}

impl ScopeKind {
    const fn fixed(self) -> &'static [&'static str] {
        match self {
            Self::Height => &["x", "z"],
            Self::Biome => &["x", "z", "height"],
            Self::Density => &["x", "y", "z", "height"],
        }
    }
}

struct Compiler<'a> {
    doc: &'a GenerationConfig,
    library: &'a SchematicLibrary,
    materials: MaterialTable,
}

impl<'a> Compiler<'a> {
    fn new(doc: &'a GenerationConfig, library: &'a SchematicLibrary) -> Self {
        Self {
            doc,
            library,
            materials: MaterialTable::new(),
        }
    }

    /// The document, borrowed for `'a` rather than through `self`.
    const fn doc_ref(&self) -> &'a GenerationConfig {
        self.doc
    }

    fn compile(mut self) -> ConfigResult<CompiledConfig> {
        let doc = self.doc;

        if doc.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: doc.version,
                supported: CONFIG_VERSION,
            });
        }
        if doc.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        if doc.sea_level < 0 || doc.sea_level >= CHUNK_HEIGHT as i32 {
            return Err(ConfigError::invalid(
                "sea_level",
                format!("must lie within [0, {}]", CHUNK_HEIGHT - 1),
            ));
        }
        let fluid = self.materials.intern_at("fluid", &doc.fluid)?;

        let noise = self.noise_layers()?;
        let height_scope = self.scope(ScopeKind::Height)?;
        let biome_scope = self.scope(ScopeKind::Biome)?;
        let density_scope = self.scope(ScopeKind::Density)?;

        let height = compile_expression("fields.height", &doc.fields.height, &height_scope)?;
        let density = doc
            .fields
            .density
            .as_deref()
            .map(|text| compile_expression("fields.density", text, &density_scope))
            .transpose()?;

        let fallback_height = finite(
            "fallback.height",
            doc.fallback.height.unwrap_or(f64::from(doc.sea_level)),
        )?;
        let fallback_density = finite("fallback.density", doc.fallback.density)?;

        let palette = self
            .palette("palette", &doc.palette)?
            .ok_or_else(|| ConfigError::invalid("palette", "needs at least one layer"))?;
        let biomes = self.biomes(&biome_scope)?;
        let carvers = self.carvers(&biomes)?;
        let ores = self.ores(&biomes)?;
        let (region_size, structures) = self.structures(&biomes)?;

        Ok(CompiledConfig {
            name: doc.name.clone(),
            seed: WorldSeed::new(doc.seed as u64),
            sea_level: doc.sea_level,
            fluid,
            materials: self.materials,
            noise_2d: noise.iter().filter(|layer| !layer.three_d).count(),
            noise,
            height,
            density,
            fallback_height,
            fallback_density,
            palette,
            biomes,
            carvers,
            ores,
            structures,
            coordinator: PlacementCoordinator::new(region_size),
            document: doc.clone(),
        })
    }

    fn noise_layers(&self) -> ConfigResult<Vec<NoiseLayer>> {
        if self.doc.noise.len() > MAX_NOISE_LAYERS {
            return Err(ConfigError::invalid(
                "noise",
                format!("at most {MAX_NOISE_LAYERS} layers"),
            ));
        }

        self.doc
            .noise
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                let key = |field: &str| format!("noise[{i}].{field}");
                let three_d = match layer.dimensions {
                    2 => false,
                    3 => true,
                    _ => return Err(ConfigError::invalid(key("dimensions"), "must be 2 or 3")),
                };
                if !(layer.frequency.is_finite() && layer.frequency > 0.0) {
                    return Err(ConfigError::invalid(key("frequency"), "must be positive"));
                }
                if !(1..=16).contains(&layer.octaves) {
                    return Err(ConfigError::invalid(key("octaves"), "must lie within [1, 16]"));
                }
                Ok(NoiseLayer {
                    name: layer.name.clone(),
                    kind: layer.kind,
                    three_d,
                    frequency: layer.frequency,
                    octaves: layer.octaves,
                    persistence: finite(&key("persistence"), layer.persistence)?,
                    lacunarity: finite(&key("lacunarity"), layer.lacunarity)?,
                    salt: salt_or(layer.salt, || name_salt(&layer.name)),
                })
            })
            .collect()
    }

    /// Builds a scope: fixed variables, 2D noise, 3D noise (density only),
    /// then constants.
    fn scope(&self, kind: ScopeKind) -> ConfigResult<Scope> {
        let mut scope = Scope::new();
        for name in kind.fixed() {
            scope
                .add_variable(name)
                .map_err(|e| scope_error(String::from("noise"), e))?;
        }

        let layers = self.doc.noise.iter().enumerate();
        let flat = layers.clone().filter(|(_, layer)| layer.dimensions != 3);
        let deep = layers.filter(|(_, layer)| layer.dimensions == 3);
        for (i, layer) in flat {
            scope
                .add_variable(&layer.name)
                .map_err(|e| scope_error(format!("noise[{i}].name"), e))?;
        }
        if kind == ScopeKind::Density {
            for (i, layer) in deep {
                scope
                    .add_variable(&layer.name)
                    .map_err(|e| scope_error(format!("noise[{i}].name"), e))?;
            }
        } else {
            // 3D names are only bound per point, but still may not shadow
            // anything another scope defines.
            for (i, layer) in deep {
                if scope.slot(&layer.name).is_some() || self.doc.constants.contains_key(&layer.name) {
                    return Err(ConfigError::DuplicateName {
                        key: format!("noise[{i}].name"),
                        name: layer.name.clone(),
                    });
                }
            }
        }

        scope
            .add_constant("sea_level", f64::from(self.doc.sea_level))
            .map_err(|e| scope_error(String::from("sea_level"), e))?;
        for (name, value) in &self.doc.constants {
            scope
                .add_constant(name, *value)
                .map_err(|e| scope_error(format!("constants.{name}"), e))?;
        }
        Ok(scope)
    }

    fn palette(
        &mut self,
        key: &str,
        layers: &[PaletteLayerDocument],
    ) -> ConfigResult<Option<Palette>> {
        let mut compiled = Vec::with_capacity(layers.len());
        for (j, layer) in layers.iter().enumerate() {
            let at = format!("{key}[{j}]");
            let material = self.materials.intern_at(&format!("{at}.material"), &layer.material)?;
            let min = layer.min.unwrap_or(f64::NEG_INFINITY);
            let max = layer.max.unwrap_or(f64::INFINITY);
            if min.is_nan() || max.is_nan() || min >= max {
                return Err(ConfigError::invalid(at, "expected min < max"));
            }
            compiled.push(PaletteLayer { material, min, max });
        }
        Ok(Palette::new(compiled))
    }

    fn biomes(&mut self, scope: &Scope) -> ConfigResult<BiomeTable> {
        let docs = &self.doc_ref().biomes;
        if docs.len() > MAX_BIOMES {
            return Err(ConfigError::invalid("biomes", format!("at most {MAX_BIOMES} biomes")));
        }

        let mut seen = HashSet::new();
        let mut biomes = Vec::with_capacity(docs.len());
        for (i, biome) in docs.iter().enumerate() {
            if !seen.insert(biome.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    key: format!("biomes[{i}].name"),
                    name: biome.name.clone(),
                });
            }
            let last = i + 1 == docs.len();
            let key = format!("biomes[{i}].condition");
            let condition = match (&biome.condition, last) {
                (Some(_), true) => {
                    return Err(ConfigError::invalid(key, "the last biome must not have a condition"))
                }
                (None, false) => {
                    return Err(ConfigError::invalid(key, "required on every biome but the last"))
                }
                (Some(text), false) => Some(compile_expression(&key, text, scope)?),
                (None, true) => None,
            };
            let palette = self.palette(&format!("biomes[{i}].palette"), &biome.palette)?;
            biomes.push(Biome {
                name: biome.name.clone(),
                condition,
                palette,
            });
        }
        Ok(BiomeTable::new(biomes))
    }

    fn biome_ids(table: &BiomeTable, key: &str, names: &[String]) -> ConfigResult<Vec<BiomeId>> {
        names
            .iter()
            .map(|name| {
                table.id_of(name).ok_or_else(|| ConfigError::UnknownBiome {
                    key: key.to_string(),
                    name: name.clone(),
                })
            })
            .collect()
    }

    fn carvers(&mut self, table: &BiomeTable) -> ConfigResult<Vec<Carver>> {
        let mut seen = HashSet::new();
        let mut carvers = Vec::with_capacity(self.doc.carvers.len());
        let top = CHUNK_HEIGHT as i32 - 1;

        for (i, doc) in self.doc_ref().carvers.iter().enumerate() {
            let key = |field: &str| format!("carvers[{i}].{field}");
            if !seen.insert(doc.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    key: key("name"),
                    name: doc.name.clone(),
                });
            }

            let percent = |key: String, value: f64| {
                if (0.0..=100.0).contains(&value) {
                    Ok(value)
                } else {
                    Err(ConfigError::invalid(key, "must be a percentage in [0, 100]"))
                }
            };
            let mut biome_chance = Vec::with_capacity(doc.biome_chance.len());
            for (name, chance) in &doc.biome_chance {
                let id = table.id_of(name).ok_or_else(|| ConfigError::UnknownBiome {
                    key: key("biome_chance"),
                    name: name.clone(),
                })?;
                biome_chance.push((id, percent(format!("carvers[{i}].biome_chance.{name}"), *chance)?));
            }

            let positive = |field: &str, value: f64| {
                if value.is_finite() && value > 0.0 {
                    Ok(value)
                } else {
                    Err(ConfigError::invalid(key(field), "must be positive"))
                }
            };
            for (axis, value) in doc.radius_multiplier.iter().enumerate() {
                positive(&format!("radius_multiplier[{axis}]"), *value)?;
            }
            for (field, values) in [("start", &doc.start[..]), ("mutate", &doc.mutate[..])] {
                if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    return Err(ConfigError::invalid(key(field), "must be finite and non-negative"));
                }
            }

            let carver = Carver {
                name: doc.name.clone(),
                chance: percent(key("chance"), doc.chance)?,
                biome_chance,
                height: doc.height.validate(&key("height"), 0, top)?,
                length: doc.length.validate(&key("length"), 0, i32::MAX)?,
                radius: doc.radius.validate(&key("radius"), 1.0, f64::from(CHUNK_SIZE as u32))?,
                radius_multiplier: doc.radius_multiplier,
                start: doc.start,
                mutate: doc.mutate,
                step: positive("step", doc.step)?,
                recalc: doc.recalc.validate(&key("recalc"), 1, i32::MAX)?,
                recalc_magnitude: finite(&key("recalc_magnitude"), doc.recalc_magnitude)?,
                top_cut: doc.top_cut,
                bottom_cut: doc.bottom_cut,
                salt: salt_or(doc.salt, || name_salt(&doc.name)),
            };
            if carver.reach_chunks() > MAX_CARVER_REACH {
                return Err(ConfigError::invalid(
                    key("length"),
                    format!(
                        "worms would reach {} chunks, at most {MAX_CARVER_REACH} allowed",
                        carver.reach_chunks()
                    ),
                ));
            }
            carvers.push(carver);
        }
        Ok(carvers)
    }

    fn ores(&mut self, table: &BiomeTable) -> ConfigResult<Vec<OreVein>> {
        let mut ores = Vec::with_capacity(self.doc.ores.len());
        let top = CHUNK_HEIGHT as i32 - 1;

        for (i, doc) in self.doc_ref().ores.iter().enumerate() {
            let key = |field: &str| format!("ores[{i}].{field}");
            let material = self.materials.intern_at(&key("material"), &doc.material)?;
            if doc.replace.is_empty() {
                return Err(ConfigError::invalid(key("replace"), "needs at least one material"));
            }
            let replace = doc
                .replace
                .iter()
                .enumerate()
                .map(|(j, name)| self.materials.intern_at(&format!("ores[{i}].replace[{j}]"), name))
                .collect::<ConfigResult<Vec<_>>>()?;

            ores.push(OreVein {
                material,
                replace,
                height: doc.height.validate(&key("height"), 0, top)?,
                veins: doc.veins.validate(&key("veins"), 0, 64)?,
                size: doc.size.validate(&key("size"), 0.5, f64::from(CHUNK_SIZE as u32))?,
                biomes: Self::biome_ids(table, &key("biomes"), &doc.biomes)?,
                salt: salt_or(doc.salt, || name_salt(&format!("{}#{i}", doc.material))),
            });
        }
        Ok(ores)
    }

    fn structures(&mut self, table: &BiomeTable) -> ConfigResult<(i32, Vec<StructureRule>)> {
        let doc = &self.doc_ref().structures;
        let region_size = doc.region_size;
        if !(CHUNK_SIZE as i32..=1024).contains(&region_size) {
            return Err(ConfigError::invalid(
                "structures.region_size",
                format!("must lie within [{CHUNK_SIZE}, 1024]"),
            ));
        }

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(doc.rules.len());
        for (i, rule) in doc.rules.iter().enumerate() {
            let key = |field: &str| format!("structures.rules[{i}].{field}");
            if !seen.insert(rule.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    key: key("name"),
                    name: rule.name.clone(),
                });
            }
            let schematic = self
                .library
                .get(&rule.schematic)
                .ok_or_else(|| ConfigError::UnknownSchematic {
                    key: key("schematic"),
                    name: rule.schematic.clone(),
                })?;
            if !(0.0..=1.0).contains(&rule.chance) {
                return Err(ConfigError::invalid(key("chance"), "must lie within [0, 1]"));
            }
            if rule.attempts > 256 {
                return Err(ConfigError::invalid(key("attempts"), "at most 256"));
            }
            let top = CHUNK_HEIGHT as i32 - 1;
            match rule.search {
                SearchMode::Surface => {}
                SearchMode::Fixed { y } => {
                    IntRange::new(y, y).validate(&key("search.y"), 0, top)?;
                }
                SearchMode::Scan { min, max } => {
                    IntRange::new(min, max).validate(&key("search"), 0, top)?;
                }
            }

            let materials = schematic
                .palette()
                .iter()
                .enumerate()
                .map(|(j, name)| {
                    self.materials
                        .intern_at(&format!("{}.palette[{j}]", key("schematic")), name)
                })
                .collect::<ConfigResult<Vec<_>>>()?;

            let compiled = StructureRule {
                name: rule.name.clone(),
                schematic: Arc::clone(schematic),
                materials,
                chance: rule.chance,
                attempts: rule.attempts,
                biomes: Self::biome_ids(table, &key("biomes"), &rule.biomes)?,
                spawn: rule.spawn,
                clearance: rule.clearance,
                spacing: rule.spacing,
                search: rule.search,
                salt: salt_or(rule.salt, || name_salt(&rule.name)),
            };
            if compiled.origin_range(region_size).is_none() {
                return Err(ConfigError::invalid(
                    key("schematic"),
                    format!("footprint plus spacing does not fit a {region_size} block region"),
                ));
            }
            rules.push(compiled);
        }
        Ok((region_size, rules))
    }
}

fn compile_expression(key: &str, text: &str, scope: &Scope) -> ConfigResult<Expression> {
    Expression::compile(text, scope).map_err(|source| ConfigError::Expression {
        key: key.to_string(),
        source,
    })
}
