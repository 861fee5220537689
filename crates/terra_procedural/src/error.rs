//! # Procedural Error Types
//!
//! Load-time failures are fatal and precise: they name the line and column
//! of a syntax error or the key path of a semantic one. Generation itself
//! only fails for coordinates outside the supported range; everything else
//! degrades to configured fallbacks and is reported.

use std::path::PathBuf;

use thiserror::Error;

use crate::chunk::ChunkCoord;
use crate::structure::RegionCoord;

/// Errors raised while loading or compiling a generation config.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document is not valid TOML or does not match the schema.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// 1-based line.
        line: usize,
        /// 1-based column.
        column: usize,
        /// Parser message.
        message: String,
    },

    /// The `version` key names a format this build does not read.
    #[error("unsupported config version {found}, expected {supported}")]
    UnsupportedVersion {
        /// Version in the document.
        found: u32,
        /// Version this build reads.
        supported: u32,
    },

    /// An expression failed to compile.
    #[error("expression at `{key}`: {source}")]
    Expression {
        /// Key path of the expression (e.g. `fields.height`).
        key: String,
        /// Positioned compile error.
        #[source]
        source: terra_expr::ParseError,
    },

    /// A value is out of range or inconsistent.
    #[error("invalid value at `{key}`: {reason}")]
    Invalid {
        /// Key path of the value.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A structure rule names a schematic the library does not hold.
    #[error("unknown schematic `{name}` at `{key}`")]
    UnknownSchematic {
        /// Key path of the reference.
        key: String,
        /// The missing schematic.
        name: String,
    },

    /// A reference to a biome the config does not declare.
    #[error("unknown biome `{name}` at `{key}`")]
    UnknownBiome {
        /// Key path of the reference.
        key: String,
        /// The missing biome.
        name: String,
    },

    /// Two entries of the same kind share a name.
    #[error("duplicate name `{name}` at `{key}`")]
    DuplicateName {
        /// Key path of the second entry.
        key: String,
        /// The repeated name.
        name: String,
    },

    /// The document could not be written back as TOML.
    #[error("cannot serialize config: {message}")]
    Serialize {
        /// Serializer message.
        message: String,
    },

    /// The config file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Builds an [`ConfigError::Invalid`].
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for config loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading schematic assets.
#[derive(Error, Debug)]
pub enum SchematicError {
    /// The asset is not valid TOML or does not match the layer format.
    #[error("schematic `{name}`: syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// Asset name or file.
        name: String,
        /// 1-based line.
        line: usize,
        /// 1-based column.
        column: usize,
        /// Parser message.
        message: String,
    },

    /// The asset parsed but describes an impossible lattice.
    #[error("schematic `{name}`: {reason}")]
    Invalid {
        /// Asset name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Two assets share a name.
    #[error("duplicate schematic `{0}`")]
    Duplicate(String),

    /// The asset could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File or directory that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for schematic loading.
pub type SchematicResult<T> = Result<T, SchematicError>;

/// Fatal chunk generation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The coordinate lies outside the supported world.
    #[error("chunk {coord} is outside the supported range")]
    OutOfRange {
        /// Requested coordinate.
        coord: ChunkCoord,
    },
}

/// Result type for chunk generation.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Placement coordinator failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// Another thread held the region lock past the timeout.
    #[error("region {region} is being planned by another thread")]
    Contended {
        /// The contended region.
        region: RegionCoord,
    },
}

/// Packed chunk decoding failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkDataError {
    /// LZ4 rejected the block.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// The block decoded to the wrong length.
    #[error("invalid chunk data size: expected {expected} bytes, found {found}")]
    Size {
        /// Bytes a chunk packs to.
        expected: usize,
        /// Bytes decoded.
        found: usize,
    },
}

/// Result type for chunk decoding.
pub type ChunkDataResult<T> = Result<T, ChunkDataError>;
