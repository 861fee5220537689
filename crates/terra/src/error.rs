//! # Host Error Types

use thiserror::Error;

use terra_procedural::{ConfigError, SchematicError};

/// Reasons a world refuses to activate.
#[derive(Error, Debug)]
pub enum ActivationError {
    /// The generation config failed to load or compile.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// A schematic asset failed to load.
    #[error("schematics: {0}")]
    Schematic(#[from] SchematicError),

    /// The host has no block for some materials.
    #[error("host cannot resolve material(s): {}", names.join(", "))]
    UnresolvedMaterials {
        /// Every unresolved name, in material id order.
        names: Vec<String>,
    },
}

/// Result type for activation.
pub type ActivationResult<T> = Result<T, ActivationError>;

/// Errors from the chunk scheduler.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// The request queue is at capacity.
    #[error("request queue is full")]
    QueueFull,

    /// The scheduler has been shut down.
    #[error("scheduler is shut down")]
    ShutDown,
}
