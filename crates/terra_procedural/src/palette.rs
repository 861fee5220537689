//! # Palettes
//!
//! Map a solid point's density to a material. Layers are tried in order;
//! the first whose `[min, max)` range holds the density wins. A density no
//! layer covers takes the last layer's material, so a palette always
//! answers.

use crate::chunk::MaterialId;

/// One density range of a palette.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaletteLayer {
    /// Material written for densities in range.
    pub material: MaterialId,
    /// Lower bound (inclusive).
    pub min: f64,
    /// Upper bound (exclusive).
    pub max: f64,
}

impl PaletteLayer {
    /// A layer covering every density.
    #[must_use]
    pub const fn solid(material: MaterialId) -> Self {
        Self {
            material,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    /// Returns true if `density` falls in `[min, max)`.
    #[inline]
    #[must_use]
    pub fn contains(&self, density: f64) -> bool {
        self.min <= density && density < self.max
    }
}

/// An ordered, non-empty list of density ranges.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    layers: Box<[PaletteLayer]>,
}

impl Palette {
    /// Creates a palette; `None` if `layers` is empty.
    #[must_use]
    pub fn new(layers: Vec<PaletteLayer>) -> Option<Self> {
        (!layers.is_empty()).then(|| Self {
            layers: layers.into_boxed_slice(),
        })
    }

    /// Material for a solid point.
    #[inline]
    #[must_use]
    pub fn material_for(&self, density: f64) -> MaterialId {
        self.layers
            .iter()
            .find(|layer| layer.contains(density))
            .or_else(|| self.layers.last())
            .map_or(MaterialId::AIR, |layer| layer.material)
    }

    /// Layers in match order.
    #[must_use]
    pub fn layers(&self) -> &[PaletteLayer] {
        &self.layers
    }
}
