//! # Biome Table
//!
//! Biomes are tried in declaration order; a column belongs to the first
//! biome whose condition is truthy. The last biome has no condition and
//! catches every remaining column.
//!
//! A condition that fails to evaluate counts as false. The caller is told
//! so it can report the fallback.

use terra_expr::{EvalError, Evaluator, Expression};

use crate::chunk::BiomeId;
use crate::palette::Palette;

/// Most biomes a table can hold (ids are `u8`).
pub const MAX_BIOMES: usize = 255;

/// A compiled biome.
#[derive(Clone, Debug)]
pub struct Biome {
    /// Name, referenced by structure rules, carvers and ores.
    pub name: String,
    /// Selection condition over the biome scope; `None` for the catch-all.
    pub condition: Option<Expression>,
    /// Palette override; `None` uses the global palette.
    pub palette: Option<Palette>,
}

impl Biome {
    /// A catch-all biome using the global palette.
    #[must_use]
    pub fn catch_all(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: None,
            palette: None,
        }
    }
}

/// Outcome of [`BiomeTable::select`].
#[derive(Clone, Debug, PartialEq)]
pub struct BiomeChoice {
    /// Selected biome.
    pub id: BiomeId,
    /// First condition error met on the way, if any.
    pub error: Option<EvalError>,
}

/// Ordered biome list.
#[derive(Clone, Debug)]
pub struct BiomeTable {
    biomes: Vec<Biome>,
}

impl BiomeTable {
    /// Wraps validated biomes. An empty list gets a single `default` biome.
    #[must_use]
    pub fn new(mut biomes: Vec<Biome>) -> Self {
        if biomes.is_empty() {
            biomes.push(Biome::catch_all("default"));
        }
        Self { biomes }
    }

    /// Number of biomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.biomes.len()
    }

    /// Always false; a table holds at least the catch-all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.biomes.is_empty()
    }

    /// Biome by id.
    #[must_use]
    pub fn get(&self, id: BiomeId) -> Option<&Biome> {
        self.biomes.get(id.index())
    }

    /// Id of a biome by name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<BiomeId> {
        self.biomes
            .iter()
            .position(|biome| biome.name == name)
            .and_then(|index| u8::try_from(index).ok())
            .map(BiomeId)
    }

    /// Biomes in selection order.
    pub fn iter(&self) -> impl Iterator<Item = &Biome> {
        self.biomes.iter()
    }

    /// Selects the biome for a column.
    ///
    /// # Arguments
    ///
    /// * `evaluator` - Scratch stack
    /// * `slots` - Biome scope values (`x`, `z`, `height`, 2D noise)
    pub fn select(&self, evaluator: &mut Evaluator, slots: &[f64]) -> BiomeChoice {
        let mut error = None;
        for (index, biome) in self.biomes.iter().enumerate() {
            let matched = match &biome.condition {
                None => true,
                Some(condition) => match condition.evaluate_with(evaluator, slots) {
                    Ok(value) => value != 0.0,
                    Err(e) => {
                        error.get_or_insert(e);
                        false
                    }
                },
            };
            if matched {
                return BiomeChoice {
                    id: BiomeId(index as u8),
                    error,
                };
            }
        }
        // Unreachable for validated tables: the last biome is unconditional.
        BiomeChoice {
            id: BiomeId((self.biomes.len().saturating_sub(1)) as u8),
            error,
        }
    }

    /// Palette of a biome, or `global` when it has none.
    #[inline]
    #[must_use]
    pub fn palette_for<'a>(&'a self, id: BiomeId, global: &'a Palette) -> &'a Palette {
        self.get(id)
            .and_then(|biome| biome.palette.as_ref())
            .unwrap_or(global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::MaterialId;
    use crate::palette::PaletteLayer;
    use terra_expr::Scope;

    fn table() -> BiomeTable {
        let scope = Scope::with_variables(["x", "z", "height"]).unwrap();
        let condition = |text: &str| Some(Expression::compile(text, &scope).unwrap());
        BiomeTable::new(vec![
            Biome {
                name: "peaks".into(),
                condition: condition("height > 100"),
                palette: Palette::new(vec![PaletteLayer::solid(MaterialId(7))]),
            },
            Biome {
                name: "broken".into(),
                condition: condition("1 / (x - 5) > 0.5"),
                palette: None,
            },
            Biome::catch_all("plains"),
        ])
    }

    #[test]
    fn test_first_truthy_condition_wins() {
        let table = table();
        let mut evaluator = Evaluator::new();
        assert_eq!(table.select(&mut evaluator, &[0.0, 0.0, 120.0]).id, BiomeId(0));
        assert_eq!(table.select(&mut evaluator, &[6.0, 0.0, 70.0]).id, BiomeId(1));
        assert_eq!(table.select(&mut evaluator, &[0.0, 0.0, 70.0]).id, BiomeId(2));
        assert_eq!(table.id_of("plains"), Some(BiomeId(2)));
        assert_eq!(table.id_of("desert"), None);
    }

    #[test]
    fn test_failing_condition_is_false() {
        let table = table();
        let choice = table.select(&mut Evaluator::new(), &[5.0, 0.0, 70.0]);
        assert_eq!(choice.id, BiomeId(2));
        assert_eq!(choice.error, Some(EvalError::DivisionByZero));
    }

    #[test]
    fn test_palette_override() {
        let table = table();
        let global = Palette::new(vec![PaletteLayer::solid(MaterialId(1))]).unwrap();
        assert_eq!(table.palette_for(BiomeId(0), &global).material_for(1.0), MaterialId(7));
        assert_eq!(table.palette_for(BiomeId(2), &global).material_for(1.0), MaterialId(1));
    }

    #[test]
    fn test_empty_table_gets_default() {
        let table = BiomeTable::new(Vec::new());
        assert_eq!(table.len(), 1);
        assert_eq!(table.select(&mut Evaluator::new(), &[]).id, BiomeId(0));
    }
}
