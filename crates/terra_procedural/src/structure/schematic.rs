//! # Schematics
//!
//! Pre-authored, immutable block patterns.
//!
//! ## Asset Format
//!
//! ```toml
//! name = "hut"
//! anchor = [2, 0, 2]          # origin offset inside the lattice
//! void = "."                  # leaves terrain untouched (default ".")
//!
//! # Bottom to top. Each layer is a list of rows (z), each row a string (x).
//! layers = [
//!     ["#####", "#####", "#####", "#####", "#####"],
//!     ["#####", "#___#", "#___#", "#___#", "##_##"],
//! ]
//!
//! [legend]
//! "#" = "planks"
//! "_" = "air"                 # carves out air
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::line_column;
use crate::error::{SchematicError, SchematicResult};

/// An immutable 3D lattice of optional materials.
///
/// Materials are names local to the schematic ([`Schematic::palette`]);
/// a config maps them onto its own material table once at load time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schematic {
    name: String,
    /// Size as `[x, y, z]`.
    size: [usize; 3],
    /// Offset of the placement origin inside the lattice, `[x, y, z]`.
    anchor: [i32; 3],
    palette: Vec<String>,
    /// Palette indices, indexed `[y][z][x]`; `None` leaves terrain as is.
    blocks: Vec<Option<u16>>,
}

impl Schematic {
    /// Creates a schematic from a lattice of palette indices.
    ///
    /// # Errors
    ///
    /// Returns error if the lattice length does not match `size`, the size
    /// is zero or taller than a chunk, or an index is outside the palette.
    pub fn new(
        name: impl Into<String>,
        size: [usize; 3],
        anchor: [i32; 3],
        palette: Vec<String>,
        blocks: Vec<Option<u16>>,
    ) -> SchematicResult<Self> {
        let name = name.into();
        let invalid = |reason: String| SchematicError::Invalid {
            name: name.clone(),
            reason,
        };

        if size.iter().any(|&s| s == 0) {
            return Err(invalid(format!("empty size {size:?}")));
        }
        if size[1] > crate::chunk::CHUNK_HEIGHT {
            return Err(invalid(format!("{} layers is taller than the world", size[1])));
        }
        if blocks.len() != size[0] * size[1] * size[2] {
            return Err(invalid(format!(
                "lattice has {} cells, size {size:?} needs {}",
                blocks.len(),
                size[0] * size[1] * size[2]
            )));
        }
        if let Some(bad) = blocks.iter().flatten().find(|&&i| usize::from(i) >= palette.len()) {
            return Err(invalid(format!("palette index {bad} out of range")));
        }

        Ok(Self {
            name,
            size,
            anchor,
            palette,
            blocks,
        })
    }

    /// Parses the TOML layer format.
    ///
    /// # Errors
    ///
    /// Returns [`SchematicError::Syntax`] with line and column for malformed
    /// TOML, [`SchematicError::Invalid`] for ragged layers or unknown legend
    /// characters.
    pub fn from_toml_str(text: &str) -> SchematicResult<Self> {
        let document: SchematicDocument = toml::from_str(text).map_err(|e| {
            let (line, column) = e
                .span()
                .map_or((1, 1), |span| line_column(text, span.start));
            SchematicError::Syntax {
                name: String::from("<inline>"),
                line,
                column,
                message: e.message().to_string(),
            }
        })?;
        document.into_schematic()
    }

    /// Name used by structure rules.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size as `[x, y, z]`.
    #[must_use]
    pub const fn size(&self) -> [usize; 3] {
        self.size
    }

    /// Origin offset inside the lattice.
    #[must_use]
    pub const fn anchor(&self) -> [i32; 3] {
        self.anchor
    }

    /// Material names referenced by the lattice.
    #[must_use]
    pub fn palette(&self) -> &[String] {
        &self.palette
    }

    /// Palette index at a lattice position; `None` for void or out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<u16> {
        if x < self.size[0] && y < self.size[1] && z < self.size[2] {
            self.blocks[(y * self.size[2] + z) * self.size[0] + x]
        } else {
            None
        }
    }

    /// Number of non-void cells.
    #[must_use]
    pub fn filled_cells(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }
}

/// The on-disk layer format.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchematicDocument {
    name: String,
    #[serde(default)]
    anchor: [i32; 3],
    #[serde(default = "default_void")]
    void: String,
    legend: BTreeMap<String, String>,
    layers: Vec<Vec<String>>,
}

fn default_void() -> String {
    String::from(".")
}

fn single_char(text: &str) -> Option<char> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

impl SchematicDocument {
    fn into_schematic(self) -> SchematicResult<Schematic> {
        let invalid = |reason: String| SchematicError::Invalid {
            name: self.name.clone(),
            reason,
        };

        let void = single_char(&self.void)
            .ok_or_else(|| invalid(format!("void `{}` must be one character", self.void)))?;

        let mut palette = Vec::new();
        let mut legend: HashMap<char, u16> = HashMap::new();
        for (key, material) in &self.legend {
            let symbol = single_char(key)
                .ok_or_else(|| invalid(format!("legend key `{key}` must be one character")))?;
            if symbol == void {
                return Err(invalid(format!("legend redefines the void character `{void}`")));
            }
            let index = u16::try_from(palette.len())
                .map_err(|_| invalid(String::from("legend has too many entries")))?;
            palette.push(material.clone());
            legend.insert(symbol, index);
        }

        let height = self.layers.len();
        let depth = self.layers.first().map_or(0, Vec::len);
        let width = self
            .layers
            .first()
            .and_then(|layer| layer.first())
            .map_or(0, |row| row.chars().count());

        let mut blocks = Vec::with_capacity(width * height * depth);
        for (y, layer) in self.layers.iter().enumerate() {
            if layer.len() != depth {
                return Err(invalid(format!(
                    "layer {y} has {} rows, expected {depth}",
                    layer.len()
                )));
            }
            for (z, row) in layer.iter().enumerate() {
                if row.chars().count() != width {
                    return Err(invalid(format!(
                        "layer {y} row {z} has {} cells, expected {width}",
                        row.chars().count()
                    )));
                }
                for symbol in row.chars() {
                    if symbol == void {
                        blocks.push(None);
                    } else {
                        let index = legend.get(&symbol).ok_or_else(|| {
                            invalid(format!("layer {y} row {z}: `{symbol}` is not in the legend"))
                        })?;
                        blocks.push(Some(*index));
                    }
                }
            }
        }

        Schematic::new(self.name, [width, height, depth], self.anchor, palette, blocks)
    }
}

/// Named schematics, loaded once at startup and shared read-only.
#[derive(Clone, Debug, Default)]
pub struct SchematicLibrary {
    schematics: HashMap<String, Arc<Schematic>>,
}

impl SchematicLibrary {
    /// Creates an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a schematic under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`SchematicError::Duplicate`] if the name is taken.
    pub fn insert(&mut self, schematic: Schematic) -> SchematicResult<Arc<Schematic>> {
        if self.schematics.contains_key(schematic.name()) {
            return Err(SchematicError::Duplicate(schematic.name().to_string()));
        }
        let schematic = Arc::new(schematic);
        self.schematics
            .insert(schematic.name().to_string(), Arc::clone(&schematic));
        Ok(schematic)
    }

    /// Loads every `*.toml` file in `dir`.
    ///
    /// # Errors
    ///
    /// Returns the first read, parse or duplicate-name failure.
    pub fn load_dir(dir: &Path) -> SchematicResult<Self> {
        let io_error = |source| SchematicError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        // Directory order is platform dependent.
        paths.sort();

        let mut library = Self::new();
        for path in paths {
            let text = std::fs::read_to_string(&path).map_err(|source| SchematicError::Io {
                path: path.clone(),
                source,
            })?;
            let schematic = Schematic::from_toml_str(&text).map_err(|e| match e {
                SchematicError::Syntax {
                    line,
                    column,
                    message,
                    ..
                } => SchematicError::Syntax {
                    name: path.display().to_string(),
                    line,
                    column,
                    message,
                },
                other => other,
            })?;
            library.insert(schematic)?;
        }

        tracing::debug!(dir = %dir.display(), count = library.len(), "Loaded schematics");
        Ok(library)
    }

    /// Looks a schematic up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Schematic>> {
        self.schematics.get(name)
    }

    /// Number of schematics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schematics.len()
    }

    /// Returns true if the library is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schematics.is_empty()
    }

    /// Schematic names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schematics.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUT: &str = r####"
name = "hut"
anchor = [1, 0, 1]
layers = [
    ["###", "###", "###"],
    ["###", "#_#", "#.#"],
]

[legend]
"#" = "planks"
"_" = "air"
"####;

    #[test]
    fn test_parse_layers() {
        let hut = Schematic::from_toml_str(HUT).unwrap();
        assert_eq!(hut.size(), [3, 2, 3]);
        assert_eq!(hut.anchor(), [1, 0, 1]);
        // Legend keys are taken in sorted order.
        assert_eq!(hut.palette(), ["planks".to_string(), "air".to_string()]);
        assert_eq!(hut.get(0, 0, 0), Some(0));
        assert_eq!(hut.get(1, 1, 1), Some(1));
        assert_eq!(hut.get(1, 1, 2), None);
        assert_eq!(hut.get(3, 0, 0), None);
        assert_eq!(hut.filled_cells(), 17);
    }

    #[test]
    fn test_syntax_error_has_position() {
        let err = Schematic::from_toml_str("name = \"x\"\nlegend = ]\n").unwrap_err();
        assert!(matches!(err, SchematicError::Syntax { line: 2, .. }), "{err}");
    }

    #[test]
    fn test_ragged_layer_rejected() {
        let text = r####"
name = "bad"
layers = [["##", "#"]]
[legend]
"#" = "stone"
"####;
        assert!(matches!(
            Schematic::from_toml_str(text),
            Err(SchematicError::Invalid { .. })
        ));
    }

    #[test]
    fn test_unknown_symbol_rejected() {
        let text = r####"
name = "bad"
layers = [["#x"]]
[legend]
"#" = "stone"
"####;
        let err = Schematic::from_toml_str(text).unwrap_err();
        assert!(err.to_string().contains("`x` is not in the legend"), "{err}");
    }

    #[test]
    fn test_library_rejects_duplicates() {
        let mut library = SchematicLibrary::new();
        library.insert(Schematic::from_toml_str(HUT).unwrap()).unwrap();
        assert!(matches!(
            library.insert(Schematic::from_toml_str(HUT).unwrap()),
            Err(SchematicError::Duplicate(_))
        ));
        assert_eq!(library.names(), vec!["hut"]);
    }
}
