use serde::Serialize;
use std::collections::BTreeMap;

/// Horizontal offset of the overworld grid origin.
pub const GRID_OFFSET_X: i64 = 57;
/// Vertical offset of the overworld grid origin.
pub const GRID_OFFSET_Y: i64 = 50;
/// Row stride of the dense grid id space.
pub const GRID_STRIDE: i64 = 1000;

/// Dense, non-negative (inside the playable area) key for an overworld cell.
///
/// `id = (x + 57) * 1000 + (50 - y)`, the key the map renderer uses for cell features.
pub fn grid_id(x: i32, y: i32) -> i64 {
    (i64::from(x) + GRID_OFFSET_X) * GRID_STRIDE + (GRID_OFFSET_Y - i64::from(y))
}

/// Inverse of [`grid_id`].
pub fn grid_coords(id: i64) -> (i32, i32) {
    let x = id.div_euclid(GRID_STRIDE) - GRID_OFFSET_X;
    let y = GRID_OFFSET_Y - id.rem_euclid(GRID_STRIDE);
    (x as i32, y as i32)
}

/// Edit state of one grid cell across the enabled plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellEntry {
    pub id: i64,
    pub x: i32,
    pub y: i32,
    /// Contributing plugins in reconciled order
    pub plugins: Vec<String>,
    pub conflicted: bool,
}

impl CellEntry {
    pub fn contributing_count(&self) -> usize {
        self.plugins.len()
    }
}

/// Grid id to [`CellEntry`] map handed to the map renderer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct CellConflictMap {
    cells: BTreeMap<i64, CellEntry>,
}

impl CellConflictMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `plugin` edits `(x, y)`.
    ///
    /// The first contributor marks the cell edited; any later one marks it conflicted.
    pub fn record_edit(&mut self, x: i32, y: i32, plugin: &str) {
        let id = grid_id(x, y);
        match self.cells.get_mut(&id) {
            Some(entry) => {
                entry.conflicted = true;
                entry.plugins.push(plugin.to_string());
            }
            None => {
                self.cells.insert(
                    id,
                    CellEntry {
                        id,
                        x,
                        y,
                        plugins: vec![plugin.to_string()],
                        conflicted: false,
                    },
                );
            }
        }
    }

    pub fn get(&self, id: i64) -> Option<&CellEntry> {
        self.cells.get(&id)
    }

    pub fn get_cell(&self, x: i32, y: i32) -> Option<&CellEntry> {
        self.get(grid_id(x, y))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellEntry> {
        self.cells.values()
    }

    pub fn conflicted(&self) -> impl Iterator<Item = &CellEntry> {
        self.cells.values().filter(|entry| entry.conflicted)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicted().count()
    }
}
