use crate::models::{CellConflictMap, CellRecord, GameData, PluginRecord};
use std::collections::HashSet;

/// Derives the overworld cell edit map from reconciled plugin records.
///
/// Only edits on the overworld grid are in scope: the cell must have concrete
/// coordinates, sit in the overworld worldspace, and belong to a plugin whose first
/// master is the base-game master. Canonical masters never contribute, whatever their
/// enabled flag says.
#[derive(Debug, Clone)]
pub struct CellConflictService {
    game: GameData,
}

impl CellConflictService {
    pub fn new(game: GameData) -> Self {
        Self { game }
    }

    pub fn game(&self) -> &GameData {
        &self.game
    }

    /// Aggregate every enabled record, in order.
    ///
    /// A cell edited by more than one enabled plugin is marked conflicted; contributors
    /// are listed in reconciled order.
    pub fn aggregate(&self, records: &[PluginRecord]) -> CellConflictMap {
        let mut map = CellConflictMap::new();

        for record in records.iter().filter(|r| r.enabled) {
            for (x, y) in self.grid_edits(record) {
                map.record_edit(x, y, &record.filename);
            }
        }

        tracing::debug!(
            "Aggregated {} edited cells ({} conflicted)",
            map.len(),
            map.conflict_count()
        );

        map
    }

    /// Cells of a single plugin, regardless of its enabled flag.
    pub fn preview(&self, record: &PluginRecord) -> CellConflictMap {
        let mut map = CellConflictMap::new();
        for (x, y) in self.grid_edits(record) {
            map.record_edit(x, y, &record.filename);
        }
        map
    }

    /// Every loaded record with an in-scope edit of `(x, y)`, enabled or not.
    pub fn plugins_editing_cell<'a>(
        &self,
        records: &'a [PluginRecord],
        x: i32,
        y: i32,
    ) -> Vec<&'a PluginRecord> {
        records
            .iter()
            .filter(|record| self.grid_edits(record).contains(&(x, y)))
            .collect()
    }

    /// In-scope, deduplicated coordinates edited by one record, in first-seen order.
    pub fn grid_edits(&self, record: &PluginRecord) -> Vec<(i32, i32)> {
        if !self.record_in_scope(record) {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        record
            .cells()
            .iter()
            .filter(|cell| self.cell_in_scope(cell))
            .filter_map(CellRecord::coords)
            .filter(|coords| seen.insert(*coords))
            .collect()
    }

    fn record_in_scope(&self, record: &PluginRecord) -> bool {
        !self.game.is_canonical_master(&record.filename)
            && record.first_master() == Some(self.game.base_master.as_str())
    }

    fn cell_in_scope(&self, cell: &CellRecord) -> bool {
        cell.world_form_id == Some(self.game.overworld_world_id)
    }
}

impl Default for CellConflictService {
    fn default() -> Self {
        Self::new(GameData::default())
    }
}
