//! Load order reconciliation.
//!
//! Turns the unordered set of parsed plugins plus a `plugins.txt` style text into one
//! total order with enabled flags:
//!
//! ```text
//! [unlisted plugins, newest first] ++ [listed plugins, in text order]
//! ```
//!
//! The result depends only on the current record set and the text, never on the order
//! in which parse outcomes arrived, so it is safe to re-run after every single outcome.
//!
//! # Examples
//!
//! ```ignore
//! use cellmap::services::load_order::reconcile;
//!
//! let ordered = reconcile(records, "*Skyrim.esm\n*SkyUI_SE.esp\n");
//! ```

use crate::models::{PluginRecord, parse_load_order};
use indexmap::IndexMap;
use std::cmp::Ordering;

/// Reconcile `records` against a load order text.
///
/// - Lines are matched by exact filename; unmatched and repeated lines are dropped.
/// - Listed records take their enabled flag from the line, except failed records,
///   which are always disabled.
/// - Unlisted records keep their current enabled flag and sort before every listed one,
///   most recently modified first (filename breaks ties).
pub fn reconcile(records: Vec<PluginRecord>, load_order: &str) -> Vec<PluginRecord> {
    let mut remaining: IndexMap<String, PluginRecord> = records
        .into_iter()
        .map(|record| (record.filename.clone(), record))
        .collect();

    let mut ordered = Vec::with_capacity(remaining.len());

    for line in parse_load_order(load_order) {
        if line.is_comment {
            continue;
        }

        match remaining.shift_remove(&line.filename) {
            Some(mut record) => {
                record.enabled = line.enabled && record.can_enable();
                ordered.push(record);
            }
            None => {
                tracing::trace!("Load order line has no loaded plugin: {}", line.filename);
            }
        }
    }

    let mut unlisted: Vec<PluginRecord> = remaining.into_values().collect();
    unlisted.sort_by(compare_unlisted);

    tracing::debug!(
        "Reconciled load order: {} listed, {} unlisted",
        ordered.len(),
        unlisted.len()
    );

    unlisted.extend(ordered);
    unlisted
}

/// Most recently modified first; filename keeps the order total.
fn compare_unlisted(a: &PluginRecord, b: &PluginRecord) -> Ordering {
    b.last_modified
        .cmp(&a.last_modified)
        .then_with(|| a.filename.cmp(&b.filename))
}

/// Write a load order text that reproduces the given order and enabled flags.
pub fn render_load_order(records: &[PluginRecord]) -> String {
    let mut text = String::new();
    for record in records {
        if record.enabled {
            text.push('*');
        }
        text.push_str(&record.filename);
        text.push('\n');
    }
    text
}
