//! Per-author projection of the canonical dataset.
//!
//! Each canonical work is repeated once per cohort author that owns it, so
//! downstream reports can filter by author without parsing the union column.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::openalex::bare_author_id;
use crate::schema;
use crate::table::{FlatRow, Table};

/// Owner ids of a canonical row, bare and deduplicated in first-seen order.
///
/// Taken from the ownership union when present, else the originally tagged
/// owner, else the work's own author list.
pub fn owner_ids(row: &FlatRow) -> Vec<String> {
    let union: Vec<&str> = split_ids(row.get(schema::UNION_AUTHOR_IDS));
    let candidates = if !union.is_empty() {
        union
    } else if let Some(owner) = row.get(schema::TAG_AUTHOR_ID).filter(|o| !o.trim().is_empty()) {
        vec![owner]
    } else {
        split_ids(row.get(schema::AUTHOR_ID))
    };

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(bare_author_id)
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

fn split_ids(cell: Option<&str>) -> Vec<&str> {
    cell.map(|c| c.split('|').map(str::trim).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Expand `canonical` to one row per owning author.
///
/// `names` maps bare author ids to roster names. Works with no derivable
/// owner produce no rows.
pub fn project(canonical: &Table, names: &HashMap<String, String>) -> Table {
    let mut projected = Table::new(canonical.columns.clone());
    projected.push_column(schema::REPRESENTATIVE_OWNER);

    let mut ownerless = 0;
    for row in &canonical.rows {
        let representative = row
            .get(schema::TAG_AUTHOR_ID)
            .map(bare_author_id)
            .unwrap_or_default();
        let owners = owner_ids(row);
        if owners.is_empty() {
            ownerless += 1;
            continue;
        }

        for aid in owners {
            let mut out = row.clone();
            if let Some(name) = names.get(&aid).filter(|n| !n.trim().is_empty()) {
                out.set(schema::TAG_AUTHOR_NAME, name.as_str());
            }
            let is_owner = !representative.is_empty() && aid == representative;
            out.set(schema::REPRESENTATIVE_OWNER, is_owner.to_string());
            out.set(schema::TAG_AUTHOR_ID, aid);
            projected.rows.push(out);
        }
    }

    debug!(
        works = canonical.len(),
        rows = projected.len(),
        ownerless,
        "Projected canonical works per author"
    );
    projected
}
