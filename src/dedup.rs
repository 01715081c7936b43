//! Merge-aware deduplication.
//!
//! Every roster author contributes its own observation of a shared work, so
//! the recent artifact holds one row per (work, author) pair. Rows are
//! grouped by `id` (falling back to `doi`) and collapsed into one canonical
//! row:
//!
//! 1. The row with the highest [`richness_score`] is the representative
//!    (first seen wins ties).
//! 2. Each core authorship column is overwritten with the most informative
//!    value found anywhere in the group, so the result may combine cells
//!    from different observations.
//! 3. The cohort authors that observed the work are recorded as a sorted
//!    ownership union.
//! 4. Authorship cells that are still blank are backfilled from the
//!    lifetime artifact when one is available.
//!
//! Both artifacts are read fully into memory; at roster scale this is a few
//! thousand rows.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use tracing::{info, warn};

use crate::artifact::read_table;
use crate::error::{CohortError, Result};
use crate::flatten::authorship_token_count;
use crate::openalex::bare_author_id;
use crate::schema::{self, CORE_AUTHORSHIP_COLUMNS};
use crate::table::{FlatRow, Table};

/// Outcome of the lifetime backfill pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillStatus {
    /// No lifetime artifact was supplied
    NotAvailable,
    Applied { cells: usize },
    /// Lifetime artifact unusable; canonical rows left as merged
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupReport {
    pub input_rows: usize,
    pub output_rows: usize,
    /// Rows that had neither `id` nor `doi`
    pub keyless_rows: usize,
    pub backfill: BackfillStatus,
}

/// Sum of `|`-token counts over the non-empty core authorship cells.
pub fn richness_score(row: &FlatRow) -> usize {
    CORE_AUTHORSHIP_COLUMNS
        .iter()
        .filter_map(|c| row.get(c))
        .map(authorship_token_count)
        .sum()
}

/// The most informative of `values`: most `|` tokens, then longest, then
/// first seen. Falls back to the first non-null value, then to `""`.
pub fn pick_most_informative(values: &[Option<&str>]) -> String {
    let mut best: Option<(&str, usize, usize)> = None;

    for value in values.iter().flatten() {
        if value.trim().is_empty() {
            continue;
        }
        let tokens = authorship_token_count(value);
        let len = value.chars().count();
        let better = match best {
            None => true,
            Some((_, best_tokens, best_len)) => {
                tokens > best_tokens || (tokens == best_tokens && len > best_len)
            }
        };
        if better {
            best = Some((value, tokens, len));
        }
    }

    match best {
        Some((value, _, _)) => value.to_string(),
        None => values
            .iter()
            .flatten()
            .next()
            .map(|v| v.to_string())
            .unwrap_or_default(),
    }
}

/// Logical work identity: `id`, else `doi`, else none.
pub fn group_key(row: &FlatRow) -> Option<String> {
    [schema::ID, schema::DOI]
        .iter()
        .filter_map(|c| row.get(c))
        .find(|v| !v.trim().is_empty())
        .map(String::from)
}

/// Sorted distinct owner ids (bare form) and owner names of a group.
pub fn ownership_union(rows: &[&FlatRow]) -> (Vec<String>, Vec<String>) {
    let ids: BTreeSet<String> = rows
        .iter()
        .filter_map(|r| r.get(schema::TAG_AUTHOR_ID))
        .map(bare_author_id)
        .filter(|id| !id.is_empty())
        .collect();
    let names: BTreeSet<String> = rows
        .iter()
        .filter_map(|r| r.get(schema::TAG_AUTHOR_NAME))
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    (ids.into_iter().collect(), names.into_iter().collect())
}

/// Group rows by [`group_key`], keeping first-seen group order.
fn group_rows(rows: &[FlatRow]) -> Vec<(Option<String>, Vec<usize>)> {
    let mut groups: Vec<(Option<String>, Vec<usize>)> = Vec::new();
    let mut index: HashMap<Option<String>, usize> = HashMap::new();

    for (i, row) in rows.iter().enumerate() {
        let key = group_key(row);
        match index.get(&key) {
            Some(&g) => groups[g].1.push(i),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![i]));
            }
        }
    }
    groups
}

fn representative(members: &[&FlatRow]) -> usize {
    let mut best = 0;
    let mut best_score = None;
    for (i, row) in members.iter().enumerate() {
        let score = richness_score(row);
        if best_score.map_or(true, |s| score > s) {
            best = i;
            best_score = Some(score);
        }
    }
    best
}

/// Collapse `recent` into canonical rows, optionally backfilling from
/// `lifetime`.
pub fn deduplicate(recent: &Table, lifetime: Option<&Table>) -> (Table, DedupReport) {
    let mut canonical = Table::new(recent.columns.clone());
    for column in [
        schema::UNION_AUTHOR_IDS,
        schema::UNION_AUTHOR_NAMES,
        schema::UNION_COUNT,
    ] {
        canonical.push_column(column);
    }

    let merged_columns: Vec<&str> = CORE_AUTHORSHIP_COLUMNS
        .iter()
        .copied()
        .filter(|c| recent.has_column(c))
        .collect();

    let mut keyless_rows = 0;
    for (key, indices) in group_rows(&recent.rows) {
        if key.is_none() {
            keyless_rows += indices.len();
        }
        let members: Vec<&FlatRow> = indices.iter().map(|&i| &recent.rows[i]).collect();
        let mut best = members[representative(&members)].clone();

        for column in &merged_columns {
            let values: Vec<Option<&str>> = members.iter().map(|r| r.get(column)).collect();
            best.set(*column, pick_most_informative(&values));
        }

        let (ids, names) = ownership_union(&members);
        best.set(schema::UNION_AUTHOR_IDS, ids.join("|"));
        best.set(schema::UNION_AUTHOR_NAMES, names.join("|"));
        best.set(schema::UNION_COUNT, ids.len().to_string());

        canonical.rows.push(best);
    }

    if keyless_rows > 0 {
        warn!(rows = keyless_rows, "Rows without id or doi grouped under a null key");
    }

    let backfill = match lifetime {
        None => BackfillStatus::NotAvailable,
        Some(lifetime) => match backfill(&mut canonical, lifetime) {
            Ok(cells) => BackfillStatus::Applied { cells },
            Err(e) => {
                warn!(error = %e, "Lifetime backfill failed; continuing without backfill");
                BackfillStatus::Skipped(e.to_string())
            }
        },
    };

    let report = DedupReport {
        input_rows: recent.len(),
        output_rows: canonical.len(),
        keyless_rows,
        backfill,
    };
    (canonical, report)
}

/// Fill blank core authorship cells of `canonical` from the best lifetime
/// observation of the same `id`. Non-blank cells are never touched.
///
/// Returns the number of cells filled.
pub fn backfill(canonical: &mut Table, lifetime: &Table) -> Result<usize> {
    let compared: Vec<&str> = CORE_AUTHORSHIP_COLUMNS
        .iter()
        .copied()
        .filter(|c| canonical.has_column(c))
        .collect();

    for column in std::iter::once(schema::ID).chain(compared.iter().copied()) {
        if !lifetime.has_column(column) {
            return Err(CohortError::MissingColumn {
                path: "lifetime artifact".into(),
                column: column.to_string(),
            });
        }
    }

    let mut by_id: HashMap<&str, Vec<&FlatRow>> = HashMap::new();
    for row in &lifetime.rows {
        if let Some(id) = row.get(schema::ID) {
            by_id.entry(id).or_default().push(row);
        }
    }

    let mut filled = 0;
    for row in &mut canonical.rows {
        let Some(observations) = row.get(schema::ID).and_then(|id| by_id.get(id)) else {
            continue;
        };
        for column in &compared {
            if !row.is_blank(column) {
                continue;
            }
            let values: Vec<Option<&str>> = observations.iter().map(|r| r.get(column)).collect();
            let value = pick_most_informative(&values);
            if !value.trim().is_empty() {
                row.set(*column, value);
                filled += 1;
            }
        }
    }

    Ok(filled)
}

/// Read the recent artifact (fatal on failure) and, when it exists, the
/// lifetime artifact (backfill skipped on failure), then deduplicate.
pub fn deduplicate_artifact(
    recent_path: &Path,
    lifetime_path: Option<&Path>,
) -> Result<(Table, DedupReport)> {
    let recent = read_table(recent_path)?;

    let lifetime = match lifetime_path.filter(|p| p.exists()) {
        None => None,
        Some(path) => match read_table(path) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read lifetime artifact; skipping backfill");
                let (canonical, mut report) = deduplicate(&recent, None);
                report.backfill = BackfillStatus::Skipped(e.to_string());
                log_report(&report);
                return Ok((canonical, report));
            }
        },
    };

    let (canonical, report) = deduplicate(&recent, lifetime.as_ref());
    log_report(&report);
    Ok((canonical, report))
}

fn log_report(report: &DedupReport) {
    info!(
        before = report.input_rows,
        after = report.output_rows,
        backfill = ?report.backfill,
        "Deduplicated (merge-aware + backfill)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::write_table;
    use crate::schema::compiled_columns;
    use tempfile::tempdir;

    fn row(id: &str, owner: &str, auth: &[(&str, &str)]) -> FlatRow {
        let mut r = FlatRow::new();
        if !id.is_empty() {
            r.set(schema::ID, id);
        }
        r.set("display_name", format!("{id} seen by {owner}"));
        r.set(schema::TAG_AUTHOR_ID, format!("https://openalex.org/{owner}"));
        r.set(schema::TAG_AUTHOR_NAME, format!("Name {owner}"));
        for (c, v) in auth {
            r.set(*c, *v);
        }
        r
    }

    fn table(rows: Vec<FlatRow>) -> Table {
        Table {
            columns: compiled_columns(),
            rows,
        }
    }

    fn full_authorship(tokens: usize) -> Vec<(&'static str, String)> {
        CORE_AUTHORSHIP_COLUMNS
            .iter()
            .map(|c| (*c, vec!["x"; tokens].join("|")))
            .collect()
    }

    #[test]
    fn test_richness_score() {
        let r = row(
            "W1",
            "A1",
            &[
                (schema::AUTHOR_POSITION, "first|middle|last"),
                (schema::AUTHOR_ID, "A1|A2|A3"),
                (schema::AUTHOR_ORCID, ""),
                (schema::FIRST_INSTITUTION_ROR, "a|b|c"),
            ],
        );
        assert_eq!(richness_score(&r), 6);
        assert_eq!(richness_score(&FlatRow::new()), 0);
    }

    #[test]
    fn test_pick_most_informative() {
        assert_eq!(pick_most_informative(&[Some("a|b"), Some("abc"), Some("c|d")]), "a|b");
        assert_eq!(pick_most_informative(&[Some("a|b"), Some("aa|b")]), "aa|b");
        assert_eq!(pick_most_informative(&[None, Some("  "), Some("x")]), "x");
        assert_eq!(pick_most_informative(&[None, Some("  ")]), "  ");
        assert_eq!(pick_most_informative(&[None, None]), "");
    }

    #[test]
    fn test_richer_observation_wins_every_column() {
        let rich: Vec<(&str, String)> = full_authorship(3);
        let poor: Vec<(&str, String)> = full_authorship(1);
        let rich_ref: Vec<(&str, &str)> = rich.iter().map(|(c, v)| (*c, v.as_str())).collect();
        let poor_ref: Vec<(&str, &str)> = poor.iter().map(|(c, v)| (*c, v.as_str())).collect();

        let recent = table(vec![row("W1", "A2", &poor_ref), row("W1", "A1", &rich_ref)]);
        let (canonical, report) = deduplicate(&recent, None);

        assert_eq!(report.output_rows, 1);
        let merged = &canonical.rows[0];
        for column in CORE_AUTHORSHIP_COLUMNS {
            assert_eq!(merged.get(column), Some("x|x|x"), "column {column}");
        }
        // representative is the richer (second) observation
        assert_eq!(merged.get("display_name"), Some("W1 seen by A1"));
    }

    #[test]
    fn test_columns_merge_across_observations() {
        let recent = table(vec![
            row("W1", "A1", &[(schema::AUTHOR_POSITION, "first|last"), (schema::AUTHOR_ORCID, "")]),
            row("W1", "A2", &[(schema::AUTHOR_POSITION, "first"), (schema::AUTHOR_ORCID, "o1|o2")]),
        ]);
        let (canonical, _) = deduplicate(&recent, None);

        let merged = &canonical.rows[0];
        assert_eq!(merged.get(schema::AUTHOR_POSITION), Some("first|last"));
        assert_eq!(merged.get(schema::AUTHOR_ORCID), Some("o1|o2"));
        assert_eq!(merged.get(schema::AUTHOR_COUNTRIES), Some(""));
    }

    #[test]
    fn test_ties_keep_first_observation() {
        let recent = table(vec![row("W1", "A1", &[]), row("W1", "A2", &[])]);
        let (canonical, _) = deduplicate(&recent, None);
        assert_eq!(canonical.rows[0].get("display_name"), Some("W1 seen by A1"));
    }

    #[test]
    fn test_grouping_falls_back_to_doi_and_null_key() {
        let mut a = row("", "A1", &[]);
        a.set(schema::DOI, "https://doi.org/10.1/x");
        let mut b = row("", "A2", &[]);
        b.set(schema::DOI, "https://doi.org/10.1/x");
        let c = row("", "A3", &[]);
        let d = row("", "A4", &[]);

        let (canonical, report) = deduplicate(&table(vec![a, c, b, d]), None);

        assert_eq!(canonical.len(), 2);
        assert_eq!(report.keyless_rows, 2);
        assert_eq!(canonical.rows[0].get(schema::UNION_AUTHOR_IDS), Some("A1|A2"));
        assert_eq!(canonical.rows[1].get(schema::UNION_AUTHOR_IDS), Some("A3|A4"));
    }

    #[test]
    fn test_ownership_union_is_order_independent() {
        let rows = vec![
            row("W1", "A3", &[]),
            row("W1", "A1", &[]),
            row("W1", "A3", &[]),
            row("W1", "A2", &[]),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let (forward, _) = deduplicate(&table(rows), None);
        let (backward, _) = deduplicate(&table(reversed), None);

        for canonical in [&forward, &backward] {
            let merged = &canonical.rows[0];
            assert_eq!(merged.get(schema::UNION_AUTHOR_IDS), Some("A1|A2|A3"));
            assert_eq!(merged.get(schema::UNION_AUTHOR_NAMES), Some("Name A1|Name A2|Name A3"));
            assert_eq!(merged.get(schema::UNION_COUNT), Some("3"));
        }
    }

    #[test]
    fn test_backfill_fills_only_blank_cells() {
        let recent = table(vec![row(
            "W1",
            "A1",
            &[(schema::AUTHOR_POSITION, "first"), (schema::AUTHOR_ORCID, "")],
        )]);
        let lifetime = table(vec![
            row("W1", "A1", &[(schema::AUTHOR_POSITION, "first|last"), (schema::AUTHOR_ORCID, "o1")]),
            row("W1", "A1", &[(schema::AUTHOR_ORCID, "o1|o2")]),
            row("W2", "A1", &[(schema::AUTHOR_DISPLAY_NAME, "ignored")]),
        ]);

        let (canonical, report) = deduplicate(&recent, Some(&lifetime));

        let merged = &canonical.rows[0];
        assert_eq!(merged.get(schema::AUTHOR_POSITION), Some("first"));
        assert_eq!(merged.get(schema::AUTHOR_ORCID), Some("o1|o2"));
        assert_eq!(report.backfill, BackfillStatus::Applied { cells: 1 });
    }

    #[test]
    fn test_backfill_schema_mismatch_is_skipped() {
        let recent = table(vec![row("W1", "A1", &[(schema::AUTHOR_ORCID, "")])]);
        let lifetime = Table {
            columns: vec![schema::ID.to_string()],
            rows: vec![row("W1", "A1", &[(schema::AUTHOR_ORCID, "o1")])],
        };

        let (canonical, report) = deduplicate(&recent, Some(&lifetime));

        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical.rows[0].get(schema::AUTHOR_ORCID), Some(""));
        assert!(matches!(report.backfill, BackfillStatus::Skipped(_)));
    }

    #[test]
    fn test_output_columns_extend_input() {
        let (canonical, _) = deduplicate(&table(vec![row("W1", "A1", &[])]), None);
        let mut expected = compiled_columns();
        expected.extend(
            [schema::UNION_AUTHOR_IDS, schema::UNION_AUTHOR_NAMES, schema::UNION_COUNT]
                .map(String::from),
        );
        assert_eq!(canonical.columns, expected);
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let dir = tempdir().unwrap();
        let recent_path = dir.path().join("recent.csv");
        let lifetime_path = dir.path().join("lifetime.csv");
        write_table(
            &recent_path,
            &table(vec![
                row("W2", "A2", &[(schema::AUTHOR_POSITION, "first")]),
                row("W1", "A1", &[(schema::AUTHOR_POSITION, "first|last")]),
                row("W2", "A1", &[(schema::AUTHOR_ID, "A1|A2")]),
            ]),
        )
        .unwrap();
        write_table(
            &lifetime_path,
            &table(vec![row("W1", "A1", &[(schema::AUTHOR_ORCID, "o|p")])]),
        )
        .unwrap();

        let mut outputs = Vec::new();
        for name in ["first.csv", "second.csv"] {
            let (canonical, report) =
                deduplicate_artifact(&recent_path, Some(&lifetime_path)).unwrap();
            assert_eq!(report.output_rows, 2);
            let out = dir.path().join(name);
            write_table(&out, &canonical).unwrap();
            outputs.push(std::fs::read(out).unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn test_unreadable_lifetime_artifact_skips_backfill() {
        let dir = tempdir().unwrap();
        let recent_path = dir.path().join("recent.csv");
        let lifetime_path = dir.path().join("lifetime.csv");
        let recent = table(vec![
            row("W1", "A1", &[(schema::AUTHOR_POSITION, "first"), (schema::AUTHOR_ORCID, "")]),
            row("W1", "A2", &[(schema::AUTHOR_POSITION, "first|last")]),
        ]);
        write_table(&recent_path, &recent).unwrap();
        std::fs::write(&lifetime_path, "id,authorships__author__orcid\nW1,o1,extra\n").unwrap();

        let (canonical, report) =
            deduplicate_artifact(&recent_path, Some(&lifetime_path)).unwrap();

        assert!(matches!(report.backfill, BackfillStatus::Skipped(_)));
        let (expected, _) = deduplicate(&read_table(&recent_path).unwrap(), None);
        assert_eq!(canonical, expected);
        assert_eq!(canonical.rows[0].get(schema::AUTHOR_POSITION), Some("first|last"));
        assert_eq!(canonical.rows[0].get(schema::AUTHOR_ORCID), Some(""));
    }

    #[test]
    fn test_missing_recent_artifact_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(deduplicate_artifact(&dir.path().join("absent.csv"), None).is_err());
    }
}
