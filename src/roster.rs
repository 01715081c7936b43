//! Roster loading.
//!
//! Column names are resolved once against [`RosterColumns`] aliases
//! (case-insensitive). A roster without any identifier column is rejected.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::RosterColumns;
use crate::error::{RosterError, Result};
use crate::fetcher::AuthorTarget;
use crate::openalex::bare_author_id;

/// One roster line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// Zero-based data row index
    pub row: usize,
    /// Identifier as written, bare or full URI; may be empty
    pub author_id: String,
    pub name: Option<String>,
}

impl RosterEntry {
    /// Name to tag works with: the roster name, else the id, else `Unknown`.
    pub fn display_name(&self) -> String {
        match (self.name.as_deref(), self.author_id.trim()) {
            (Some(name), _) if !name.trim().is_empty() => name.trim().to_string(),
            (_, "") => "Unknown".to_string(),
            (_, id) => id.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Roster {
    pub path: PathBuf,
    pub id_column: String,
    pub name_column: Option<String>,
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn load(path: &Path, columns: &RosterColumns) -> Result<Self> {
        info!(path = %path.display(), "Reading roster");
        let file = std::fs::File::open(path).map_err(|e| RosterError::Read {
            path: path.to_path_buf(),
            source: csv::Error::from(e),
        })?;
        Self::from_reader(file, path, columns)
    }

    pub fn from_reader<R: io::Read>(reader: R, path: &Path, columns: &RosterColumns) -> Result<Self> {
        let read_err = |source: csv::Error| RosterError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(read_err)?
            .iter()
            .map(String::from)
            .collect();

        let id_idx = resolve_column(&headers, &columns.id_aliases).ok_or_else(|| {
            RosterError::MissingColumn {
                path: path.to_path_buf(),
                aliases: columns.id_aliases.join(", "),
            }
        })?;
        let name_idx = resolve_column(&headers, &columns.name_aliases);
        debug!(
            id_column = %headers[id_idx],
            name_column = ?name_idx.map(|i| headers[i].as_str()),
            "Resolved roster columns"
        );

        let mut entries = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record.map_err(read_err)?;
            let author_id = record.get(id_idx).unwrap_or_default().to_string();
            let name = name_idx
                .and_then(|i| record.get(i))
                .filter(|n| !n.is_empty())
                .map(String::from);
            entries.push(RosterEntry {
                row,
                author_id,
                name,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            id_column: headers[id_idx].clone(),
            name_column: name_idx.map(|i| headers[i].clone()),
            entries,
        })
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Authors to fetch, plus the rows skipped for lacking an id.
    pub fn targets(&self) -> (Vec<AuthorTarget>, Vec<usize>) {
        let mut targets = Vec::new();
        let mut skipped = Vec::new();
        for entry in &self.entries {
            if entry.author_id.trim().is_empty() {
                skipped.push(entry.row);
                continue;
            }
            targets.push(AuthorTarget {
                id: entry.author_id.trim().to_string(),
                name: entry.display_name(),
            });
        }
        (targets, skipped)
    }

    /// Bare author id -> roster name, for entries that have both.
    pub fn name_lookup(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .filter_map(|e| {
                let aid = bare_author_id(&e.author_id);
                let name = e.name.as_deref()?.trim();
                (!aid.is_empty() && !name.is_empty()).then(|| (aid, name.to_string()))
            })
            .collect()
    }
}

/// Index of the first header matching an alias, trying aliases in order.
fn resolve_column(headers: &[String], aliases: &[String]) -> Option<usize> {
    aliases.iter().find_map(|alias| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(alias.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CohortError;

    fn load(csv: &str) -> Result<Roster> {
        Roster::from_reader(csv.as_bytes(), Path::new("roster.csv"), &RosterColumns::default())
    }

    #[test]
    fn test_resolves_aliases_case_insensitively() {
        let roster = load("fullname,OPENALEXID,dept\nAda Smith,A1,Vet\n,https://openalex.org/A2,Vet\n").unwrap();
        assert_eq!(roster.id_column, "OPENALEXID");
        assert_eq!(roster.name_column.as_deref(), Some("fullname"));
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.entries()[1].name, None);
        assert_eq!(roster.entries()[1].display_name(), "https://openalex.org/A2");
    }

    #[test]
    fn test_missing_id_column_is_an_error() {
        let err = load("Name,Department\nAda,Vet\n").unwrap_err();
        assert!(matches!(err, CohortError::Roster(RosterError::MissingColumn { .. })));
    }

    #[test]
    fn test_targets_skip_rows_without_id() {
        let roster = load("Name,OpenAlexID\nAda,A1\nBo,\n,A3\n").unwrap();
        let (targets, skipped) = roster.targets();
        assert_eq!(skipped, vec![1]);
        assert_eq!(
            targets,
            vec![
                AuthorTarget { id: "A1".into(), name: "Ada".into() },
                AuthorTarget { id: "A3".into(), name: "A3".into() },
            ]
        );
    }

    #[test]
    fn test_name_lookup_uses_bare_ids() {
        let roster = load("author_name,author_openalex_id\nAda,https://openalex.org/A1\n,A2\n").unwrap();
        let lookup = roster.name_lookup();
        assert_eq!(lookup.get("A1").map(String::as_str), Some("Ada"));
        assert!(!lookup.contains_key("A2"));
    }

    #[test]
    fn test_header_only_roster_is_empty() {
        let roster = load("Name,OpenAlexID\n").unwrap();
        assert!(roster.is_empty());
        assert!(roster.targets().0.is_empty());
    }

    #[test]
    fn test_roster_without_name_column() {
        let roster = load("openalex_id\nA1\n").unwrap();
        assert!(roster.name_column.is_none());
        assert!(roster.name_lookup().is_empty());
    }
}
