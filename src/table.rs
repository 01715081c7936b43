//! Flat rows and in-memory tables.

use std::collections::BTreeMap;

/// One flattened work: field path -> nullable string cell.
///
/// Keys are kept sorted so a row never depends on the field order of the
/// JSON it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatRow {
    cells: BTreeMap<String, Option<String>>,
}

impl FlatRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-null value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.cells.get(key).and_then(|v| v.as_deref())
    }

    /// Null, absent, or whitespace only.
    pub fn is_blank(&self, key: &str) -> bool {
        self.get(key).map_or(true, |v| v.trim().is_empty())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.cells.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.cells.insert(key.into(), Some(value.into()));
    }

    pub fn set_null(&mut self, key: impl Into<String>) {
        self.cells.insert(key.into(), None);
    }

    pub fn insert_cell(&mut self, key: impl Into<String>, value: Option<String>) {
        self.cells.insert(key.into(), value);
    }

    /// Cells in `columns` order; absent keys come out as null.
    pub fn project<'a>(&'a self, columns: &'a [String]) -> impl Iterator<Item = Option<&'a str>> {
        columns.iter().map(move |c| self.get(c))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FlatRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = FlatRow::new();
        for (k, v) in iter {
            row.set(k, v);
        }
        row
    }
}

/// A whole artifact held in memory: header plus rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<FlatRow>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Append `column` to the header unless already present.
    pub fn push_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
