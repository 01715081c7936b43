//! Recent-window split by publication year.

use chrono::{Datelike, Local};

use crate::schema;
use crate::table::FlatRow;

/// First year inside a window of `window_years` ending at `current_year`.
pub fn window_start(current_year: i32, window_years: u32) -> i32 {
    let span = i32::try_from(window_years).unwrap_or(i32::MAX);
    current_year.saturating_sub(span).saturating_add(1)
}

pub fn current_year() -> i32 {
    Local::now().year()
}

/// Publication year of a row. Accepts `2021` and `2021.0`.
pub fn publication_year(row: &FlatRow) -> Option<i32> {
    let raw = row.get(schema::PUBLICATION_YEAR)?.trim();
    raw.parse::<i32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|y| y.is_finite() && y.fract() == 0.0)
            .map(|y| y as i32)
    })
}

/// Rows published in `min_year` or later. Rows without a usable year
/// never fall inside the window.
pub fn recent_rows(rows: &[FlatRow], min_year: i32) -> Vec<FlatRow> {
    rows.iter()
        .filter(|row| publication_year(row).is_some_and(|y| y >= min_year))
        .cloned()
        .collect()
}
