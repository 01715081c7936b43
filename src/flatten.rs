//! Record flattening.
//!
//! Turns one nested OpenAlex work into a [`FlatRow`]: nested objects are
//! joined with `__` (`primary_topic.field.display_name` becomes
//! `primary_topic__field__display_name`), and the still list-valued
//! `authorships` / `concepts` are summarized into joined convenience
//! columns plus thirteen per-authorship `|`-joined columns.
//!
//! List entries are parsed one at a time into typed structs. An entry that
//! does not fit is skipped and counted in [`FlattenReport`]; it never drops
//! the row.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::openalex::{
    bare_author_id, OpenAlexAuthorship, OpenAlexConcept, OpenAlexInstitution,
};
use crate::schema;
use crate::table::FlatRow;

/// Path separator for nested keys
pub const PATH_SEP: &str = "__";

/// Separator inside one cell of a convenience or per-author list
const LIST_SEP: &str = "; ";

/// Separator between authorship positions
const AUTHORSHIP_SEP: &str = "|";

const ROR_PREFIX: &str = "https://ror.org/";

/// Counts gathered while flattening a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlattenReport {
    pub records: usize,
    /// Malformed authorship, institution or concept entries that were skipped.
    pub skipped_entries: usize,
    /// Results that were not JSON objects at all.
    pub skipped_records: usize,
}

/// Entries of a JSON list that parsed, plus how many did not.
#[derive(Debug)]
pub struct Lenient<T> {
    pub items: Vec<T>,
    pub skipped: usize,
}

/// Parse a list-valued field entry by entry.
///
/// Absent and null fields are an empty list. A field that is present but
/// not a list counts as one skipped entry.
pub fn parse_lenient<T: DeserializeOwned>(value: Option<&Value>) -> Lenient<T> {
    match value {
        None | Some(Value::Null) => Lenient {
            items: Vec::new(),
            skipped: 0,
        },
        Some(Value::Array(entries)) => {
            let mut items = Vec::with_capacity(entries.len());
            let mut skipped = 0;
            for entry in entries {
                match serde_json::from_value::<T>(entry.clone()) {
                    Ok(item) => items.push(item),
                    Err(_) => skipped += 1,
                }
            }
            Lenient { items, skipped }
        }
        Some(_) => Lenient {
            items: Vec::new(),
            skipped: 1,
        },
    }
}

/// Flatten a batch of raw works.
pub fn flatten_records(records: &[Value]) -> (Vec<FlatRow>, FlattenReport) {
    let mut report = FlattenReport::default();
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        if !record.is_object() {
            report.skipped_records += 1;
            continue;
        }
        let (row, skipped) = flatten_record(record);
        report.records += 1;
        report.skipped_entries += skipped;
        rows.push(row);
    }

    (rows, report)
}

/// Flatten one work. Returns the row and the number of skipped entries.
pub fn flatten_record(record: &Value) -> (FlatRow, usize) {
    let mut row = FlatRow::new();
    flatten_into(None, record, &mut row);

    let authorships = parse_authorships(record.get("authorships"));
    let concepts: Lenient<OpenAlexConcept> = parse_lenient(record.get("concepts"));
    let skipped = authorships.skipped + concepts.skipped;

    add_convenience_columns(&mut row, &authorships.items, &concepts.items);
    add_authorship_columns(&mut row, &authorships.items);

    // OpenAlex does not always ship a normalized citation impact
    if !row.contains_key(schema::FWCI) {
        row.set_null(schema::FWCI);
    }

    (row, skipped)
}

fn flatten_into(prefix: Option<&str>, value: &Value, row: &mut FlatRow) {
    match value {
        Value::Object(map) => {
            if map.is_empty() {
                if let Some(p) = prefix {
                    row.set_null(p);
                }
                return;
            }
            for (key, child) in map {
                let path = match prefix {
                    Some(p) => format!("{p}{PATH_SEP}{key}"),
                    None => key.clone(),
                };
                flatten_into(Some(&path), child, row);
            }
        }
        scalar => {
            if let Some(p) = prefix {
                row.insert_cell(p, scalar_cell(scalar));
            }
        }
    }
}

/// Render a leaf value. Arrays stay in one cell as compact JSON.
fn scalar_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
    }
}

/// An authorship with its institutions already parsed.
struct ParsedAuthorship {
    entry: OpenAlexAuthorship,
    institutions: Vec<OpenAlexInstitution>,
}

fn parse_authorships(value: Option<&Value>) -> Lenient<ParsedAuthorship> {
    let raw: Lenient<OpenAlexAuthorship> = parse_lenient(value);
    let mut skipped = raw.skipped;

    let items = raw
        .items
        .into_iter()
        .map(|mut entry| {
            let insts: Lenient<OpenAlexInstitution> = match entry.institutions.take() {
                Some(list) => parse_lenient(Some(&Value::Array(list))),
                None => parse_lenient(None),
            };
            skipped += insts.skipped;
            ParsedAuthorship {
                entry,
                institutions: insts.items,
            }
        })
        .collect();

    Lenient { items, skipped }
}

/// Sorted, deduplicated, `"; "`-joined list of the non-blank items.
pub fn sorted_unique_join<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(LIST_SEP)
}

fn add_convenience_columns(
    row: &mut FlatRow,
    authorships: &[ParsedAuthorship],
    concepts: &[OpenAlexConcept],
) {
    let authors = sorted_unique_join(authorships.iter().filter_map(|a| {
        a.entry
            .author
            .as_ref()
            .and_then(|au| au.display_name.as_deref())
    }));

    let institutions = sorted_unique_join(
        authorships
            .iter()
            .flat_map(|a| a.institutions.iter())
            .filter_map(|i| i.display_name.as_deref()),
    );

    let concepts_list =
        sorted_unique_join(concepts.iter().filter_map(|c| c.display_name.as_deref()));

    row.set(schema::AUTHORS, authors);
    row.set(schema::INSTITUTIONS, institutions);
    row.set(schema::CONCEPTS_LIST, concepts_list);
}

fn trimmed(value: Option<&str>) -> String {
    value.unwrap_or_default().trim().to_string()
}

fn raw_affiliations(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string().trim().to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(LIST_SEP),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

/// Per-author values for the thirteen authorship columns.
fn authorship_cells(a: &ParsedAuthorship) -> [String; 13] {
    let names: Vec<String> = a
        .institutions
        .iter()
        .map(|i| trimmed(i.display_name.as_deref()))
        .filter(|n| !n.is_empty())
        .collect();
    let country = a
        .institutions
        .iter()
        .map(|i| trimmed(i.country_code.as_deref()).to_uppercase())
        .find(|c| !c.is_empty())
        .unwrap_or_default();

    let (first_ror, first_name, first_country) = match a.institutions.first() {
        Some(first) => (
            first
                .ror
                .as_deref()
                .unwrap_or_default()
                .replace(ROR_PREFIX, ""),
            trimmed(first.display_name.as_deref()),
            trimmed(first.country_code.as_deref()).to_uppercase(),
        ),
        None => Default::default(),
    };

    let author = a.entry.author.as_ref();
    let joined_names = names.join(LIST_SEP);

    [
        trimmed(a.entry.author_position.as_deref()),
        joined_names.clone(),
        country,
        a.entry.is_corresponding.unwrap_or(false).to_string(),
        trimmed(a.entry.raw_author_name.as_deref()),
        raw_affiliations(a.entry.raw_affiliation_strings.as_ref()),
        joined_names,
        author
            .and_then(|au| au.id.as_deref())
            .map(bare_author_id)
            .unwrap_or_default(),
        trimmed(author.and_then(|au| au.display_name.as_deref())),
        trimmed(author.and_then(|au| au.orcid.as_deref())),
        first_ror,
        first_name,
        first_country,
    ]
}

fn add_authorship_columns(row: &mut FlatRow, authorships: &[ParsedAuthorship]) {
    let mut columns: [Vec<String>; 13] = Default::default();
    for authorship in authorships {
        for (column, cell) in columns.iter_mut().zip(authorship_cells(authorship)) {
            column.push(cell);
        }
    }
    for (name, values) in schema::AUTHORSHIP_COLUMNS.iter().zip(columns) {
        row.set(*name, values.join(AUTHORSHIP_SEP));
    }
}

/// Number of `|`-separated positions in an authorship cell; 0 when empty.
pub fn authorship_token_count(cell: &str) -> usize {
    if cell.is_empty() {
        0
    } else {
        cell.matches(AUTHORSHIP_SEP).count() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_work() -> Value {
        json!({
            "id": "https://openalex.org/W100",
            "doi": "https://doi.org/10.1/abc",
            "display_name": "Bovine respiratory disease",
            "publication_year": 2023,
            "cited_by_count": 4,
            "open_access": {"is_oa": true, "oa_status": "gold"},
            "primary_topic": {
                "display_name": "Cattle health",
                "field": {"display_name": "Veterinary"},
            },
            "biblio": {"volume": "12", "issue": null, "first_page": "1", "last_page": "9"},
            "referenced_works": ["https://openalex.org/W1", "https://openalex.org/W2"],
            "concepts": [
                {"display_name": "Virology"},
                {"display_name": "Cattle"},
                {"display_name": "Virology"},
            ],
            "authorships": [
                {
                    "author_position": "first",
                    "author": {
                        "id": "https://openalex.org/A1",
                        "display_name": "Ada Smith",
                        "orcid": "https://orcid.org/0000-0001"
                    },
                    "institutions": [
                        {"display_name": "University of Calgary", "country_code": "ca", "ror": "https://ror.org/03yjb2x39"},
                        {"display_name": "Alberta Health", "country_code": "CA", "ror": null}
                    ],
                    "is_corresponding": true,
                    "raw_author_name": " Ada Smith ",
                    "raw_affiliation_strings": ["UCVM, Calgary", "  "]
                },
                {
                    "author_position": "last",
                    "author": {"id": "https://openalex.org/A2", "display_name": "Bo Lee", "orcid": null},
                    "institutions": [],
                    "is_corresponding": false,
                    "raw_author_name": "B. Lee",
                    "raw_affiliation_strings": []
                }
            ]
        })
    }

    #[test]
    fn test_path_join_and_scalars() {
        let (row, skipped) = flatten_record(&sample_work());
        assert_eq!(skipped, 0);
        assert_eq!(row.get("open_access__oa_status"), Some("gold"));
        assert_eq!(row.get("open_access__is_oa"), Some("true"));
        assert_eq!(row.get("primary_topic__field__display_name"), Some("Veterinary"));
        assert_eq!(row.get("publication_year"), Some("2023"));
        assert!(row.contains_key("biblio__issue"));
        assert_eq!(row.get("biblio__issue"), None);
        assert_eq!(
            row.get("referenced_works"),
            Some(r#"["https://openalex.org/W1","https://openalex.org/W2"]"#)
        );
    }

    #[test]
    fn test_convenience_columns() {
        let (row, _) = flatten_record(&sample_work());
        assert_eq!(row.get("authors"), Some("Ada Smith; Bo Lee"));
        assert_eq!(row.get("institutions"), Some("Alberta Health; University of Calgary"));
        assert_eq!(row.get("concepts_list"), Some("Cattle; Virology"));
    }

    #[test]
    fn test_authorship_columns() {
        let (row, _) = flatten_record(&sample_work());
        assert_eq!(row.get(schema::AUTHOR_POSITION), Some("first|last"));
        assert_eq!(
            row.get(schema::AUTHOR_INSTITUTIONS),
            Some("University of Calgary; Alberta Health|")
        );
        assert_eq!(row.get(schema::AUTHOR_AFFILIATIONS), row.get(schema::AUTHOR_INSTITUTIONS));
        assert_eq!(row.get(schema::AUTHOR_COUNTRIES), Some("CA|"));
        assert_eq!(row.get(schema::AUTHOR_IS_CORRESPONDING), Some("true|false"));
        assert_eq!(row.get(schema::AUTHOR_RAW_NAME), Some("Ada Smith|B. Lee"));
        assert_eq!(row.get(schema::AUTHOR_RAW_AFFILIATIONS), Some("UCVM, Calgary|"));
        assert_eq!(row.get(schema::AUTHOR_ID), Some("A1|A2"));
        assert_eq!(row.get(schema::AUTHOR_ORCID), Some("https://orcid.org/0000-0001|"));
        assert_eq!(row.get(schema::FIRST_INSTITUTION_ROR), Some("03yjb2x39|"));
        assert_eq!(row.get(schema::FIRST_INSTITUTION_NAME), Some("University of Calgary|"));
        assert_eq!(row.get(schema::FIRST_INSTITUTION_COUNTRY), Some("CA|"));
    }

    #[test]
    fn test_authorship_columns_share_token_count() {
        let (row, _) = flatten_record(&sample_work());
        for column in schema::AUTHORSHIP_COLUMNS {
            let cell = row.get(column).unwrap();
            assert_eq!(authorship_token_count(cell), 2, "column {column}");
        }
    }

    #[test]
    fn test_no_authorships_yields_empty_strings() {
        for work in [
            json!({"id": "https://openalex.org/W1"}),
            json!({"id": "https://openalex.org/W1", "authorships": []}),
        ] {
            let (row, _) = flatten_record(&work);
            for column in schema::AUTHORSHIP_COLUMNS {
                assert_eq!(row.get(column), Some(""), "column {column}");
            }
            assert_eq!(row.get("authors"), Some(""));
        }
    }

    #[test]
    fn test_malformed_entries_are_skipped_and_counted() {
        let work = json!({
            "id": "https://openalex.org/W9",
            "authorships": [
                "not an authorship",
                {"author_position": 3},
                {"author_position": "first", "author": {"display_name": "Cy"},
                 "institutions": [42, {"display_name": "Vet School"}]}
            ],
            "concepts": {"display_name": "oops"}
        });
        let (row, skipped) = flatten_record(&work);
        // two bad authorships, one bad institution, one non-list concepts
        assert_eq!(skipped, 4);
        assert_eq!(row.get(schema::AUTHOR_POSITION), Some("first"));
        assert_eq!(row.get(schema::AUTHOR_INSTITUTIONS), Some("Vet School"));
        assert_eq!(row.get("authors"), Some("Cy"));
        assert_eq!(row.get("concepts_list"), Some(""));
    }

    #[test]
    fn test_fwci_placeholder() {
        let (row, _) = flatten_record(&json!({"id": "W1"}));
        assert!(row.contains_key(schema::FWCI));
        assert_eq!(row.get(schema::FWCI), None);

        let (row, _) = flatten_record(&json!({"id": "W1", "fwci": 1.25}));
        assert_eq!(row.get(schema::FWCI), Some("1.25"));
    }

    #[test]
    fn test_flatten_is_independent_of_field_order() {
        let a: Value = serde_json::from_str(
            r#"{"id":"W1","biblio":{"volume":"1","issue":"2"},"publication_year":2022}"#,
        )
        .unwrap();
        let b: Value = serde_json::from_str(
            r#"{"publication_year":2022,"biblio":{"issue":"2","volume":"1"},"id":"W1"}"#,
        )
        .unwrap();
        assert_eq!(flatten_record(&a).0, flatten_record(&b).0);
    }

    #[test]
    fn test_flatten_records_skips_non_objects() {
        let (rows, report) = flatten_records(&[sample_work(), json!("junk"), json!(null)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(report.records, 1);
        assert_eq!(report.skipped_records, 2);
    }
}
