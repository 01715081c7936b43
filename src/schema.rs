//! Column names and the fixed schema of the compiled artifacts.

pub const ID: &str = "id";
pub const DOI: &str = "doi";
pub const PUBLICATION_YEAR: &str = "publication_year";
pub const FWCI: &str = "fwci";

pub const AUTHORS: &str = "authors";
pub const INSTITUTIONS: &str = "institutions";
pub const CONCEPTS_LIST: &str = "concepts_list";

pub const AUTHOR_POSITION: &str = "authorships__author_position";
pub const AUTHOR_INSTITUTIONS: &str = "authorships__institutions";
pub const AUTHOR_COUNTRIES: &str = "authorships__countries";
pub const AUTHOR_IS_CORRESPONDING: &str = "authorships__is_corresponding";
pub const AUTHOR_RAW_NAME: &str = "authorships__raw_author_name";
pub const AUTHOR_RAW_AFFILIATIONS: &str = "authorships__raw_affiliation_strings";
pub const AUTHOR_AFFILIATIONS: &str = "authorships__affiliations";
pub const AUTHOR_ID: &str = "authorships__author__id";
pub const AUTHOR_DISPLAY_NAME: &str = "authorships__author__display_name";
pub const AUTHOR_ORCID: &str = "authorships__author__orcid";
pub const FIRST_INSTITUTION_ROR: &str = "authorships__institutions__ror";
pub const FIRST_INSTITUTION_NAME: &str = "authorships__institutions__display_name";
pub const FIRST_INSTITUTION_COUNTRY: &str = "authorships__institutions__country_code";

/// Per-authorship pipe-joined columns, in output order.
pub const AUTHORSHIP_COLUMNS: [&str; 13] = [
    AUTHOR_POSITION,
    AUTHOR_INSTITUTIONS,
    AUTHOR_COUNTRIES,
    AUTHOR_IS_CORRESPONDING,
    AUTHOR_RAW_NAME,
    AUTHOR_RAW_AFFILIATIONS,
    AUTHOR_AFFILIATIONS,
    AUTHOR_ID,
    AUTHOR_DISPLAY_NAME,
    AUTHOR_ORCID,
    FIRST_INSTITUTION_ROR,
    FIRST_INSTITUTION_NAME,
    FIRST_INSTITUTION_COUNTRY,
];

/// Authorship columns scored, merged and backfilled during deduplication.
/// The first-institution columns are carried along but never compared.
pub const CORE_AUTHORSHIP_COLUMNS: [&str; 10] = [
    AUTHOR_POSITION,
    AUTHOR_INSTITUTIONS,
    AUTHOR_COUNTRIES,
    AUTHOR_IS_CORRESPONDING,
    AUTHOR_RAW_NAME,
    AUTHOR_RAW_AFFILIATIONS,
    AUTHOR_AFFILIATIONS,
    AUTHOR_ID,
    AUTHOR_DISPLAY_NAME,
    AUTHOR_ORCID,
];

/// Fields kept from each flattened work, before the author tags.
pub const KEY_FIELDS: [&str; 33] = [
    ID,
    DOI,
    "display_name",
    PUBLICATION_YEAR,
    "type",
    "cited_by_count",
    "open_access__oa_status",
    "host_venue__display_name",
    "primary_location__source__display_name",
    "primary_topic__display_name",
    "primary_topic__field__display_name",
    "primary_topic__subfield__display_name",
    "biblio__volume",
    "biblio__issue",
    "biblio__first_page",
    "biblio__last_page",
    FWCI,
    AUTHORS,
    INSTITUTIONS,
    CONCEPTS_LIST,
    AUTHOR_POSITION,
    AUTHOR_INSTITUTIONS,
    AUTHOR_COUNTRIES,
    AUTHOR_IS_CORRESPONDING,
    AUTHOR_RAW_NAME,
    AUTHOR_RAW_AFFILIATIONS,
    AUTHOR_AFFILIATIONS,
    AUTHOR_ID,
    AUTHOR_DISPLAY_NAME,
    AUTHOR_ORCID,
    FIRST_INSTITUTION_ROR,
    FIRST_INSTITUTION_NAME,
    FIRST_INSTITUTION_COUNTRY,
];

/// Roster author the observation was fetched for.
pub const TAG_AUTHOR_NAME: &str = "author_name";
pub const TAG_AUTHOR_ID: &str = "author_openalex_id";

pub const UNION_AUTHOR_IDS: &str = "cohort_union_author_ids";
pub const UNION_AUTHOR_NAMES: &str = "cohort_union_author_names";
pub const UNION_COUNT: &str = "cohort_union_count";

pub const REPRESENTATIVE_OWNER: &str = "is_representative_owner";

/// Header of both compiled artifacts: key fields followed by author tags.
pub fn compiled_columns() -> Vec<String> {
    KEY_FIELDS
        .iter()
        .chain([TAG_AUTHOR_NAME, TAG_AUTHOR_ID].iter())
        .map(|c| c.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_compiled_columns_are_unique() {
        let cols = compiled_columns();
        assert_eq!(cols.len(), 35);
        let unique: HashSet<_> = cols.iter().collect();
        assert_eq!(unique.len(), cols.len());
        assert_eq!(cols.last().map(String::as_str), Some(TAG_AUTHOR_ID));
    }

    #[test]
    fn test_core_columns_are_a_prefix_of_authorship_columns() {
        assert_eq!(&AUTHORSHIP_COLUMNS[..10], &CORE_AUTHORSHIP_COLUMNS[..]);
    }
}
