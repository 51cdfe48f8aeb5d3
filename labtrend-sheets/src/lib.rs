//! Spreadsheet rows to `ObservationTable` loader.

mod cached;
mod source;

use std::collections::{HashMap, HashSet};

use labtrend_core::{
    coerce_numeric, parse_sheet_date, CellValue, ColumnKind, ColumnSpec, LabtrendConfig,
    LabtrendError, ObservationTable, Record,
};

pub use cached::CachedLoader;
#[cfg(feature = "sheets-api")]
pub use source::{SheetsApiSource, SheetsCredentials};
pub use source::{CsvSource, GridSource, RowSource, WorkbookSource};

/// How raw rows are turned into a typed table.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// 0-based index of the row holding column names; rows above it are ignored.
    pub header_row: usize,
    pub date_column: String,
    pub date_format: String,
    pub drop_columns: Vec<String>,
    /// Columns kept as text instead of numerically coerced.
    pub text_columns: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from(&LabtrendConfig::default())
    }
}

impl From<&LabtrendConfig> for LoadOptions {
    fn from(config: &LabtrendConfig) -> Self {
        Self {
            header_row: config.header_row,
            date_column: config.date_column.clone(),
            date_format: config.date_format.clone(),
            drop_columns: config.drop_columns.clone(),
            text_columns: config.text_columns.clone(),
        }
    }
}

impl LoadOptions {
    /// Same options with extra text columns (e.g. a clinical description column).
    pub fn with_text_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_columns.extend(columns.into_iter().map(Into::into));
        self
    }
}

/// Fetch a tab through `source` and normalize it.
pub fn load<S: RowSource + ?Sized>(
    source: &S,
    tab: &str,
    options: &LoadOptions,
) -> Result<ObservationTable, LabtrendError> {
    log::info!("fetching tab `{tab}` from {}", source.describe());
    let rows = source.fetch_rows(tab)?;
    normalize_rows(&rows, options)
}

/// Build a typed table from raw text rows.
///
/// Cells that fail numeric or date coercion become missing markers; only
/// structural problems with the header are errors.
pub fn normalize_rows(
    rows: &[Vec<String>],
    options: &LoadOptions,
) -> Result<ObservationTable, LabtrendError> {
    let header = rows.get(options.header_row).ok_or_else(|| {
        LabtrendError::MalformedHeader(format!(
            "header row {} is outside the {} fetched rows",
            options.header_row,
            rows.len()
        ))
    })?;

    if header.iter().all(|cell| cell.trim().is_empty()) {
        return Err(LabtrendError::MalformedHeader(format!(
            "header row {} is empty",
            options.header_row
        )));
    }

    let names = unique_column_names(header);
    let date_index = names
        .iter()
        .position(|name| *name == options.date_column)
        .ok_or_else(|| {
            LabtrendError::MalformedHeader(format!(
                "date column `{}` not found in header",
                options.date_column
            ))
        })?;

    let kept: Vec<(usize, ColumnSpec)> = names
        .iter()
        .enumerate()
        .filter(|(index, name)| {
            *index != date_index && !options.drop_columns.iter().any(|drop| drop == *name)
        })
        .map(|(index, name)| {
            let spec = if options.text_columns.iter().any(|text| text == name) {
                ColumnSpec::text(name.clone())
            } else {
                ColumnSpec::number(name.clone())
            };
            (index, spec)
        })
        .collect();

    let data_rows = &rows[options.header_row + 1..];
    let mut records = Vec::with_capacity(data_rows.len());
    let mut missing_dates = 0usize;
    let mut missing_cells = 0usize;

    for row in data_rows {
        let cell = |index: usize| row.get(index).map(String::as_str).unwrap_or("");

        let date = parse_sheet_date(cell(date_index), &options.date_format);
        if date.is_none() {
            missing_dates += 1;
        }

        let values: Vec<CellValue> = kept
            .iter()
            .map(|(index, spec)| normalize_cell(cell(*index), spec.kind))
            .collect();
        missing_cells += values.iter().filter(|value| value.is_missing()).count();

        records.push(Record { date, values });
    }

    log::debug!(
        "normalized {} rows x {} columns ({missing_dates} missing dates, {missing_cells} missing cells)",
        records.len(),
        kept.len()
    );

    let columns = kept.into_iter().map(|(_, spec)| spec).collect();
    ObservationTable::new(options.date_column.clone(), columns, records)
}

fn normalize_cell(raw: &str, kind: ColumnKind) -> CellValue {
    match kind {
        ColumnKind::Number => coerce_numeric(&CellValue::Text(raw.to_string())),
        ColumnKind::Text => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                CellValue::Missing
            } else {
                CellValue::Text(trimmed.to_string())
            }
        }
    }
}

/// Trimmed header names, blanks named `Unnamed: {index}` and repeats
/// suffixed `.1`, `.2`, ... skipping suffixes already taken by a real column.
fn unique_column_names(header: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut suffixes: HashMap<String, usize> = HashMap::new();
    header
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let base = match raw.trim() {
                "" => format!("Unnamed: {index}"),
                name => name.to_string(),
            };
            let name = if seen.contains(&base) {
                let suffix = suffixes.entry(base.clone()).or_insert(0);
                loop {
                    *suffix += 1;
                    let candidate = format!("{base}.{suffix}");
                    if !seen.contains(&candidate) {
                        break candidate;
                    }
                }
            } else {
                base
            };
            seen.insert(name.clone());
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn duplicate_and_blank_headers_get_unique_names() {
        let names = unique_column_names(&grid(&[&["DATA", "PCR", "", "PCR", " PCR "]])[0]);
        assert_eq!(names, ["DATA", "PCR", "Unnamed: 2", "PCR.1", "PCR.2"]);
    }

    #[test]
    fn repeat_suffix_skips_existing_column() {
        let rows = grid(&[&["DATA", "PCR", "PCR.1", "PCR"], &["01-Jan-2024", "3", "4", "5"]]);
        let options = LoadOptions {
            header_row: 0,
            ..LoadOptions::default()
        };
        let table = normalize_rows(&rows, &options).expect("repeated header still loads");
        let names: Vec<&str> = table.columns().iter().map(|column| column.name.as_str()).collect();
        assert_eq!(names, ["PCR", "PCR.1", "PCR.2"]);
        assert_eq!(table.cell(0, "PCR.2"), Some(&CellValue::Number(5.0)));
    }

    #[test]
    fn short_and_long_rows_fit_header_width() {
        let rows = grid(&[
            &["DATA", "Ureia", "Creatinina"],
            &["01-Jan-2024"],
            &["02-Jan-2024", "40", "1.1", "extra", "cells"],
        ]);
        let options = LoadOptions {
            header_row: 0,
            ..LoadOptions::default()
        };
        let table = normalize_rows(&rows, &options).expect("valid table");
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.records()[0].values,
            vec![CellValue::Missing, CellValue::Missing]
        );
        assert_eq!(
            table.records()[1].values,
            vec![CellValue::Number(40.0), CellValue::Number(1.1)]
        );
    }

    #[test]
    fn text_columns_are_not_coerced() {
        let rows = grid(&[
            &["Evolução"],
            &["DATA", "DESCRICAO"],
            &["03-Feb-2024", " Febre "],
            &["04-Feb-2024", ""],
        ]);
        let options = LoadOptions::default().with_text_columns(["DESCRICAO"]);
        let table = normalize_rows(&rows, &options).expect("valid table");
        assert_eq!(table.cell(0, "DESCRICAO"), Some(&CellValue::Text("Febre".into())));
        assert_eq!(table.cell(1, "DESCRICAO"), Some(&CellValue::Missing));
    }

    #[test]
    fn missing_date_column_is_malformed_header() {
        let rows = grid(&[&["banner"], &["Dia", "Ureia"], &["1", "2"]]);
        let err = normalize_rows(&rows, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LabtrendError::MalformedHeader(_)));
    }

    #[test]
    fn blank_header_is_malformed() {
        let rows = grid(&[&["banner"], &["", "  "], &["1", "2"]]);
        let err = normalize_rows(&rows, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LabtrendError::MalformedHeader(_)));
    }
}
