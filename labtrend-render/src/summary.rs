//! Clinical history as plain text.

use labtrend_core::{CellValue, LabtrendError, ObservationTable};

/// Plain-text clinical history: one `date: description` line per record.
pub fn clinical_summary(
    table: &ObservationTable,
    description_column: &str,
) -> Result<String, LabtrendError> {
    let index = table
        .column_index(description_column)
        .ok_or_else(|| LabtrendError::UnknownColumn(description_column.to_string()))?;

    let lines: Vec<String> = table
        .records()
        .iter()
        .map(|record| {
            let date = record
                .date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "--".to_string());
            format!("{date}: {}", cell_label(&record.values[index]))
        })
        .collect();

    Ok(lines.join("\n"))
}

/// Cell as display text; missing cells are blank.
pub(crate) fn cell_label(cell: &CellValue) -> String {
    match cell {
        CellValue::Text(text) => text.clone(),
        CellValue::Number(value) => value.to_string(),
        CellValue::Missing => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use labtrend_core::{ColumnSpec, Record};

    #[test]
    fn summary_keeps_table_order() {
        let table = ObservationTable::new(
            "DATA",
            vec![ColumnSpec::text("DESCRICAO")],
            vec![
                Record {
                    date: NaiveDate::from_ymd_opt(2024, 1, 3),
                    values: vec![CellValue::Text("Febre".into())],
                },
                Record {
                    date: None,
                    values: vec![CellValue::Missing],
                },
            ],
        )
        .expect("valid table");
        assert_eq!(
            clinical_summary(&table, "DESCRICAO").expect("column exists"),
            "2024-01-03: Febre\n--: "
        );
        assert!(clinical_summary(&table, "RESUMO").is_err());
    }
}
