//! Bảng quan sát đã chuẩn hóa kiểu dữ liệu.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::LabtrendError;

/// Giá trị một ô sau khi chuẩn hóa.
///
/// Ô không ép được kiểu trở thành `Missing`, không bao giờ giữ chuỗi thô
/// trong cột số.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Missing,
}

impl CellValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }
}

/// Ép kiểu số cho một ô. Gọi lại trên giá trị đã là số cho cùng kết quả.
pub fn coerce_numeric(cell: &CellValue) -> CellValue {
    match cell {
        CellValue::Number(value) if value.is_finite() => CellValue::Number(*value),
        CellValue::Number(_) | CellValue::Missing => CellValue::Missing,
        CellValue::Text(text) => match text.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => CellValue::Number(value),
            _ => CellValue::Missing,
        },
    }
}

/// Đọc ngày theo định dạng của bảng tính, `None` nếu không khớp.
pub fn parse_sheet_date(text: &str, format: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, format).ok()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Number,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Number,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Text,
        }
    }
}

/// Một dòng dữ liệu: ngày trên trục thời gian và giá trị theo thứ tự cột.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub date: Option<NaiveDate>,
    pub values: Vec<CellValue>,
}

/// Bảng quan sát bất biến; lọc luôn tạo bảng mới.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawTable")]
pub struct ObservationTable {
    date_column: String,
    columns: Vec<ColumnSpec>,
    records: Vec<Record>,
}

/// Dạng JSON của bảng, chưa kiểm tra.
#[derive(Deserialize)]
struct RawTable {
    date_column: String,
    columns: Vec<ColumnSpec>,
    records: Vec<Record>,
}

impl TryFrom<RawTable> for ObservationTable {
    type Error = LabtrendError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        Self::new(raw.date_column, raw.columns, raw.records)
    }
}

impl ObservationTable {
    /// Dựng bảng sau khi kiểm tra tên cột duy nhất và độ rộng từng dòng.
    pub fn new(
        date_column: impl Into<String>,
        columns: Vec<ColumnSpec>,
        records: Vec<Record>,
    ) -> Result<Self, LabtrendError> {
        let date_column = date_column.into();
        let mut seen = HashSet::new();
        seen.insert(date_column.as_str());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(LabtrendError::MalformedHeader(format!(
                    "tên cột `{}` bị trùng",
                    column.name
                )));
            }
        }

        if let Some((index, record)) = records
            .iter()
            .enumerate()
            .find(|(_, record)| record.values.len() != columns.len())
        {
            return Err(LabtrendError::Parse(format!(
                "dòng {index} có {} ô, cần {}",
                record.values.len(),
                columns.len()
            )));
        }

        Ok(Self {
            date_column,
            columns,
            records,
        })
    }

    pub fn date_column(&self) -> &str {
        &self.date_column
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Tên các cột số, theo thứ tự trong bảng (danh sách xét nghiệm).
    pub fn numeric_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|column| column.kind == ColumnKind::Number)
            .map(|column| column.name.as_str())
    }

    /// Giá trị của `column` tại dòng `row`.
    pub fn cell(&self, row: usize, column: &str) -> Option<&CellValue> {
        let index = self.column_index(column)?;
        self.records.get(row)?.values.get(index)
    }

    /// Ngày nhỏ nhất và lớn nhất có mặt trong bảng.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.records.iter().filter_map(|record| record.date);
        let first = dates.next()?;
        Some(dates.fold((first, first), |(min, max), date| {
            (min.min(date), max.max(date))
        }))
    }

    /// Giữ các dòng có ngày nằm trong `[start, end]`, tính cả hai đầu.
    ///
    /// Dòng thiếu ngày không bao giờ khớp.
    pub fn filter_by_date(&self, start: NaiveDate, end: NaiveDate) -> ObservationTable {
        let records = self
            .records
            .iter()
            .filter(|record| matches!(record.date, Some(date) if date >= start && date <= end))
            .cloned()
            .collect();

        ObservationTable {
            date_column: self.date_column.clone(),
            columns: self.columns.clone(),
            records,
        }
    }

    /// Chuỗi (ngày, giá trị) của một cột số; bỏ qua dòng thiếu ngày.
    pub fn series(&self, column: &str) -> Result<Vec<(NaiveDate, Option<f64>)>, LabtrendError> {
        let index = self
            .column_index(column)
            .ok_or_else(|| LabtrendError::UnknownColumn(column.to_string()))?;
        if self.columns[index].kind != ColumnKind::Number {
            return Err(LabtrendError::NonNumericColumn(column.to_string()));
        }

        Ok(self
            .records
            .iter()
            .filter_map(|record| {
                let date = record.date?;
                Some((date, record.values[index].as_number()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("ngày hợp lệ")
    }

    fn hemoglobin_table() -> ObservationTable {
        let records = (1..=5)
            .map(|day| Record {
                date: Some(date(2024, 1, day)),
                values: vec![CellValue::Number(9.0 + day as f64)],
            })
            .collect();
        ObservationTable::new("DATA", vec![ColumnSpec::number("Hemoglobina")], records)
            .expect("bảng hợp lệ")
    }

    #[test]
    fn filter_keeps_both_bounds() {
        let table = hemoglobin_table();
        let filtered = table.filter_by_date(date(2024, 1, 2), date(2024, 1, 4));
        let values: Vec<_> = filtered
            .series("Hemoglobina")
            .expect("cột số")
            .into_iter()
            .map(|(_, value)| value)
            .collect();
        assert_eq!(values, vec![Some(11.0), Some(12.0), Some(13.0)]);
        assert_eq!(table.len(), 5, "bảng gốc không đổi");
    }

    #[test]
    fn widening_range_never_drops_records() {
        let table = hemoglobin_table();
        let narrow = table.filter_by_date(date(2024, 1, 3), date(2024, 1, 3));
        let wide = table.filter_by_date(date(2024, 1, 2), date(2024, 1, 5));
        assert_eq!(narrow.len(), 1);
        assert!(narrow
            .records()
            .iter()
            .all(|record| wide.records().contains(record)));
    }

    #[test]
    fn reversed_range_is_empty() {
        let table = hemoglobin_table();
        assert!(table
            .filter_by_date(date(2024, 1, 4), date(2024, 1, 2))
            .is_empty());
    }

    #[test]
    fn missing_dates_never_match_filter() {
        let table = ObservationTable::new(
            "DATA",
            vec![ColumnSpec::number("Ureia")],
            vec![
                Record {
                    date: None,
                    values: vec![CellValue::Number(40.0)],
                },
                Record {
                    date: Some(date(2024, 2, 1)),
                    values: vec![CellValue::Missing],
                },
            ],
        )
        .expect("bảng hợp lệ");
        let filtered = table.filter_by_date(date(2000, 1, 1), date(2100, 1, 1));
        assert_eq!(filtered.len(), 1);
        assert_eq!(
            filtered.series("Ureia").expect("cột số"),
            vec![(date(2024, 2, 1), None)]
        );
        assert_eq!(table.date_bounds(), Some((date(2024, 2, 1), date(2024, 2, 1))));
    }

    #[test]
    fn numeric_coercion_is_idempotent() {
        let cells = [
            CellValue::Text(" 12.5 ".into()),
            CellValue::Text("abc".into()),
            CellValue::Text(String::new()),
            CellValue::Text("NaN".into()),
            CellValue::Number(3.0),
            CellValue::Missing,
        ];
        for cell in &cells {
            let once = coerce_numeric(cell);
            assert_eq!(coerce_numeric(&once), once);
        }
        assert_eq!(coerce_numeric(&cells[0]), CellValue::Number(12.5));
        assert!(coerce_numeric(&cells[1]).is_missing());
        assert!(coerce_numeric(&cells[3]).is_missing());
    }

    #[test]
    fn sheet_dates_use_abbreviated_month() {
        assert_eq!(
            parse_sheet_date("05-Jan-2024", "%d-%b-%Y"),
            Some(date(2024, 1, 5))
        );
        assert_eq!(parse_sheet_date("2024-01-05", "%d-%b-%Y"), None);
        assert_eq!(parse_sheet_date("  ", "%d-%b-%Y"), None);
    }

    #[test]
    fn series_rejects_unknown_and_text_columns() {
        let table = ObservationTable::new(
            "DATA",
            vec![ColumnSpec::text("DESCRICAO")],
            Vec::new(),
        )
        .expect("bảng hợp lệ");
        assert!(matches!(
            table.series("Hemoglobina"),
            Err(LabtrendError::UnknownColumn(name)) if name == "Hemoglobina"
        ));
        assert!(matches!(
            table.series("DESCRICAO"),
            Err(LabtrendError::NonNumericColumn(_))
        ));
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = ObservationTable::new(
            "DATA",
            vec![ColumnSpec::number("PCR"), ColumnSpec::number("PCR")],
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, LabtrendError::MalformedHeader(_)));
    }

    #[test]
    fn deserialized_tables_are_checked_like_new_ones() {
        let short_row = r#"{
            "date_column": "DATA",
            "columns": [{ "name": "X", "kind": "number" }],
            "records": [{ "date": "2024-01-01", "values": [] }]
        }"#;
        let err = serde_json::from_str::<ObservationTable>(short_row).unwrap_err();
        assert!(err.to_string().contains("dòng 0"));

        let ok = r#"{
            "date_column": "DATA",
            "columns": [{ "name": "X", "kind": "number" }],
            "records": [{ "date": "2024-01-01", "values": [7.5] }]
        }"#;
        let table: ObservationTable = serde_json::from_str(ok).expect("bảng hợp lệ");
        assert_eq!(
            table.series("X").expect("cột số"),
            vec![(date(2024, 1, 1), Some(7.5))]
        );
    }
}
