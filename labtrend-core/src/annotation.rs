//! Chú thích trên biểu đồ: mốc thời gian và khoảng thời gian tô màu.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Mốc thời gian, vẽ thành đường thẳng đứng.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Marker {
    pub date: NaiveDate,
    pub label: String,
}

/// Khoảng thời gian được tô màu. Không bắt buộc `start <= end`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Band {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
}

impl Band {
    /// Hai đầu mút theo thứ tự tăng dần.
    pub fn ordered(&self) -> (NaiveDate, NaiveDate) {
        if self.start <= self.end {
            (self.start, self.end)
        } else {
            (self.end, self.start)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    Marker(Marker),
    Band(Band),
}

/// Danh sách chú thích của một phiên, giữ thứ tự thêm vào.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnnotationStore {
    markers: Vec<Marker>,
    bands: Vec<Band>,
}

impl AnnotationStore {
    pub fn append(&mut self, annotation: Annotation) {
        match annotation {
            Annotation::Marker(marker) => self.markers.push(marker),
            Annotation::Band(band) => self.bands.push(band),
        }
    }

    pub fn add_marker(&mut self, date: NaiveDate, label: impl Into<String>) {
        self.append(Annotation::Marker(Marker {
            date,
            label: label.into(),
        }));
    }

    pub fn add_band(&mut self, start: NaiveDate, end: NaiveDate, label: impl Into<String>) {
        self.append(Annotation::Band(Band {
            start,
            end,
            label: label.into(),
        }));
    }

    /// Xóa mốc tại vị trí `index`; `None` nếu vượt quá danh sách.
    pub fn remove_marker_at(&mut self, index: usize) -> Option<Marker> {
        (index < self.markers.len()).then(|| self.markers.remove(index))
    }

    pub fn remove_band_at(&mut self, index: usize) -> Option<Band> {
        (index < self.bands.len()).then(|| self.bands.remove(index))
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.bands.is_empty()
    }

    pub fn clear(&mut self) {
        self.markers.clear();
        self.bands.clear();
    }
}

/// Lý do một dòng chú thích bị từ chối.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    WrongFieldCount { found: usize },
    InvalidDate { value: String },
    EmptyLabel,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::WrongFieldCount { found } => {
                write!(f, "cần 2 hoặc 3 trường, nhận được {found}")
            }
            RejectReason::InvalidDate { value } => write!(f, "ngày không hợp lệ: {value}"),
            RejectReason::EmptyLabel => write!(f, "thiếu mô tả"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RejectedLine {
    /// Số thứ tự dòng, bắt đầu từ 1.
    pub line_no: usize,
    pub content: String,
    pub reason: RejectReason,
}

/// Kết quả đọc nhiều dòng chú thích.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnnotationBatch {
    pub accepted: Vec<Annotation>,
    pub rejected: Vec<RejectedLine>,
}

const ANNOTATION_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%b-%Y"];

/// Đọc ngày trong chú thích: `2024-01-05`, `05/01/2024` hoặc `05-Jan-2024`.
pub fn parse_annotation_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    ANNOTATION_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Đọc chú thích theo từng dòng.
///
/// `ngày; mô tả` tạo mốc, `bắt đầu; kết thúc; mô tả` tạo khoảng. Dòng trống
/// và dòng bắt đầu bằng `#` bị bỏ qua. Dòng lỗi không làm hỏng cả lô.
pub fn parse_annotation_lines(text: &str) -> AnnotationBatch {
    let mut batch = AnnotationBatch::default();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_annotation_line(line) {
            Ok(annotation) => batch.accepted.push(annotation),
            Err(reason) => batch.rejected.push(RejectedLine {
                line_no: index + 1,
                content: line.to_string(),
                reason,
            }),
        }
    }

    batch
}

fn parse_annotation_line(line: &str) -> Result<Annotation, RejectReason> {
    let fields: Vec<&str> = line.split(';').map(str::trim).collect();
    match fields.as_slice() {
        [date, label] => Ok(Annotation::Marker(Marker {
            date: require_date(date)?,
            label: require_label(label)?,
        })),
        [start, end, label] => Ok(Annotation::Band(Band {
            start: require_date(start)?,
            end: require_date(end)?,
            label: require_label(label)?,
        })),
        other => Err(RejectReason::WrongFieldCount { found: other.len() }),
    }
}

fn require_date(value: &str) -> Result<NaiveDate, RejectReason> {
    parse_annotation_date(value).ok_or_else(|| RejectReason::InvalidDate {
        value: value.to_string(),
    })
}

fn require_label(value: &str) -> Result<String, RejectReason> {
    if value.is_empty() {
        Err(RejectReason::EmptyLabel)
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("ngày hợp lệ")
    }

    #[test]
    fn store_keeps_insertion_order_and_duplicates() {
        let mut store = AnnotationStore::default();
        store.add_marker(date(2024, 1, 3), "Cirurgia");
        store.add_marker(date(2024, 1, 1), "Admissão");
        store.add_marker(date(2024, 1, 3), "Cirurgia");
        let labels: Vec<_> = store.markers().iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, ["Cirurgia", "Admissão", "Cirurgia"]);
    }

    #[test]
    fn remove_out_of_range_is_none() {
        let mut store = AnnotationStore::default();
        store.add_band(date(2024, 1, 1), date(2024, 1, 2), "UTI");
        assert!(store.remove_band_at(3).is_none());
        assert!(store.remove_marker_at(0).is_none());
        let removed = store.remove_band_at(0).expect("có khoảng");
        assert_eq!(removed.label, "UTI");
        assert!(store.is_empty());
    }

    #[test]
    fn reversed_band_orders_bounds() {
        let band = Band {
            start: date(2024, 3, 10),
            end: date(2024, 3, 1),
            label: "Antibiótico".into(),
        };
        assert_eq!(band.ordered(), (date(2024, 3, 1), date(2024, 3, 10)));
    }

    #[test]
    fn lines_are_accepted_or_rejected_individually() {
        let text = "\
# comentário
2024-01-05; Transfusão

05/01/2024; 10-Jan-2024; Corticoide
2024-13-01; Data errada
2024-01-07;
só texto
";
        let batch = parse_annotation_lines(text);
        assert_eq!(batch.accepted.len(), 2);
        assert_eq!(
            batch.accepted[1],
            Annotation::Band(Band {
                start: date(2024, 1, 5),
                end: date(2024, 1, 10),
                label: "Corticoide".into(),
            })
        );

        let reasons: Vec<_> = batch
            .rejected
            .iter()
            .map(|line| (line.line_no, line.reason.clone()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (
                    5,
                    RejectReason::InvalidDate {
                        value: "2024-13-01".into()
                    }
                ),
                (6, RejectReason::EmptyLabel),
                (7, RejectReason::WrongFieldCount { found: 1 }),
            ]
        );
    }
}
