//! Logic lõi: bảng quan sát đã chuẩn hóa, chú thích biểu đồ và bộ nhớ phiên.

mod annotation;
mod cache;
mod table;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use annotation::{
    parse_annotation_date, parse_annotation_lines, Annotation, AnnotationBatch, AnnotationStore,
    Band, Marker, RejectReason, RejectedLine,
};
pub use cache::{ChartCache, RenderedChart, DEFAULT_CHART_HISTORY};
pub use table::{
    coerce_numeric, parse_sheet_date, CellValue, ColumnKind, ColumnSpec, ObservationTable,
    Record,
};

/// Cấu hình chung cho việc đọc bảng tính và vẽ biểu đồ.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabtrendConfig {
    /// ID của Google Sheet (khi dùng nguồn `sheets:`).
    pub spreadsheet_id: Option<String>,
    /// Chỉ số dòng tiêu đề (0-based). Các dòng phía trên là banner.
    pub header_row: usize,
    /// Tên cột ngày làm trục thời gian.
    pub date_column: String,
    /// Định dạng ngày trong bảng tính (chrono, ví dụ `05-Jan-2024`).
    pub date_format: String,
    /// Các cột bị loại bỏ nếu có mặt.
    pub drop_columns: Vec<String>,
    /// Các cột giữ nguyên dạng văn bản, không ép kiểu số.
    pub text_columns: Vec<String>,
    /// Thời gian (giây) giữ bảng đã tải trong bộ nhớ đệm.
    pub cache_ttl_secs: u64,
    /// Giới hạn thời gian (giây) cho mỗi lần gọi nguồn dữ liệu từ xa.
    pub fetch_timeout_secs: u64,
    /// Số biểu đồ gần nhất được giữ lại trong phiên.
    pub chart_history: usize,
    pub chart_width: u32,
    pub chart_height: u32,
    /// Tên tab chứa kết quả xét nghiệm.
    pub lab_tab: String,
    /// Tên tab chứa diễn tiến lâm sàng.
    pub clinical_tab: String,
    /// Cột mô tả trong tab lâm sàng.
    pub description_column: String,
}

impl Default for LabtrendConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            header_row: 1,
            date_column: "DATA".to_string(),
            date_format: "%d-%b-%Y".to_string(),
            drop_columns: vec!["Status".to_string()],
            text_columns: Vec::new(),
            cache_ttl_secs: 600,
            fetch_timeout_secs: 30,
            chart_history: DEFAULT_CHART_HISTORY,
            chart_width: 1200,
            chart_height: 800,
            lab_tab: "Laboratório".to_string(),
            clinical_tab: "Evolução Clínica".to_string(),
            description_column: "DESCRICAO".to_string(),
        }
    }
}

impl LabtrendConfig {
    /// Đọc cấu hình từ file JSON. Trường nào thiếu sẽ lấy giá trị mặc định.
    pub fn from_json_str(input: &str) -> Result<Self, LabtrendError> {
        serde_json::from_str(input).map_err(|err| LabtrendError::Config(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, LabtrendError> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            LabtrendError::Config(format!("không đọc được {}: {err}", path.display()))
        })?;
        Self::from_json_str(&content)
    }
}

/// Lỗi chung khi tải dữ liệu và vẽ biểu đồ.
#[derive(Debug, thiserror::Error)]
pub enum LabtrendError {
    #[error("Không truy cập được nguồn dữ liệu: {0}")]
    SourceUnavailable(String),
    #[error("Dòng tiêu đề không hợp lệ: {0}")]
    MalformedHeader(String),
    #[error("Không có cột `{0}` trong bảng")]
    UnknownColumn(String),
    #[error("Cột `{0}` không phải cột số")]
    NonNumericColumn(String),
    #[error("Không có dữ liệu cho `{0}` trong khoảng thời gian đã chọn")]
    EmptySeries(String),
    #[error("Không vẽ được biểu đồ: {0}")]
    Render(String),
    #[error("Cấu hình không hợp lệ: {0}")]
    Config(String),
    #[error("Không đọc được dữ liệu: {0}")]
    Parse(String),
}

/// Trạng thái của một phiên làm việc: chú thích đang dùng và lịch sử biểu đồ.
///
/// Mỗi phiên sở hữu bản riêng, không chia sẻ giữa các phiên.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub annotations: AnnotationStore,
    pub charts: ChartCache,
}

impl Session {
    pub fn new(config: &LabtrendConfig) -> Self {
        Self {
            annotations: AnnotationStore::default(),
            charts: ChartCache::with_capacity(config.chart_history),
        }
    }

    /// Nhận các dòng chú thích dạng văn bản, thêm những dòng hợp lệ vào phiên
    /// và trả lại các dòng bị từ chối.
    pub fn import_annotations(&mut self, text: &str) -> Vec<RejectedLine> {
        let batch = parse_annotation_lines(text);
        for annotation in batch.accepted {
            self.annotations.append(annotation);
        }
        for rejected in &batch.rejected {
            log::warn!(
                "bỏ qua dòng chú thích {}: {} ({})",
                rejected.line_no,
                rejected.content,
                rejected.reason
            );
        }
        batch.rejected
    }
}
