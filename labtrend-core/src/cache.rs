//! Lịch sử biểu đồ đã vẽ trong phiên.

use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Band, Marker};

pub const DEFAULT_CHART_HISTORY: usize = 10;

/// Ảnh PNG đã vẽ cùng tham số tạo ra nó.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderedChart {
    pub column: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub markers: Vec<Marker>,
    pub bands: Vec<Band>,
    pub show_values: bool,
    pub generated_at: DateTime<Utc>,
    #[serde(skip)]
    pub png: Vec<u8>,
}

impl RenderedChart {
    /// Tên file khi tải biểu đồ xuống.
    pub fn file_name(&self) -> String {
        format!("{}_grafico.png", self.column)
    }
}

/// Giữ tối đa `capacity` biểu đồ gần nhất, loại bỏ cái cũ nhất trước.
#[derive(Debug, Clone)]
pub struct ChartCache {
    capacity: usize,
    charts: VecDeque<RenderedChart>,
}

impl Default for ChartCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHART_HISTORY)
    }
}

impl ChartCache {
    /// Dung lượng tối thiểu là 1.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            charts: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, chart: RenderedChart) {
        while self.charts.len() >= self.capacity {
            if let Some(evicted) = self.charts.pop_front() {
                log::debug!("bỏ biểu đồ cũ {} khỏi lịch sử", evicted.file_name());
            }
        }
        self.charts.push_back(chart);
    }

    /// Các biểu đồ theo thứ tự cũ nhất trước.
    pub fn list(&self) -> impl Iterator<Item = &RenderedChart> {
        self.charts.iter()
    }

    pub fn latest(&self) -> Option<&RenderedChart> {
        self.charts.back()
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
