//! Row sources: anything that can hand back a tab as a grid of text cells.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use labtrend_core::LabtrendError;

/// Read-only access to the full cell grid of a named tab.
pub trait RowSource: Send + Sync {
    fn fetch_rows(&self, tab: &str) -> Result<Vec<Vec<String>>, LabtrendError>;

    /// Short human description used in logs.
    fn describe(&self) -> String;
}

impl<T: RowSource + ?Sized> RowSource for Box<T> {
    fn fetch_rows(&self, tab: &str) -> Result<Vec<Vec<String>>, LabtrendError> {
        (**self).fetch_rows(tab)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// In-memory tabs.
#[derive(Debug, Clone, Default)]
pub struct GridSource {
    tabs: HashMap<String, Vec<Vec<String>>>,
}

impl GridSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tab(mut self, name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        self.tabs.insert(name.into(), rows);
        self
    }
}

impl RowSource for GridSource {
    fn fetch_rows(&self, tab: &str) -> Result<Vec<Vec<String>>, LabtrendError> {
        self.tabs
            .get(tab)
            .cloned()
            .ok_or_else(|| LabtrendError::SourceUnavailable(format!("tab `{tab}` does not exist")))
    }

    fn describe(&self) -> String {
        format!("in-memory grid ({} tabs)", self.tabs.len())
    }
}

/// CSV exports: either a directory with one `{tab}.csv` per tab, or a single
/// file answering for every tab.
#[derive(Debug, Clone)]
pub enum CsvSource {
    Directory(PathBuf),
    File(PathBuf),
}

impl CsvSource {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            CsvSource::Directory(path)
        } else {
            CsvSource::File(path)
        }
    }

    fn path_for(&self, tab: &str) -> PathBuf {
        match self {
            CsvSource::Directory(dir) => dir.join(format!("{tab}.csv")),
            CsvSource::File(path) => path.clone(),
        }
    }
}

impl RowSource for CsvSource {
    fn fetch_rows(&self, tab: &str) -> Result<Vec<Vec<String>>, LabtrendError> {
        let path = self.path_for(tab);
        if !path.is_file() {
            return Err(LabtrendError::SourceUnavailable(format!(
                "tab `{tab}` not found at {}",
                path.display()
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)
            .map_err(|err| {
                LabtrendError::SourceUnavailable(format!("{}: {err}", path.display()))
            })?;

        reader
            .records()
            .map(|record| {
                record
                    .map(|record| record.iter().map(str::to_string).collect())
                    .map_err(|err| LabtrendError::Parse(format!("{}: {err}", path.display())))
            })
            .collect()
    }

    fn describe(&self) -> String {
        match self {
            CsvSource::Directory(dir) => format!("CSV directory {}", dir.display()),
            CsvSource::File(path) => format!("CSV file {}", path.display()),
        }
    }
}

/// Local workbook (`.xlsx`, `.xlsm`, `.xls`, `.ods`).
///
/// Date cells are written back as text in `date_format` so they go through the
/// same parsing as every other source.
#[derive(Debug, Clone)]
pub struct WorkbookSource {
    path: PathBuf,
    date_format: String,
}

impl WorkbookSource {
    pub fn new(path: impl Into<PathBuf>, date_format: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            date_format: date_format.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RowSource for WorkbookSource {
    fn fetch_rows(&self, tab: &str) -> Result<Vec<Vec<String>>, LabtrendError> {
        let mut workbook = open_workbook_auto(&self.path).map_err(|err| {
            LabtrendError::SourceUnavailable(format!("{}: {err}", self.path.display()))
        })?;
        let range = workbook.worksheet_range(tab).map_err(|err| {
            LabtrendError::SourceUnavailable(format!("tab `{tab}`: {err}"))
        })?;

        // The used range may not start at A1; pad so row indices match the sheet.
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<String>> = vec![Vec::new(); start_row as usize];
        for row in range.rows() {
            let mut cells = vec![String::new(); start_col as usize];
            cells.extend(row.iter().map(|cell| workbook_cell_text(cell, &self.date_format)));
            rows.push(cells);
        }
        Ok(rows)
    }

    fn describe(&self) -> String {
        format!("workbook {}", self.path.display())
    }
}

fn workbook_cell_text(cell: &Data, date_format: &str) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(text) => text.clone(),
        Data::Float(value) => value.to_string(),
        Data::Int(value) => value.to_string(),
        Data::DateTime(value) => value
            .as_datetime()
            .map(|datetime| datetime.format(date_format).to_string())
            .unwrap_or_else(|| value.as_f64().to_string()),
        Data::DateTimeIso(text) => text
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .map(|date| date.format(date_format).to_string())
            .unwrap_or_else(|| text.clone()),
        other => other.to_string(),
    }
}

#[cfg(feature = "sheets-api")]
pub use sheets_api::{SheetsApiSource, SheetsCredentials};

#[cfg(feature = "sheets-api")]
mod sheets_api {
    use std::time::Duration;

    use labtrend_core::LabtrendError;
    use reqwest::Url;
    use serde::Deserialize;
    use serde_json::Value;

    use super::RowSource;

    const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";
    const TOKEN_ENV: &str = "GOOGLE_SHEETS_TOKEN";
    const API_KEY_ENV: &str = "GOOGLE_SHEETS_API_KEY";

    /// Credentials supplied by the hosting environment.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SheetsCredentials {
        BearerToken(String),
        ApiKey(String),
        Anonymous,
    }

    impl SheetsCredentials {
        /// `GOOGLE_SHEETS_TOKEN` wins over `GOOGLE_SHEETS_API_KEY`.
        pub fn from_env() -> Self {
            if let Ok(token) = std::env::var(TOKEN_ENV) {
                if !token.trim().is_empty() {
                    return SheetsCredentials::BearerToken(token.trim().to_string());
                }
            }
            match std::env::var(API_KEY_ENV) {
                Ok(key) if !key.trim().is_empty() => SheetsCredentials::ApiKey(key.trim().to_string()),
                _ => SheetsCredentials::Anonymous,
            }
        }
    }

    #[derive(Deserialize)]
    struct ValueRange {
        #[serde(default)]
        values: Vec<Vec<Value>>,
    }

    /// Google Sheets v4 `spreadsheets.values.get`.
    #[derive(Debug, Clone)]
    pub struct SheetsApiSource {
        spreadsheet_id: String,
        credentials: SheetsCredentials,
        base_url: String,
        client: reqwest::blocking::Client,
    }

    impl SheetsApiSource {
        pub fn new(
            spreadsheet_id: impl Into<String>,
            credentials: SheetsCredentials,
            timeout: Duration,
        ) -> Result<Self, LabtrendError> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|err| LabtrendError::SourceUnavailable(err.to_string()))?;
            Ok(Self {
                spreadsheet_id: spreadsheet_id.into(),
                credentials,
                base_url: DEFAULT_BASE_URL.to_string(),
                client,
            })
        }

        /// Point at another endpoint (proxy, emulator).
        pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = base_url.into();
            self
        }

        pub(crate) fn values_url(&self, tab: &str) -> Result<Url, LabtrendError> {
            let mut url = Url::parse(&self.base_url)
                .map_err(|err| LabtrendError::SourceUnavailable(format!("bad base url: {err}")))?;
            url.path_segments_mut()
                .map_err(|_| LabtrendError::SourceUnavailable("base url cannot hold a path".into()))?
                .pop_if_empty()
                .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", tab]);
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("majorDimension", "ROWS");
                if let SheetsCredentials::ApiKey(key) = &self.credentials {
                    query.append_pair("key", key);
                }
            }
            Ok(url)
        }
    }

    impl RowSource for SheetsApiSource {
        fn fetch_rows(&self, tab: &str) -> Result<Vec<Vec<String>>, LabtrendError> {
            let mut request = self.client.get(self.values_url(tab)?);
            if let SheetsCredentials::BearerToken(token) = &self.credentials {
                request = request.bearer_auth(token);
            }

            let response = request.send().map_err(|err| {
                if err.is_timeout() {
                    LabtrendError::SourceUnavailable(format!("timed out fetching tab `{tab}`"))
                } else {
                    LabtrendError::SourceUnavailable(format!("fetching tab `{tab}`: {err}"))
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(LabtrendError::SourceUnavailable(format!(
                    "Sheets API answered {status} for tab `{tab}`"
                )));
            }

            let body = response
                .text()
                .map_err(|err| LabtrendError::SourceUnavailable(err.to_string()))?;
            rows_from_payload(&body)
        }

        fn describe(&self) -> String {
            format!("Google Sheet {}", self.spreadsheet_id)
        }
    }

    pub(crate) fn rows_from_payload(body: &str) -> Result<Vec<Vec<String>>, LabtrendError> {
        let payload: ValueRange =
            serde_json::from_str(body).map_err(|err| LabtrendError::Parse(err.to_string()))?;
        Ok(payload
            .values
            .into_iter()
            .map(|row| row.into_iter().map(value_text).collect())
            .collect())
    }

    fn value_text(value: Value) -> String {
        match value {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

}
