use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use labtrend_core::LabtrendConfig;
use labtrend_sheets::{
    CsvSource, RowSource, SheetsApiSource, SheetsCredentials, WorkbookSource,
};

/// Nơi lấy dữ liệu, dạng `csv:PATH`, `xlsx:PATH` hoặc `sheets:SPREADSHEET_ID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Csv(PathBuf),
    Workbook(PathBuf),
    Sheets(String),
}

impl FromStr for SourceSpec {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, target) = value
            .split_once(':')
            .ok_or_else(|| anyhow!("nguồn `{value}` cần dạng KIND:TARGET"))?;
        if target.is_empty() {
            bail!("nguồn `{value}` thiếu đường dẫn hoặc ID");
        }
        match kind.to_lowercase().as_str() {
            "csv" => Ok(SourceSpec::Csv(PathBuf::from(target))),
            "xlsx" | "xls" | "ods" | "workbook" => Ok(SourceSpec::Workbook(PathBuf::from(target))),
            "sheets" | "gsheet" => Ok(SourceSpec::Sheets(target.to_string())),
            other => bail!("không hỗ trợ nguồn `{other}` (dùng csv, xlsx hoặc sheets)"),
        }
    }
}

impl SourceSpec {
    /// Nguồn mặc định: Google Sheet trong cấu hình.
    pub fn resolve(explicit: Option<SourceSpec>, config: &LabtrendConfig) -> anyhow::Result<Self> {
        if let Some(spec) = explicit {
            return Ok(spec);
        }
        config
            .spreadsheet_id
            .clone()
            .map(SourceSpec::Sheets)
            .context("chưa chỉ định --source và cấu hình không có spreadsheet_id")
    }

    pub fn open(&self, config: &LabtrendConfig) -> anyhow::Result<Box<dyn RowSource>> {
        Ok(match self {
            SourceSpec::Csv(path) => Box::new(CsvSource::open(path)),
            SourceSpec::Workbook(path) => {
                Box::new(WorkbookSource::new(path, config.date_format.clone()))
            }
            SourceSpec::Sheets(id) => Box::new(SheetsApiSource::new(
                id.clone(),
                SheetsCredentials::from_env(),
                Duration::from_secs(config.fetch_timeout_secs),
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_specs_parse() {
        assert_eq!(
            "csv:dados/".parse::<SourceSpec>().expect("hợp lệ"),
            SourceSpec::Csv(PathBuf::from("dados/"))
        );
        assert_eq!(
            "XLSX:paciente.xlsx".parse::<SourceSpec>().expect("hợp lệ"),
            SourceSpec::Workbook(PathBuf::from("paciente.xlsx"))
        );
        assert_eq!(
            "sheets:12m2kUbh".parse::<SourceSpec>().expect("hợp lệ"),
            SourceSpec::Sheets("12m2kUbh".into())
        );
        assert!("ftp:host".parse::<SourceSpec>().is_err());
        assert!("csv:".parse::<SourceSpec>().is_err());
        assert!("paciente.csv".parse::<SourceSpec>().is_err());
    }

    #[test]
    fn config_spreadsheet_is_the_fallback() {
        let config = LabtrendConfig {
            spreadsheet_id: Some("abc".into()),
            ..LabtrendConfig::default()
        };
        assert_eq!(
            SourceSpec::resolve(None, &config).expect("có ID"),
            SourceSpec::Sheets("abc".into())
        );
        assert!(SourceSpec::resolve(None, &LabtrendConfig::default()).is_err());
    }
}
