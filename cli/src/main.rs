mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use labtrend_core::{
    parse_annotation_date, CellValue, LabtrendConfig, ObservationTable, Session,
};
use labtrend_render::{clinical_summary, render_event_timeline, render_in_session, RenderOptions};
use labtrend_sheets::{CachedLoader, LoadOptions, RowSource};

use source::SourceSpec;

#[derive(Parser, Debug)]
#[command(
    name = "labtrend",
    about = "Vẽ biểu đồ diễn tiến xét nghiệm từ bảng tính theo dõi bệnh nhân."
)]
struct Args {
    /// File cấu hình JSON.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Nguồn dữ liệu: csv:PATH, xlsx:PATH hoặc sheets:SPREADSHEET_ID.
    #[arg(short, long, global = true)]
    source: Option<SourceSpec>,

    /// Ghi log chi tiết.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Liệt kê các xét nghiệm (cột số) và khoảng ngày có dữ liệu.
    Columns {
        #[arg(long)]
        tab: Option<String>,
    },
    /// In bảng đã chuẩn hóa.
    Table {
        #[arg(long)]
        tab: Option<String>,
        /// Xuất JSON thay vì bảng văn bản.
        #[arg(long)]
        json: bool,
    },
    /// Vẽ biểu đồ một xét nghiệm theo thời gian.
    Render {
        /// Tên xét nghiệm (cột).
        #[arg(short, long)]
        exam: String,
        /// Ngày bắt đầu (mặc định: ngày sớm nhất trong bảng).
        #[arg(long)]
        from: Option<String>,
        /// Ngày kết thúc (mặc định: ngày muộn nhất trong bảng).
        #[arg(long)]
        to: Option<String>,
        /// Mốc thời gian "ngày;mô tả", lặp lại được.
        #[arg(long = "marker")]
        markers: Vec<String>,
        /// Khoảng thời gian "bắt đầu;kết thúc;mô tả", lặp lại được.
        #[arg(long = "band")]
        bands: Vec<String>,
        /// File chú thích, mỗi dòng một mốc hoặc một khoảng.
        #[arg(long)]
        annotations: Option<PathBuf>,
        /// Ghi giá trị lên từng điểm.
        #[arg(long)]
        values: bool,
        /// File PNG đầu ra (mặc định: {exam}_grafico.png).
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(long)]
        tab: Option<String>,
    },
    /// Tóm tắt bệnh sử từ tab diễn tiến lâm sàng.
    Summary {
        #[arg(long)]
        tab: Option<String>,
        /// Cột mô tả.
        #[arg(long)]
        column: Option<String>,
    },
    /// Vẽ dòng thời gian các sự kiện lâm sàng.
    Timeline {
        #[arg(long)]
        tab: Option<String>,
        #[arg(long)]
        column: Option<String>,
        #[arg(short, long, default_value = "linha_temporal.png")]
        out: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => {
            log::debug!("đọc cấu hình từ {}", path.display());
            LabtrendConfig::load(path)?
        }
        None => LabtrendConfig::default(),
    };

    let spec = SourceSpec::resolve(args.source.clone(), &config)?;
    log::debug!("nguồn dữ liệu: {spec:?}");
    let options =
        LoadOptions::from(&config).with_text_columns([config.description_column.clone()]);
    let loader = CachedLoader::new(
        spec.open(&config)?,
        options,
        Duration::from_secs(config.cache_ttl_secs),
    );

    match args.command {
        Command::Columns { tab } => {
            let table = load_tab(&loader, tab.as_deref().unwrap_or(&config.lab_tab))?;
            for column in table.numeric_columns() {
                println!("{column}");
            }
            match table.date_bounds() {
                Some((first, last)) => println!("Khoảng ngày: {first} .. {last}"),
                None => println!("Khoảng ngày: --"),
            }
        }

        Command::Table { tab, json } => {
            let table = load_tab(&loader, tab.as_deref().unwrap_or(&config.lab_tab))?;
            if json {
                println!("{}", serde_json::to_string_pretty(table.as_ref())?);
            } else {
                print_table(&table);
            }
        }

        Command::Render {
            exam,
            from,
            to,
            markers,
            bands,
            annotations,
            values,
            out,
            tab,
        } => {
            let table = load_tab(&loader, tab.as_deref().unwrap_or(&config.lab_tab))?;
            let (first, last) = table
                .date_bounds()
                .context("bảng không có dòng nào có ngày hợp lệ")?;
            let start = parse_bound(from.as_deref(), first)?;
            let end = parse_bound(to.as_deref(), last)?;

            let mut session = Session::new(&config);
            let mut lines: Vec<String> = markers.into_iter().chain(bands).collect();
            if let Some(path) = annotations {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Không đọc được file {path:?}"))?;
                lines.push(content);
            }
            let rejected = session.import_annotations(&lines.join("\n"));

            let chart = render_in_session(
                &mut session,
                &table,
                &exam,
                start,
                end,
                values,
                &RenderOptions::from(&config),
            )?;
            let out = out.unwrap_or_else(|| PathBuf::from(chart.file_name()));
            std::fs::write(&out, &chart.png)
                .with_context(|| format!("Không ghi được file {out:?}"))?;

            println!(
                "Biểu đồ: {}\nKhoảng: {} .. {}\nMốc: {}\nKhoảng tô màu: {}\nChú thích bị bỏ qua: {}",
                out.display(),
                chart.start,
                chart.end,
                chart.markers.len(),
                chart.bands.len(),
                rejected.len()
            );
        }

        Command::Summary { tab, column } => {
            let table = load_tab(&loader, tab.as_deref().unwrap_or(&config.clinical_tab))?;
            let column = column.unwrap_or_else(|| config.description_column.clone());
            println!("{}", clinical_summary(&table, &column)?);
        }

        Command::Timeline { tab, column, out } => {
            let table = load_tab(&loader, tab.as_deref().unwrap_or(&config.clinical_tab))?;
            let column = column.unwrap_or_else(|| config.description_column.clone());
            let png = render_event_timeline(&table, &column, &RenderOptions::from(&config))?;
            std::fs::write(&out, png).with_context(|| format!("Không ghi được file {out:?}"))?;
            println!("Dòng thời gian: {}", out.display());
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn load_tab<S: RowSource>(
    loader: &CachedLoader<S>,
    tab: &str,
) -> anyhow::Result<Arc<ObservationTable>> {
    loader
        .load(tab)
        .with_context(|| format!("Lỗi khi tải dữ liệu tab `{tab}`"))
}

fn parse_bound(value: Option<&str>, fallback: NaiveDate) -> anyhow::Result<NaiveDate> {
    match value {
        None => Ok(fallback),
        Some(text) => match parse_annotation_date(text) {
            Some(date) => Ok(date),
            None => bail!("ngày `{text}` không hợp lệ (dùng YYYY-MM-DD hoặc DD/MM/YYYY)"),
        },
    }
}

fn print_table(table: &ObservationTable) {
    let mut header = vec![table.date_column().to_string()];
    header.extend(table.columns().iter().map(|column| column.name.clone()));
    println!("{}", header.join("\t"));

    for record in table.records() {
        let mut cells = vec![record
            .date
            .map(|date| date.to_string())
            .unwrap_or_else(|| "--".to_string())];
        cells.extend(record.values.iter().map(|value| match value {
            CellValue::Number(number) => number.to_string(),
            CellValue::Text(text) => text.clone(),
            CellValue::Missing => "--".to_string(),
        }));
        println!("{}", cells.join("\t"));
    }
}
