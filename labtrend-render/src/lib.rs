//! PNG rendering of lab time series and clinical timelines.

mod style;
mod summary;
mod timeline;

use std::io::Cursor;
use std::ops::Range;

use chrono::{Duration, NaiveDate, Utc};
use image::{ImageFormat, RgbImage};
use labtrend_core::{
    Band, LabtrendConfig, LabtrendError, Marker, ObservationTable, RenderedChart, Session,
};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

pub use summary::clinical_summary;
pub use timeline::render_event_timeline;

/// Canvas size and axis captions.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    /// Overrides the default `"{column} ao longo do tempo"` title.
    pub title: Option<String>,
    pub x_label: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
            title: None,
            x_label: "Data".to_string(),
        }
    }
}

impl From<&LabtrendConfig> for RenderOptions {
    fn from(config: &LabtrendConfig) -> Self {
        Self {
            width: config.chart_width,
            height: config.chart_height,
            ..Self::default()
        }
    }
}

/// What to draw: one numeric column over an inclusive date range, plus
/// annotations.
#[derive(Debug, Clone, Copy)]
pub struct ChartRequest<'a> {
    pub column: &'a str,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub markers: &'a [Marker],
    pub bands: &'a [Band],
    pub show_values: bool,
}

/// Render `request` against `table` and return PNG bytes.
///
/// The date axis covers the data and every annotation inside the requested
/// range. Markers outside it are skipped; bands that overlap it are clamped.
/// Reversed band bounds are drawn as if ordered.
pub fn render(
    table: &ObservationTable,
    request: &ChartRequest<'_>,
    options: &RenderOptions,
) -> Result<Vec<u8>, LabtrendError> {
    let filtered = table.filter_by_date(request.start, request.end);
    let series = filtered.series(request.column)?;
    if series.is_empty() {
        return Err(LabtrendError::EmptySeries(request.column.to_string()));
    }

    let points: Vec<(NaiveDate, f64)> = series
        .iter()
        .filter_map(|(date, value)| value.map(|value| (*date, value)))
        .collect();
    let bands: Vec<(&Band, (NaiveDate, NaiveDate))> = request
        .bands
        .iter()
        .filter_map(|band| Some((band, visible_span(band, request.start, request.end)?)))
        .collect();
    let markers: Vec<&Marker> = request
        .markers
        .iter()
        .filter(|marker| marker.date >= request.start && marker.date <= request.end)
        .collect();
    let x_range = padded_date_range(
        series
            .iter()
            .map(|(date, _)| *date)
            .chain(markers.iter().map(|marker| marker.date))
            .chain(bands.iter().flat_map(|(_, (start, end))| [*start, *end])),
    );
    let y_range = value_range(points.iter().map(|(_, value)| *value));
    let label_offset = (y_range.end - y_range.start) * 0.01;

    log::debug!(
        "rendering `{}`: {} records, {} points, {} markers, {} bands",
        request.column,
        series.len(),
        points.len(),
        markers.len(),
        bands.len()
    );

    let title = options
        .title
        .clone()
        .unwrap_or_else(|| format!("{} ao longo do tempo", request.column));

    draw_png(options.width, options.height, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, (style::FONT_FAMILY, style::TITLE_SIZE))
            .margin(20)
            .x_label_area_size(70)
            .y_label_area_size(70)
            .build_cartesian_2d(x_range.clone(), y_range.clone())
            .map_err(render_error)?;

        chart
            .configure_mesh()
            .x_desc(options.x_label.as_str())
            .y_desc(request.column)
            .axis_desc_style((style::FONT_FAMILY, style::AXIS_DESC_SIZE))
            .x_label_formatter(&|date: &NaiveDate| date.format("%Y-%m-%d").to_string())
            .light_line_style(style::grid().stroke_width(1))
            .draw()
            .map_err(render_error)?;

        for (band, (start, end)) in &bands {
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(*start, y_range.start), (*end, y_range.end)],
                    style::band_fill().filled(),
                )))
                .map_err(render_error)?
                .label(band.label.as_str())
                .legend(|(x, y)| {
                    Rectangle::new([(x, y - 6), (x + 20, y + 6)], style::band_fill().filled())
                });
        }

        for segment in line_segments(&series) {
            chart
                .draw_series(LineSeries::new(segment, style::SERIES.stroke_width(2)))
                .map_err(render_error)?;
        }

        chart
            .draw_series(
                points
                    .iter()
                    .map(|point| Circle::new(*point, style::POINT_RADIUS, style::SERIES.filled())),
            )
            .map_err(render_error)?
            .label(format!("{} (valor)", request.column))
            .legend(|(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], style::SERIES.stroke_width(2))
            });

        if request.show_values {
            let value_style = (style::FONT_FAMILY, style::LABEL_SIZE)
                .into_font()
                .color(&style::VALUE_TEXT)
                .pos(Pos::new(HPos::Center, VPos::Bottom));
            chart
                .draw_series(points.iter().map(|(date, value)| {
                    Text::new(
                        format!("{value:.2}"),
                        (*date, *value + label_offset),
                        value_style.clone(),
                    )
                }))
                .map_err(render_error)?;
        }

        for marker in &markers {
            chart
                .draw_series(LineSeries::new(
                    vec![(marker.date, y_range.start), (marker.date, y_range.end)],
                    style::marker_line().stroke_width(style::MARKER_WIDTH),
                ))
                .map_err(render_error)?
                .label(marker.label.as_str())
                .legend(|(x, y)| {
                    PathElement::new(
                        vec![(x, y), (x + 20, y)],
                        style::marker_line().stroke_width(style::MARKER_WIDTH),
                    )
                });
        }

        chart
            .configure_series_labels()
            .background_style(style::legend_background().filled())
            .border_style(style::TEXT.stroke_width(1))
            .position(SeriesLabelPosition::UpperLeft)
            .draw()
            .map_err(render_error)?;

        Ok(())
    })
}

/// Render and wrap the result with the parameters that produced it.
pub fn render_chart(
    table: &ObservationTable,
    request: &ChartRequest<'_>,
    options: &RenderOptions,
) -> Result<RenderedChart, LabtrendError> {
    let png = render(table, request, options)?;
    Ok(RenderedChart {
        column: request.column.to_string(),
        start: request.start,
        end: request.end,
        markers: request.markers.to_vec(),
        bands: request.bands.to_vec(),
        show_values: request.show_values,
        generated_at: Utc::now(),
        png,
    })
}

/// Render with the session's annotations and keep the chart in its history.
///
/// The session is left untouched when rendering fails.
pub fn render_in_session<'s>(
    session: &'s mut Session,
    table: &ObservationTable,
    column: &str,
    start: NaiveDate,
    end: NaiveDate,
    show_values: bool,
    options: &RenderOptions,
) -> Result<&'s RenderedChart, LabtrendError> {
    let request = ChartRequest {
        column,
        start,
        end,
        markers: session.annotations.markers(),
        bands: session.annotations.bands(),
        show_values,
    };
    let chart = render_chart(table, &request, options)?;
    session.charts.push(chart);
    session
        .charts
        .latest()
        .ok_or_else(|| LabtrendError::Render("chart history is empty after push".into()))
}

type Root<'a> = DrawingArea<BitMapBackend<'a>, plotters::coord::Shift>;

/// Run `draw` on a white RGB canvas and encode the result as PNG.
pub(crate) fn draw_png<F>(width: u32, height: u32, draw: F) -> Result<Vec<u8>, LabtrendError>
where
    F: FnOnce(&Root<'_>) -> Result<(), LabtrendError>,
{
    if width == 0 || height == 0 {
        return Err(LabtrendError::Render(format!(
            "canvas size {width}x{height} is empty"
        )));
    }

    style::ensure_font()?;

    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&style::BACKGROUND).map_err(render_error)?;
        draw(&root)?;
        root.present().map_err(render_error)?;
    }

    let image = RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| LabtrendError::Render("pixel buffer does not match canvas".into()))?;
    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(render_error)?;
    Ok(png.into_inner())
}

pub(crate) fn render_error<E: std::fmt::Display>(err: E) -> LabtrendError {
    LabtrendError::Render(err.to_string())
}

/// Date axis covering `dates`, with a day of slack on each side.
pub(crate) fn padded_date_range(dates: impl Iterator<Item = NaiveDate>) -> Range<NaiveDate> {
    let (min, max) = dates.fold((NaiveDate::MAX, NaiveDate::MIN), |(min, max), date| {
        (min.min(date), max.max(date))
    });
    if min > max {
        let today = Utc::now().date_naive();
        return today - Duration::days(1)..today + Duration::days(1);
    }
    let start = min.checked_sub_signed(Duration::days(1)).unwrap_or(min);
    let end = max.checked_add_signed(Duration::days(1)).unwrap_or(max);
    start..end
}

/// Part of `band` inside `[start, end]`, ordered.
fn visible_span(band: &Band, start: NaiveDate, end: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let (from, to) = band.ordered();
    if to < start || from > end {
        return None;
    }
    Some((from.max(start), to.min(end)))
}

fn value_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
        (min.min(value), max.max(value))
    });
    if min > max {
        return 0.0..1.0;
    }
    if (max - min).abs() < f64::EPSILON {
        return min - 1.0..max + 1.0;
    }
    let pad = (max - min) * 0.1;
    min - pad..max + pad
}

/// Consecutive present values; a missing value breaks the line.
fn line_segments(series: &[(NaiveDate, Option<f64>)]) -> Vec<Vec<(NaiveDate, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for (date, value) in series {
        match value {
            Some(value) => current.push((*date, *value)),
            None if !current.is_empty() => segments.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}
