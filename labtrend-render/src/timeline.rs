//! Clinical history drawn as dated, labeled events.

use chrono::NaiveDate;
use labtrend_core::{LabtrendError, ObservationTable};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::summary::cell_label;
use crate::{draw_png, padded_date_range, render_error, style, RenderOptions};

/// One point per dated record, stacked by row order and labeled with
/// `label_column`. Rows without a date are left out.
pub fn render_event_timeline(
    table: &ObservationTable,
    label_column: &str,
    options: &RenderOptions,
) -> Result<Vec<u8>, LabtrendError> {
    let label_index = table
        .column_index(label_column)
        .ok_or_else(|| LabtrendError::UnknownColumn(label_column.to_string()))?;

    let events: Vec<(NaiveDate, f64, String)> = table
        .records()
        .iter()
        .enumerate()
        .filter_map(|(row, record)| {
            let date = record.date?;
            Some((date, row as f64, cell_label(&record.values[label_index])))
        })
        .collect();

    if events.is_empty() {
        return Err(LabtrendError::EmptySeries(label_column.to_string()));
    }

    let x_range = padded_date_range(events.iter().map(|(date, _, _)| *date));
    let y_range = -1.0..table.len() as f64;
    let title = options
        .title
        .clone()
        .unwrap_or_else(|| "Linha Temporal da História Clínica".to_string());

    draw_png(options.width, options.height, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, (style::FONT_FAMILY, style::TITLE_SIZE))
            .margin(20)
            .x_label_area_size(70)
            .y_label_area_size(50)
            .build_cartesian_2d(x_range.clone(), y_range.clone())
            .map_err(render_error)?;

        chart
            .configure_mesh()
            .x_desc(options.x_label.as_str())
            .y_desc("Eventos")
            .axis_desc_style((style::FONT_FAMILY, style::AXIS_DESC_SIZE))
            .x_label_formatter(&|date: &NaiveDate| date.format("%Y-%m-%d").to_string())
            .light_line_style(style::grid().stroke_width(1))
            .draw()
            .map_err(render_error)?;

        chart
            .draw_series(events.iter().map(|(date, row, _)| {
                Circle::new((*date, *row), style::POINT_RADIUS + 1, style::EVENT.filled())
            }))
            .map_err(render_error)?;

        let label_style = (style::FONT_FAMILY, style::LABEL_SIZE)
            .into_font()
            .color(&style::TEXT)
            .pos(Pos::new(HPos::Center, VPos::Bottom));
        chart
            .draw_series(events.iter().map(|(date, row, label)| {
                Text::new(label.clone(), (*date, *row + 0.15), label_style.clone())
            }))
            .map_err(render_error)?;

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use labtrend_core::{CellValue, ColumnSpec, Record};

    #[test]
    fn unknown_label_column_is_reported() {
        let table = ObservationTable::new("DATA", vec![ColumnSpec::text("DESCRICAO")], Vec::new())
            .expect("valid table");
        assert!(matches!(
            render_event_timeline(&table, "EVENTO", &RenderOptions::default()),
            Err(LabtrendError::UnknownColumn(_))
        ));
    }

    #[test]
    fn undated_history_is_empty() {
        let table = ObservationTable::new(
            "DATA",
            vec![ColumnSpec::text("DESCRICAO")],
            vec![Record {
                date: None,
                values: vec![CellValue::Text("Sem data".into())],
            }],
        )
        .expect("valid table");
        assert!(matches!(
            render_event_timeline(&table, "DESCRICAO", &RenderOptions::default()),
            Err(LabtrendError::EmptySeries(_))
        ));
    }
}
