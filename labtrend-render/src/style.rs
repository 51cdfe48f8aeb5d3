//! Chart palette and typography shared by the lab and timeline charts.

use std::sync::OnceLock;

use labtrend_core::LabtrendError;
use plotters::style::{register_font, FontStyle, RGBAColor, RGBColor};

pub const FONT_FAMILY: &str = "sans-serif";
const FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");
pub const TITLE_SIZE: f64 = 32.0;
pub const AXIS_DESC_SIZE: f64 = 20.0;
pub const LABEL_SIZE: f64 = 14.0;

pub const BACKGROUND: RGBColor = RGBColor(255, 255, 255);
pub const SERIES: RGBColor = RGBColor(31, 119, 180);
pub const VALUE_TEXT: RGBColor = RGBColor(0, 0, 255);
pub const MARKER: RGBColor = RGBColor(214, 39, 40);
pub const BAND: RGBColor = RGBColor(255, 221, 0);
pub const EVENT: RGBColor = RGBColor(44, 160, 44);
pub const TEXT: RGBColor = RGBColor(17, 24, 28);

pub const POINT_RADIUS: u32 = 4;
pub const MARKER_WIDTH: u32 = 2;

pub fn grid() -> RGBAColor {
    RGBAColor(0, 0, 0, 0.15)
}

pub fn marker_line() -> RGBAColor {
    RGBAColor(MARKER.0, MARKER.1, MARKER.2, 0.7)
}

pub fn band_fill() -> RGBAColor {
    RGBAColor(BAND.0, BAND.1, BAND.2, 0.3)
}

pub fn legend_background() -> RGBAColor {
    RGBAColor(255, 255, 255, 0.8)
}

/// Register the bundled font under [`FONT_FAMILY`]; runs once per process.
pub fn ensure_font() -> Result<(), LabtrendError> {
    static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();
    REGISTERED
        .get_or_init(|| {
            register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES)
                .map_err(|_| "bundled font could not be parsed".to_string())
        })
        .clone()
        .map_err(LabtrendError::Render)
}
