//! Escaping and value formatting helpers shared by the renderers.

use meridian_core::values::ScalarValue;
use meridian_core::Crs;
use meridian_core::GeometryKind;

/// Escape text content / attribute values for XML output.
pub fn xml_escape(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}

/// Render a scalar for XML text content (unescaped; caller escapes
/// strings). Datetimes normalize to UTC ISO notation.
pub fn scalar_to_xml_text(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        ScalarValue::DateTime(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
        other => other.to_string(),
    }
}

/// Fixed-precision coordinate formatting with trailing zeros trimmed.
pub fn fmt_coord(value: f64, precision: usize) -> String {
    let mut text = format!("{value:.precision$}");
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    if text == "-0" {
        text.pop();
        text.push('0');
    }
    text
}

/// One coordinate pair in output axis order.
pub fn fmt_position(x: f64, y: f64, crs: &Crs, precision: usize) -> String {
    if crs.is_north_east() {
        format!("{} {}", fmt_coord(y, precision), fmt_coord(x, precision))
    } else {
        format!("{} {}", fmt_coord(x, precision), fmt_coord(y, precision))
    }
}

/// All coordinates of a line, flattened in output axis order.
pub fn fmt_pos_list(
    coords: &[geo_types::Coord<f64>],
    crs: &Crs,
    precision: usize,
) -> String {
    coords
        .iter()
        .map(|c| fmt_position(c.x, c.y, crs, precision))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the Content-Disposition header value. The filename is templated
/// as `{typenames} {page} {date}.{ext}`.
pub fn content_disposition(
    attachment: bool,
    type_names: &[String],
    start: u64,
    limit: Option<u64>,
    date: &str,
    extension: &str,
) -> String {
    let page = match limit {
        None => {
            if start > 0 {
                format!("{start}-end")
            } else {
                "all".to_string()
            }
        }
        Some(limit) => format!("{start}-{}", start + limit.saturating_sub(1)),
    };
    let disposition = if attachment { "attachment" } else { "inline" };
    format!(
        "{disposition}; filename=\"{} {} {}.{}\"",
        type_names.join("+"),
        page,
        date.replace(':', "."),
        extension
    )
}

/// Render a geometry kind as WKT, via the wkt crate.
pub fn to_wkt(kind: &GeometryKind) -> String {
    use wkt::ToWkt;
    kind.to_geo().wkt_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::crs::{CRS84, WGS84};

    #[test]
    fn coordinate_formatting_trims_zeros() {
        assert_eq!(fmt_coord(5.387204, 6), "5.387204");
        assert_eq!(fmt_coord(5.0, 6), "5");
        assert_eq!(fmt_coord(5.120000, 6), "5.12");
        assert_eq!(fmt_coord(1.23456789, 4), "1.2346");
    }

    #[test]
    fn axis_order_follows_the_crs() {
        assert_eq!(fmt_position(5.38, 52.15, &WGS84, 6), "52.15 5.38");
        assert_eq!(fmt_position(5.38, 52.15, &CRS84, 6), "5.38 52.15");
    }

    #[test]
    fn escapes_xml_specials() {
        assert_eq!(xml_escape("a<b&c\"d"), "a&lt;b&amp;c&quot;d");
    }

    #[test]
    fn disposition_pages() {
        assert_eq!(
            content_disposition(false, &["restaurant".into()], 0, Some(10), "2026-08-02", "xml"),
            "inline; filename=\"restaurant 0-9 2026-08-02.xml\""
        );
        assert!(content_disposition(true, &["a".into()], 0, None, "d", "csv").contains("all"));
    }
}
