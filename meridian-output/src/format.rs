//! Output format negotiation for GetFeature / GetPropertyValue.

use meridian_core::error::{Result, WfsError};
use meridian_core::ServiceConfig;

/// The built-in streaming output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Gml32,
    GeoJson,
    Csv,
}

impl OutputFormat {
    /// Resolve an `OUTPUTFORMAT` value: a registered content type or its
    /// short subtype alias.
    pub fn resolve(raw: Option<&str>) -> Result<OutputFormat> {
        let Some(raw) = raw else {
            return Ok(OutputFormat::Gml32);
        };
        let normalized = raw.trim().to_ascii_lowercase();
        let base = normalized.split(';').next().unwrap_or("").trim().to_string();
        match base.as_str() {
            "" => Ok(OutputFormat::Gml32),
            "application/gml+xml" | "text/xml" | "gml" | "gml32" => Ok(OutputFormat::Gml32),
            "application/geo+json" | "application/json" | "geojson" | "json" => {
                Ok(OutputFormat::GeoJson)
            }
            "text/csv" | "csv" => Ok(OutputFormat::Csv),
            _ if normalized.contains("subtype=gml/3.2") => Ok(OutputFormat::Gml32),
            "gml/3.2.1" => Ok(OutputFormat::Gml32),
            _ => Err(WfsError::invalid_parameter(
                format!("'{raw}' is not a permitted output format."),
                "outputFormat",
            )),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Gml32 => "application/gml+xml; version=3.2",
            OutputFormat::GeoJson => "application/geo+json; charset=utf-8",
            OutputFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    /// The advertised identifiers, first one is the canonical content type.
    pub fn advertised(&self) -> [&'static str; 2] {
        match self {
            OutputFormat::Gml32 => ["application/gml+xml; version=3.2", "gml/3.2.1"],
            OutputFormat::GeoJson => ["application/geo+json", "geojson"],
            OutputFormat::Csv => ["text/csv", "csv"],
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Gml32 => "xml",
            OutputFormat::GeoJson => "geojson",
            OutputFormat::Csv => "csv",
        }
    }

    /// Page size bound; `None` allows unbounded pages.
    pub fn max_page_size(&self, config: &ServiceConfig) -> Option<u64> {
        match self {
            OutputFormat::Gml32 => Some(config.max_page_size),
            OutputFormat::GeoJson => config.geojson_max_page_size,
            OutputFormat::Csv => config.csv_max_page_size,
        }
    }

    pub fn all() -> [OutputFormat; 3] {
        [OutputFormat::Gml32, OutputFormat::GeoJson, OutputFormat::Csv]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_aliases() {
        assert_eq!(OutputFormat::resolve(None).unwrap(), OutputFormat::Gml32);
        assert_eq!(
            OutputFormat::resolve(Some("application/gml+xml; version=3.2")).unwrap(),
            OutputFormat::Gml32
        );
        assert_eq!(
            OutputFormat::resolve(Some("text/xml; subtype=gml/3.2.1")).unwrap(),
            OutputFormat::Gml32
        );
        assert_eq!(
            OutputFormat::resolve(Some("geojson")).unwrap(),
            OutputFormat::GeoJson
        );
        assert_eq!(OutputFormat::resolve(Some("csv")).unwrap(), OutputFormat::Csv);
    }

    #[test]
    fn unknown_formats_are_rejected() {
        let err = OutputFormat::resolve(Some("shapezip")).unwrap_err();
        assert_eq!(err.locator.as_deref(), Some("outputFormat"));
    }
}
