//! The service configuration surface.

/// Policy for computing `numberMatched` on paginated responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CountMode {
    /// Never run a count query; responses say `numberMatched="unknown"`.
    Never,
    /// Count on every page.
    #[default]
    Always,
    /// Count only when serving the first page.
    FirstPageOnly,
}

impl CountMode {
    /// Parse the numeric notation used by the settings surface (0/1/2).
    pub fn from_level(level: u8) -> Option<CountMode> {
        match level {
            0 => Some(CountMode::Never),
            1 => Some(CountMode::Always),
            2 => Some(CountMode::FirstPageOnly),
            _ => None,
        }
    }
}

/// Recognized service options. One instance is shared by the whole server.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Default `COUNT` when the request omits it.
    pub default_page_size: u64,
    /// Upper bound for paginated (XML) output.
    pub max_page_size: u64,
    /// Upper bound for GeoJSON output; `None` allows unbounded pages.
    pub geojson_max_page_size: Option<u64>,
    /// Upper bound for CSV output; `None` allows unbounded pages.
    pub csv_max_page_size: Option<u64>,
    /// Include the per-type extent in GetCapabilities (needs a full scan).
    pub capabilities_bounding_box: bool,
    /// Push geometry serialization into the datastore.
    pub use_db_rendering: bool,
    /// Reject `srsName` values that a feature type does not advertise.
    pub supported_crs_only: bool,
    /// `numberMatched` counting policy.
    pub count_mode: CountMode,
    /// Disable the CITE compatibility behaviors.
    pub wfs_strict_standard: bool,
    /// Wrap datastore failures into WFS exceptions with actionable text.
    pub wrap_filter_db_errors: bool,
    /// Treat `EPSG:4326` as x/y ordered (GeoServer-compatible).
    pub force_xy_epsg_4326: bool,
    /// Treat `http://www.opengis.net/gml/srs/epsg.xml#…` as x/y ordered.
    pub force_xy_old_crs: bool,
    /// Decimals for coordinate output.
    pub coordinate_precision: usize,
    /// Byte threshold for flushing a chunk to the client.
    pub chunk_size: usize,
    /// Rows fetched per cursor chunk.
    pub cursor_chunk_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            default_page_size: 5000,
            max_page_size: 5000,
            geojson_max_page_size: None,
            csv_max_page_size: None,
            capabilities_bounding_box: false,
            use_db_rendering: false,
            supported_crs_only: false,
            count_mode: CountMode::Always,
            wfs_strict_standard: false,
            wrap_filter_db_errors: true,
            force_xy_epsg_4326: true,
            force_xy_old_crs: true,
            coordinate_precision: 6,
            chunk_size: 40_000,
            cursor_chunk_size: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_mode_levels() {
        assert_eq!(CountMode::from_level(0), Some(CountMode::Never));
        assert_eq!(CountMode::from_level(1), Some(CountMode::Always));
        assert_eq!(CountMode::from_level(2), Some(CountMode::FirstPageOnly));
        assert_eq!(CountMode::from_level(3), None);
    }
}
