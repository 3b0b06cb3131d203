//! Server configuration: the CLI surface mapping onto `ServiceConfig`.

use clap::Parser;
use meridian_core::{CountMode, ServiceConfig};
use std::net::SocketAddr;

/// The Meridian WFS server.
#[derive(Parser, Debug, Clone)]
#[command(name = "meridian-server", version, about)]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8700")]
    pub listen_addr: SocketAddr,

    /// Externally visible endpoint URL, used in links and schema URLs.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Default COUNT when the request omits it.
    #[arg(long, default_value_t = 5000)]
    pub default_page_size: u64,

    /// Upper page-size bound for paginated XML output.
    #[arg(long, default_value_t = 5000)]
    pub max_page_size: u64,

    /// Upper page-size bound for GeoJSON output (unbounded when absent).
    #[arg(long)]
    pub geojson_max_page_size: Option<u64>,

    /// Upper page-size bound for CSV output (unbounded when absent).
    #[arg(long)]
    pub csv_max_page_size: Option<u64>,

    /// numberMatched policy: 0 = never count, 1 = always, 2 = first page only.
    #[arg(long, default_value_t = 1)]
    pub count_number_matched: u8,

    /// Include per-type extents in GetCapabilities.
    #[arg(long)]
    pub capabilities_bounding_box: bool,

    /// Push geometry serialization into the datastore.
    #[arg(long)]
    pub use_db_rendering: bool,

    /// Reject srsName values a feature type does not advertise.
    #[arg(long)]
    pub supported_crs_only: bool,

    /// Disable the CITE compatibility behaviors.
    #[arg(long)]
    pub wfs_strict_standard: bool,

    /// Pass datastore errors through instead of wrapping them.
    #[arg(long)]
    pub no_wrap_filter_db_errors: bool,

    /// Treat EPSG:4326 as latitude-first instead of coercing to x/y.
    #[arg(long)]
    pub no_force_xy_epsg_4326: bool,

    /// Treat the legacy gml/srs notation as latitude-first.
    #[arg(long)]
    pub no_force_xy_old_crs: bool,

    /// Decimals for coordinate output.
    #[arg(long, default_value_t = 6)]
    pub coordinate_precision: usize,
}

impl ServerConfig {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
            geojson_max_page_size: self.geojson_max_page_size,
            csv_max_page_size: self.csv_max_page_size,
            capabilities_bounding_box: self.capabilities_bounding_box,
            use_db_rendering: self.use_db_rendering,
            supported_crs_only: self.supported_crs_only,
            count_mode: CountMode::from_level(self.count_number_matched)
                .unwrap_or(CountMode::Always),
            wfs_strict_standard: self.wfs_strict_standard,
            wrap_filter_db_errors: !self.no_wrap_filter_db_errors,
            force_xy_epsg_4326: !self.no_force_xy_epsg_4326,
            force_xy_old_crs: !self.no_force_xy_old_crs,
            coordinate_precision: self.coordinate_precision,
            ..ServiceConfig::default()
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}/wfs", self.listen_addr))
    }
}
