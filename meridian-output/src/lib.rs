//! Output rendering: streaming GML 3.2, GeoJSON and CSV, plus the XML
//! documents for GetCapabilities, DescribeFeatureType and the stored-query
//! operations.
//!
//! The streaming renderers produce a cold stream of byte chunks; the HTTP
//! layer pulls until exhausted. Errors before the first byte become an
//! `ows:ExceptionReport` with a proper status code; errors mid-stream are
//! appended to the body as a format-appropriate truncation marker, never
//! silently dropped.

pub mod buffer;
pub mod capabilities;
pub mod csv;
pub mod exception;
pub mod format;
pub mod geojson;
pub mod gml32;
pub mod stored;
pub mod utils;
pub mod xmlschema;

pub use exception::exception_report;
pub use format::OutputFormat;

use meridian_core::ServiceConfig;
use meridian_query::Datastore;
use std::sync::Arc;

/// Shared context handed to every renderer.
#[derive(Clone)]
pub struct RenderContext {
    pub config: ServiceConfig,
    pub store: Arc<dyn Datastore>,
    /// The service endpoint, used in pagination links and schema locations.
    pub base_url: String,
    pub app_namespace: String,
    pub app_prefix: String,
}
