//! Core types shared by every Meridian crate.
//!
//! This crate has no knowledge of WFS requests or output formats. It provides:
//!
//! - Coordinate reference systems with the OGC URN / legacy notations and a
//!   process-wide reprojection cache ([`crs`])
//! - Geometries tagged with their CRS ([`geometry`])
//! - Bounding boxes ([`bbox`])
//! - The OGC exception taxonomy ([`error`])
//! - The service configuration surface ([`config`])
//! - Scalar value parsing and coercion ([`values`])

pub mod bbox;
pub mod config;
pub mod crs;
pub mod error;
pub mod geometry;
pub mod values;

pub use bbox::BoundingBox;
pub use config::{CountMode, ServiceConfig};
pub use crs::{Crs, CRS84, WEB_MERCATOR, WGS84};
pub use error::{ExceptionCode, Result, WfsError};
pub use geometry::{Geometry, GeometryKind, GeometryType};
pub use values::ScalarValue;
