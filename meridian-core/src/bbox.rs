//! Bounding boxes ("envelopes") describing the extent of features and layers.

use crate::crs::Crs;
use crate::error::{Result, WfsError};
use crate::geometry::{Geometry, GeometryKind};
use geo_types::{polygon, Polygon};

/// A 2D lower/upper corner pair, optionally bound to a CRS.
///
/// Coordinates are stored x/y like all in-memory geometry data. The KVP
/// `BBOX` notation is parsed honoring the axis order of the CRS it names.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub crs: Option<Crs>,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: Option<Crs>) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
            crs,
        }
    }

    /// An inverted box that corrects itself on the first `extend_to` call.
    pub fn empty(crs: Option<Crs>) -> Self {
        BoundingBox {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
            crs,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x
    }

    /// Parse the KVP `BBOX` notation: `minx,miny,maxx,maxy[,crs]`.
    /// When a CRS with north/east ordering is given, the incoming
    /// coordinates are swapped into x/y storage order.
    pub fn from_string(value: &str) -> Result<BoundingBox> {
        let parts: Vec<&str> = value.split(',').collect();
        if parts.len() != 4 && parts.len() != 5 {
            return Err(WfsError::invalid_parameter(
                format!("Invalid BBOX argument: {value}"),
                "bbox",
            ));
        }
        let mut coords = [0f64; 4];
        for (i, part) in parts[..4].iter().enumerate() {
            coords[i] = part.trim().parse::<f64>().map_err(|_| {
                WfsError::invalid_parameter(format!("Invalid BBOX argument: {value}"), "bbox")
            })?;
        }
        let crs = match parts.get(4) {
            Some(raw) => Some(Crs::from_string(raw)?),
            None => None,
        };
        let swap = crs.as_ref().is_some_and(|c| c.is_north_east());
        let [a, b, c, d] = coords;
        let (min_x, min_y, max_x, max_y) = if swap { (b, a, d, c) } else { (a, b, c, d) };
        Ok(BoundingBox::new(min_x, min_y, max_x, max_y, crs))
    }

    pub fn lower_corner(&self) -> [f64; 2] {
        [self.min_x, self.min_y]
    }

    pub fn upper_corner(&self) -> [f64; 2] {
        [self.max_x, self.max_y]
    }

    /// Expand the box in place.
    pub fn extend_to(&mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) {
        self.min_x = self.min_x.min(min_x);
        self.min_y = self.min_y.min(min_y);
        self.max_x = self.max_x.max(max_x);
        self.max_y = self.max_y.max(max_y);
    }

    /// Extend this bounding box with the extent of a geometry,
    /// reprojecting when the geometry is in another CRS.
    pub fn extend_to_geometry(&mut self, geometry: &Geometry) -> Result<()> {
        let geometry = match &self.crs {
            Some(crs) if crs.srid != geometry.crs.srid => crs.apply_to(geometry)?,
            _ => geometry.clone(),
        };
        if let Some(extent) = geometry.envelope() {
            self.extend_to(extent.min_x, extent.min_y, extent.max_x, extent.max_y);
        }
        Ok(())
    }

    /// Combine both extents into a larger box. The CRSes must match.
    pub fn union(&self, other: &BoundingBox) -> Result<BoundingBox> {
        if self.crs != other.crs {
            return Err(WfsError::processing_failed(
                "Can't combine extents with different coordinate reference systems",
            ));
        }
        Ok(BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
            crs: self.crs.clone(),
        })
    }

    pub fn as_polygon(&self) -> Polygon<f64> {
        polygon![
            (x: self.min_x, y: self.min_y),
            (x: self.max_x, y: self.min_y),
            (x: self.max_x, y: self.max_y),
            (x: self.min_x, y: self.max_y),
            (x: self.min_x, y: self.min_y),
        ]
    }

    /// The box as a polygon geometry in its CRS (default WGS84 semantics
    /// are up to the caller when no CRS was given).
    pub fn to_geometry(&self, fallback_crs: &Crs) -> Geometry {
        Geometry::new(
            self.crs.clone().unwrap_or_else(|| fallback_crs.clone()),
            GeometryKind::Polygon(self.as_polygon()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{CRS84, WGS84};

    #[test]
    fn parses_plain_bbox() {
        let bbox = BoundingBox::from_string("4.58,52.03,5.31,52.49").unwrap();
        assert_eq!(bbox.min_x, 4.58);
        assert_eq!(bbox.max_y, 52.49);
        assert!(bbox.crs.is_none());
    }

    #[test]
    fn parses_bbox_with_crs84() {
        let bbox =
            BoundingBox::from_string("4.58,52.03,5.31,52.49,urn:ogc:def:crs:OGC::CRS84").unwrap();
        assert_eq!(bbox.crs.as_ref().unwrap(), &*CRS84);
        // CRS84 is x/y: no swap.
        assert_eq!(bbox.min_x, 4.58);
    }

    #[test]
    fn swaps_axes_for_north_east_crs() {
        let bbox =
            BoundingBox::from_string("52.03,4.58,52.49,5.31,urn:ogc:def:crs:EPSG::4326").unwrap();
        assert_eq!(bbox.crs.as_ref().unwrap(), &*WGS84);
        assert_eq!(bbox.min_x, 4.58);
        assert_eq!(bbox.min_y, 52.03);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(BoundingBox::from_string("1,2,3").is_err());
        assert!(BoundingBox::from_string("a,b,c,d").is_err());
    }

    #[test]
    fn union_and_extend() {
        let mut a = BoundingBox::empty(None);
        a.extend_to(0.0, 0.0, 1.0, 1.0);
        let b = BoundingBox::new(0.5, -1.0, 2.0, 0.5, None);
        let merged = a.union(&b).unwrap();
        assert_eq!(
            (merged.min_x, merged.min_y, merged.max_x, merged.max_y),
            (0.0, -1.0, 2.0, 1.0)
        );
    }
}
