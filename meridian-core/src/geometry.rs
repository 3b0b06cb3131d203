//! Geometry values tagged with their coordinate reference system.
//!
//! Coordinates are stored x/y (longitude/latitude for geographic systems),
//! matching how spatial databases store them. Axis swapping for north/east
//! ordered systems happens only in the parsers and renderers.

use crate::bbox::BoundingBox;
use crate::crs::Crs;
use geo::BoundingRect;
use geo_types::{LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};

/// Geometry type discriminator, also used to type schema elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Point,
    LineString,
    LinearRing,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
    /// Unspecified geometry; advertised as `gml:GeometryPropertyType`.
    Any,
}

impl GeometryType {
    /// The `gml:...PropertyType` QName advertised for elements of this type.
    pub fn gml_property_type(&self) -> &'static str {
        match self {
            GeometryType::Point => "gml:PointPropertyType",
            GeometryType::LineString | GeometryType::LinearRing => "gml:CurvePropertyType",
            GeometryType::Polygon => "gml:SurfacePropertyType",
            GeometryType::MultiPoint => "gml:MultiPointPropertyType",
            GeometryType::MultiLineString => "gml:MultiCurvePropertyType",
            GeometryType::MultiPolygon => "gml:MultiSurfacePropertyType",
            GeometryType::GeometryCollection => "gml:MultiGeometryPropertyType",
            GeometryType::Any => "gml:GeometryPropertyType",
        }
    }
}

/// The geometry variants of the GML 3.2 subset this server handles.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryKind {
    Point(Point<f64>),
    LineString(LineString<f64>),
    /// A closed line string; kept distinct so it round-trips as `gml:LinearRing`.
    LinearRing(LineString<f64>),
    Polygon(Polygon<f64>),
    MultiPoint(MultiPoint<f64>),
    MultiLineString(MultiLineString<f64>),
    MultiPolygon(MultiPolygon<f64>),
    GeometryCollection(Vec<GeometryKind>),
}

impl GeometryKind {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            GeometryKind::Point(_) => GeometryType::Point,
            GeometryKind::LineString(_) => GeometryType::LineString,
            GeometryKind::LinearRing(_) => GeometryType::LinearRing,
            GeometryKind::Polygon(_) => GeometryType::Polygon,
            GeometryKind::MultiPoint(_) => GeometryType::MultiPoint,
            GeometryKind::MultiLineString(_) => GeometryType::MultiLineString,
            GeometryKind::MultiPolygon(_) => GeometryType::MultiPolygon,
            GeometryKind::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }

    /// View as a geo-types geometry for topological predicates.
    /// Linear rings degrade to line strings; collections recurse.
    pub fn to_geo(&self) -> geo_types::Geometry<f64> {
        match self {
            GeometryKind::Point(g) => geo_types::Geometry::Point(*g),
            GeometryKind::LineString(g) | GeometryKind::LinearRing(g) => {
                geo_types::Geometry::LineString(g.clone())
            }
            GeometryKind::Polygon(g) => geo_types::Geometry::Polygon(g.clone()),
            GeometryKind::MultiPoint(g) => geo_types::Geometry::MultiPoint(g.clone()),
            GeometryKind::MultiLineString(g) => geo_types::Geometry::MultiLineString(g.clone()),
            GeometryKind::MultiPolygon(g) => geo_types::Geometry::MultiPolygon(g.clone()),
            GeometryKind::GeometryCollection(members) => geo_types::Geometry::GeometryCollection(
                geo_types::GeometryCollection(members.iter().map(|m| m.to_geo()).collect()),
            ),
        }
    }

    /// Apply a fallible coordinate mapping, preserving the variant.
    pub fn try_map_coords<E>(
        &self,
        f: &impl Fn(f64, f64) -> Result<(f64, f64), E>,
    ) -> Result<GeometryKind, E> {
        fn map_line<E>(
            line: &LineString<f64>,
            f: &impl Fn(f64, f64) -> Result<(f64, f64), E>,
        ) -> Result<LineString<f64>, E> {
            let mut coords = Vec::with_capacity(line.0.len());
            for c in &line.0 {
                let (x, y) = f(c.x, c.y)?;
                coords.push(geo_types::Coord { x, y });
            }
            Ok(LineString(coords))
        }
        fn map_polygon<E>(
            poly: &Polygon<f64>,
            f: &impl Fn(f64, f64) -> Result<(f64, f64), E>,
        ) -> Result<Polygon<f64>, E> {
            let exterior = map_line(poly.exterior(), f)?;
            let interiors = poly
                .interiors()
                .iter()
                .map(|ring| map_line(ring, f))
                .collect::<Result<Vec<_>, E>>()?;
            Ok(Polygon::new(exterior, interiors))
        }

        Ok(match self {
            GeometryKind::Point(p) => {
                let (x, y) = f(p.x(), p.y())?;
                GeometryKind::Point(Point::new(x, y))
            }
            GeometryKind::LineString(l) => GeometryKind::LineString(map_line(l, f)?),
            GeometryKind::LinearRing(l) => GeometryKind::LinearRing(map_line(l, f)?),
            GeometryKind::Polygon(p) => GeometryKind::Polygon(map_polygon(p, f)?),
            GeometryKind::MultiPoint(mp) => {
                let mut points = Vec::with_capacity(mp.0.len());
                for p in &mp.0 {
                    let (x, y) = f(p.x(), p.y())?;
                    points.push(Point::new(x, y));
                }
                GeometryKind::MultiPoint(MultiPoint(points))
            }
            GeometryKind::MultiLineString(ml) => GeometryKind::MultiLineString(MultiLineString(
                ml.0.iter()
                    .map(|l| map_line(l, f))
                    .collect::<Result<Vec<_>, E>>()?,
            )),
            GeometryKind::MultiPolygon(mp) => GeometryKind::MultiPolygon(MultiPolygon(
                mp.0.iter()
                    .map(|p| map_polygon(p, f))
                    .collect::<Result<Vec<_>, E>>()?,
            )),
            GeometryKind::GeometryCollection(members) => GeometryKind::GeometryCollection(
                members
                    .iter()
                    .map(|m| m.try_map_coords(f))
                    .collect::<Result<Vec<_>, E>>()?,
            ),
        })
    }

    /// Swap x and y of every coordinate. Used at the parse/emit boundaries
    /// for CRSes whose authority ordering is north/east.
    pub fn swap_xy(&self) -> GeometryKind {
        self.try_map_coords::<std::convert::Infallible>(&|x, y| Ok((y, x)))
            .unwrap()
    }
}

/// A geometry with the CRS its coordinates are expressed in.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub crs: Crs,
    pub kind: GeometryKind,
}

impl Geometry {
    pub fn new(crs: Crs, kind: GeometryKind) -> Self {
        Geometry { crs, kind }
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.kind.geometry_type()
    }

    /// Axis-aligned extent, in this geometry's CRS.
    pub fn envelope(&self) -> Option<BoundingBox> {
        let rect = self.kind.to_geo().bounding_rect()?;
        Some(BoundingBox::new(
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y,
            Some(self.crs.clone()),
        ))
    }
}
