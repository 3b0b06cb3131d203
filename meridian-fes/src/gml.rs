//! GML geometry literals inside filter expressions.
//!
//! `<fes:BBOX>`, `<fes:Intersects>` and friends carry their geometry operand
//! as a GML 3.2 element. Coordinates are parsed into the geometry's declared
//! CRS; systems with north/east authority ordering get their coordinates
//! swapped into x/y storage order right here, so the rest of the server
//! never sees latitude-first data.

use crate::xml::XmlElement;
use crate::xmlns;
use meridian_core::crs::{Crs, WGS84};
use meridian_core::error::{Result, WfsError};
use meridian_core::geometry::{Geometry, GeometryKind};
use meridian_core::BoundingBox;
use geo_types::{Coord, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};

/// A spatial value parsed from GML: a geometry or an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum GmlValue {
    Geometry(Geometry),
    Envelope(BoundingBox),
}

impl GmlValue {
    /// View the value as a geometry; envelopes become their polygon.
    pub fn into_geometry(self) -> Geometry {
        match self {
            GmlValue::Geometry(g) => g,
            GmlValue::Envelope(bbox) => bbox.to_geometry(&WGS84),
        }
    }
}

/// Tell whether the element lives in a GML namespace (3.2 or the GML 2
/// namespace some old clients still use).
pub fn is_gml_element(element: &XmlElement) -> bool {
    element
        .ns
        .as_deref()
        .is_some_and(|ns| ns.starts_with(xmlns::GML21))
}

/// Parse any supported GML node.
pub fn parse_gml_node(element: &XmlElement) -> Result<GmlValue> {
    if !is_gml_element(element) {
        return Err(unexpected(element));
    }
    if element.local == "Envelope" {
        return Ok(GmlValue::Envelope(parse_envelope(element)?));
    }
    parse_geometry(element).map(GmlValue::Geometry)
}

/// Parse a GML geometry element (everything except `<gml:Envelope>`).
pub fn parse_geometry(element: &XmlElement) -> Result<Geometry> {
    let crs = srs_of(element, None)?;
    let swap = crs.is_north_east();
    let kind = parse_kind(element, swap)?;
    Ok(Geometry::new(crs, kind))
}

fn parse_kind(element: &XmlElement, swap: bool) -> Result<GeometryKind> {
    match element.local.as_str() {
        "Point" => Ok(GeometryKind::Point(parse_point(element, swap)?)),
        "LineString" => Ok(GeometryKind::LineString(parse_line(element, swap)?)),
        "LinearRing" => Ok(GeometryKind::LinearRing(parse_line(element, swap)?)),
        "Polygon" => Ok(GeometryKind::Polygon(parse_polygon(element, swap)?)),
        "MultiPoint" => {
            let mut points = Vec::new();
            for member in members(element, &["pointMember", "pointMembers"]) {
                for point in gml_children(member, "Point") {
                    points.push(parse_point(point, swap)?);
                }
            }
            Ok(GeometryKind::MultiPoint(MultiPoint(points)))
        }
        "MultiLineString" | "MultiCurve" => {
            let mut lines = Vec::new();
            for member in members(element, &["lineStringMember", "curveMember", "curveMembers"]) {
                for line in gml_children(member, "LineString") {
                    lines.push(parse_line(line, swap)?);
                }
            }
            Ok(GeometryKind::MultiLineString(MultiLineString(lines)))
        }
        "MultiPolygon" | "MultiSurface" => {
            let mut polygons = Vec::new();
            for member in members(element, &["polygonMember", "surfaceMember", "surfaceMembers"]) {
                for polygon in gml_children(member, "Polygon") {
                    polygons.push(parse_polygon(polygon, swap)?);
                }
            }
            Ok(GeometryKind::MultiPolygon(MultiPolygon(polygons)))
        }
        "MultiGeometry" => {
            let mut parts = Vec::new();
            for member in members(element, &["geometryMember", "geometryMembers"]) {
                for child in &member.children {
                    parts.push(parse_kind(child, swap)?);
                }
            }
            Ok(GeometryKind::GeometryCollection(parts))
        }
        _ => Err(unexpected(element)),
    }
}

/// Parse `<gml:Envelope>` with its lower/upper corners.
pub fn parse_envelope(element: &XmlElement) -> Result<BoundingBox> {
    element.expect_tag(xmlns::GML32, "Envelope").or_else(|_| {
        element.expect_tag(xmlns::GML21, "Envelope")
    })?;
    let crs = srs_of(element, None)?;
    let lower = corner_of(element, "lowerCorner")?;
    let upper = corner_of(element, "upperCorner")?;
    let swap = crs.is_north_east();
    let (min_x, min_y) = if swap { (lower[1], lower[0]) } else { (lower[0], lower[1]) };
    let (max_x, max_y) = if swap { (upper[1], upper[0]) } else { (upper[0], upper[1]) };
    Ok(BoundingBox::new(min_x, min_y, max_x, max_y, Some(crs)))
}

fn corner_of(element: &XmlElement, name: &str) -> Result<[f64; 2]> {
    let corner = find_gml(element, name).ok_or_else(|| {
        WfsError::parsing_failed(
            format!("Missing <gml:{name}> in <{}>", element.local),
            element.local.clone(),
        )
    })?;
    let coords = parse_coordinates(&corner.text, &corner.local)?;
    if coords.len() < 2 {
        return Err(WfsError::parsing_failed(
            format!("<gml:{name}> should contain at least 2 values"),
            name.to_string(),
        ));
    }
    Ok([coords[0], coords[1]])
}

fn parse_point(element: &XmlElement, swap: bool) -> Result<Point<f64>> {
    let pos = find_gml(element, "pos")
        .or_else(|| find_gml(element, "coordinates"))
        .ok_or_else(|| {
            WfsError::parsing_failed("Missing <gml:pos> in <gml:Point>", "Point")
        })?;
    // GML 2 <gml:coordinates> separates pairs with commas.
    let text = pos.text.replace(',', " ");
    let coords = parse_coordinates(&text, &element.local)?;
    if coords.len() < 2 {
        return Err(WfsError::parsing_failed(
            "A point needs at least 2 coordinate values",
            "Point",
        ));
    }
    let (x, y) = if swap { (coords[1], coords[0]) } else { (coords[0], coords[1]) };
    Ok(Point::new(x, y))
}

fn parse_line(element: &XmlElement, swap: bool) -> Result<LineString<f64>> {
    if let Some(pos_list) = find_gml(element, "posList") {
        let dim: usize = pos_list
            .attr("srsDimension")
            .map(|d| d.parse().unwrap_or(2))
            .unwrap_or(2);
        let coords = parse_coordinates(&pos_list.text, &element.local)?;
        if coords.is_empty() || coords.len() % dim != 0 {
            return Err(WfsError::parsing_failed(
                format!(
                    "<gml:posList> of <gml:{}> should contain pairs of {dim} values",
                    element.local
                ),
                element.local.clone(),
            ));
        }
        let line = coords
            .chunks(dim)
            .map(|chunk| pair(chunk[0], chunk[1], swap))
            .collect::<Vec<Coord<f64>>>();
        return Ok(LineString(line));
    }

    // A sequence of <gml:pos> children is also valid.
    let mut line = Vec::new();
    for pos in gml_children(element, "pos") {
        let coords = parse_coordinates(&pos.text, &element.local)?;
        if coords.len() < 2 {
            return Err(WfsError::parsing_failed(
                "A <gml:pos> needs at least 2 coordinate values",
                element.local.clone(),
            ));
        }
        line.push(pair(coords[0], coords[1], swap));
    }
    if line.is_empty() {
        return Err(WfsError::parsing_failed(
            format!("<gml:{}> contains no coordinates", element.local),
            element.local.clone(),
        ));
    }
    Ok(LineString(line))
}

fn parse_polygon(element: &XmlElement, swap: bool) -> Result<Polygon<f64>> {
    let exterior_wrap = find_gml(element, "exterior").ok_or_else(|| {
        WfsError::parsing_failed("Missing <gml:exterior> in <gml:Polygon>", "Polygon")
    })?;
    let exterior_ring = gml_children(exterior_wrap, "LinearRing")
        .next()
        .ok_or_else(|| {
            WfsError::parsing_failed("Missing <gml:LinearRing> in <gml:exterior>", "Polygon")
        })?;
    let exterior = parse_line(exterior_ring, swap)?;

    let mut interiors = Vec::new();
    for interior_wrap in element
        .children
        .iter()
        .filter(|c| is_gml_element(c) && c.local == "interior")
    {
        if let Some(ring) = gml_children(interior_wrap, "LinearRing").next() {
            interiors.push(parse_line(ring, swap)?);
        }
    }
    Ok(Polygon::new(exterior, interiors))
}

fn pair(a: f64, b: f64, swap: bool) -> Coord<f64> {
    if swap {
        Coord { x: b, y: a }
    } else {
        Coord { x: a, y: b }
    }
}

fn parse_coordinates(text: &str, context: &str) -> Result<Vec<f64>> {
    text.split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| {
                WfsError::parsing_failed(
                    format!("Invalid coordinate value '{token}' in <gml:{context}>"),
                    context.to_string(),
                )
            })
        })
        .collect()
}

/// The CRS declared by `srsName`, inherited or defaulting to WGS84
/// (urn notation, so latitude-first per the authority).
fn srs_of(element: &XmlElement, inherited: Option<&Crs>) -> Result<Crs> {
    match element.attr("srsName") {
        Some(value) => Crs::from_string(value),
        None => Ok(inherited.cloned().unwrap_or_else(|| WGS84.clone())),
    }
}

fn find_gml<'a>(element: &'a XmlElement, local: &str) -> Option<&'a XmlElement> {
    element
        .children
        .iter()
        .find(|c| is_gml_element(c) && c.local == local)
}

fn gml_children<'a>(
    element: &'a XmlElement,
    local: &'a str,
) -> impl Iterator<Item = &'a XmlElement> {
    element
        .children
        .iter()
        .filter(move |c| is_gml_element(c) && c.local == local)
}

/// The member wrappers of a multi-geometry, in document order.
fn members<'a>(element: &'a XmlElement, names: &'a [&'a str]) -> impl Iterator<Item = &'a XmlElement> {
    element
        .children
        .iter()
        .filter(move |c| is_gml_element(c) && names.contains(&c.local.as_str()))
}

fn unexpected(element: &XmlElement) -> WfsError {
    WfsError::parsing_failed(
        format!("Unsupported geometry element <{}>", element.local),
        element.local.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_xml_document;

    fn parse(xml: &str) -> GmlValue {
        let doc = parse_xml_document(xml, None).unwrap();
        parse_gml_node(&doc).unwrap()
    }

    #[test]
    fn point_in_wgs84_urn_is_latitude_first() {
        let value = parse(
            r#"<gml:Point xmlns:gml="http://www.opengis.net/gml/3.2"
                 srsName="urn:ogc:def:crs:EPSG::4326">
                 <gml:pos>52.155 5.387</gml:pos>
               </gml:Point>"#,
        );
        match value {
            GmlValue::Geometry(g) => match g.kind {
                GeometryKind::Point(p) => {
                    // Stored x/y: longitude first.
                    assert_eq!(p.x(), 5.387);
                    assert_eq!(p.y(), 52.155);
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn envelope_with_modern_url_crs() {
        let value = parse(
            r#"<gml:Envelope xmlns:gml="http://www.opengis.net/gml/3.2"
                 srsName="http://www.opengis.net/def/crs/epsg/0/4326">
                 <gml:lowerCorner>52.03 4.58</gml:lowerCorner>
                 <gml:upperCorner>52.49 5.31</gml:upperCorner>
               </gml:Envelope>"#,
        );
        match value {
            GmlValue::Envelope(bbox) => {
                assert_eq!(bbox.min_x, 4.58);
                assert_eq!(bbox.min_y, 52.03);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn polygon_with_interior_ring() {
        let value = parse(
            r#"<gml:Polygon xmlns:gml="http://www.opengis.net/gml/3.2"
                 srsName="urn:ogc:def:crs:OGC::CRS84">
                 <gml:exterior><gml:LinearRing>
                   <gml:posList>0 0 10 0 10 10 0 10 0 0</gml:posList>
                 </gml:LinearRing></gml:exterior>
                 <gml:interior><gml:LinearRing>
                   <gml:posList>4 4 6 4 6 6 4 6 4 4</gml:posList>
                 </gml:LinearRing></gml:interior>
               </gml:Polygon>"#,
        );
        match value {
            GmlValue::Geometry(g) => match g.kind {
                GeometryKind::Polygon(p) => {
                    assert_eq!(p.exterior().0.len(), 5);
                    assert_eq!(p.interiors().len(), 1);
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn odd_coordinate_count_is_rejected() {
        let doc = parse_xml_document(
            r#"<gml:LineString xmlns:gml="http://www.opengis.net/gml/3.2"
                 srsName="urn:ogc:def:crs:OGC::CRS84">
                 <gml:posList>1 2 3</gml:posList>
               </gml:LineString>"#,
            None,
        )
        .unwrap();
        assert!(parse_gml_node(&doc).is_err());
    }

    #[test]
    fn multipoint_members() {
        let value = parse(
            r#"<gml:MultiPoint xmlns:gml="http://www.opengis.net/gml/3.2"
                 srsName="urn:ogc:def:crs:OGC::CRS84">
                 <gml:pointMember><gml:Point><gml:pos>1 2</gml:pos></gml:Point></gml:pointMember>
                 <gml:pointMember><gml:Point><gml:pos>3 4</gml:pos></gml:Point></gml:pointMember>
               </gml:MultiPoint>"#,
        );
        match value {
            GmlValue::Geometry(g) => match g.kind {
                GeometryKind::MultiPoint(mp) => assert_eq!(mp.0.len(), 2),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_geometry_tag_fails_with_locator() {
        let doc = parse_xml_document(
            r#"<gml:Curve xmlns:gml="http://www.opengis.net/gml/3.2"/>"#,
            None,
        )
        .unwrap();
        let err = parse_gml_node(&doc).unwrap_err();
        assert_eq!(err.locator.as_deref(), Some("Curve"));
    }
}
