//! Coordinate reference system handling.
//!
//! This covers CRS identifier parsing, axis orientation and coordinate
//! transforms. A CRS is preferably written in the URN format of the OGC
//! consortium (`urn:ogc:def:crs:EPSG::4326`), but several legacy notations
//! are recognized as well. Legacy notations may coerce the axis order to
//! x/y for interoperability with older clients, mirroring how GeoServer
//! treats `EPSG:4326`.
//!
//! Transforms are driven by proj4rs with projection definitions from the
//! crs-definitions database, and cached process-wide in an LRU keyed by
//! `(from_srid, to_srid)`.

use crate::error::{Result, WfsError};
use crate::geometry::Geometry;
use lru::LruCache;
use proj4rs::proj::Proj;
use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock, Mutex, OnceLock};

/// The legacy GML 2 notation, which always implies x/y axis ordering.
pub const LEGACY_URL_PREFIX: &str = "http://www.opengis.net/gml/srs/epsg.xml#";
const MODERN_URL_PREFIX: &str = "http://www.opengis.net/def/crs/epsg/0/";
const EPSG_PREFIX: &str = "EPSG:";

/// Capacity of the process-wide transform cache.
const TRANSFORM_CACHE_SIZE: usize = 100;

/// The SRS authority that issued the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Authority {
    Epsg,
    Ogc,
}

impl Authority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Authority::Epsg => "EPSG",
            Authority::Ogc => "OGC",
        }
    }
}

/// Legacy axis-order coercion flags, set once at service bootstrap.
/// `(force_xy_epsg_4326, force_xy_old_crs)`; both default to true,
/// which is what legacy clients expect in practice.
static LEGACY_AXES: OnceLock<(bool, bool)> = OnceLock::new();

/// Configure the legacy axis-order flags. Call before serving requests;
/// later calls are ignored.
pub fn configure_legacy_axes(force_xy_epsg_4326: bool, force_xy_old_crs: bool) {
    let _ = LEGACY_AXES.set((force_xy_epsg_4326, force_xy_old_crs));
}

fn legacy_axes() -> (bool, bool) {
    *LEGACY_AXES.get().unwrap_or(&(true, true))
}

/// A Coordinate Reference System identifier.
///
/// Immutable once constructed. Equality considers the authority, the numeric
/// SRID and the legacy x/y coercion, so `urn:ogc:def:crs:EPSG::4326` and
/// `EPSG:4326` (with the force-xy flag on) compare unequal even though they
/// share an SRID.
#[derive(Debug, Clone)]
pub struct Crs {
    /// URN domain, either "ogc" or "opengis".
    domain: &'static str,
    pub authority: Authority,
    /// Authority registry version; empty for WFS 2.0 usage.
    pub version: String,
    /// String form of the code ("4326", "CRS84").
    pub crsid: String,
    /// Numeric spatial reference id as used by spatial databases.
    pub srid: i32,
    /// Whether the input notation forces x/y (longitude first) ordering.
    pub force_xy: bool,
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.srid == other.srid
            && self.authority == other.authority
            && self.force_xy == other.force_xy
    }
}

impl Eq for Crs {}

impl std::hash::Hash for Crs {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.authority.hash(state);
        self.srid.hash(state);
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.force_xy {
            f.write_str(&self.legacy())
        } else {
            f.write_str(&self.urn())
        }
    }
}

impl Crs {
    /// Parse a CRS reference. The value can be:
    ///
    /// * a URI in OGC URN format (`urn:ogc:def:crs:EPSG::28992`),
    /// * the modern URL format (`http://www.opengis.net/def/crs/epsg/0/28992`),
    /// * a legacy notation (`EPSG:28992` or
    ///   `http://www.opengis.net/gml/srs/epsg.xml#28992`),
    /// * a bare numeric SRID.
    pub fn from_string(uri: &str) -> Result<Crs> {
        if !uri.is_empty() && uri.bytes().all(|b| b.is_ascii_digit()) {
            return Self::from_srid(uri.parse::<i32>().map_err(|_| unknown_crs(uri))?);
        }
        if uri.starts_with("urn:") {
            Self::from_urn(uri)
        } else {
            Self::from_prefix(uri)
        }
    }

    /// Instantiate using a numeric spatial reference id.
    /// Logically identical to parsing `urn:ogc:def:crs:EPSG::<srid>`.
    pub fn from_srid(srid: i32) -> Result<Crs> {
        check_known_code(srid, &srid.to_string())?;
        Ok(Crs {
            domain: "ogc",
            authority: Authority::Epsg,
            version: String::new(),
            crsid: srid.to_string(),
            srid,
            force_xy: false,
        })
    }

    /// The URN format, defined in OGC 07-092r1.
    fn from_urn(urn: &str) -> Result<Crs> {
        let parts: Vec<&str> = urn.split(':').collect();
        if parts.len() != 7 || parts[0] != "urn" || parts[2] != "def" || parts[3] != "crs" {
            return Err(unknown_crs(urn));
        }

        let domain = match parts[1].to_ascii_lowercase().as_str() {
            "ogc" => "ogc",
            "opengis" => "opengis",
            other => {
                return Err(WfsError::invalid_parameter(
                    format!("CRS URI [{urn}] contains unknown domain [{other}]"),
                    "srsName",
                ))
            }
        };
        let version = parts[5];
        if !version.is_empty() && !version.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
            return Err(unknown_crs(urn));
        }

        match parts[4].to_ascii_uppercase().as_str() {
            "EPSG" => {
                let srid: i32 = parts[6].parse().map_err(|_| {
                    WfsError::invalid_parameter(
                        format!("CRS URI [{urn}] should contain a numeric SRID value."),
                        "srsName",
                    )
                })?;
                check_known_code(srid, urn)?;
                Ok(Crs {
                    domain,
                    authority: Authority::Epsg,
                    version: version.to_string(),
                    crsid: parts[6].to_string(),
                    srid,
                    force_xy: false,
                })
            }
            "OGC" => {
                let crsid = parts[6].to_ascii_uppercase();
                if crsid != "CRS84" && crsid != "84" {
                    return Err(WfsError::invalid_parameter(
                        format!("OGC CRS URI from [{urn}] contains unknown id [{crsid}]"),
                        "srsName",
                    ));
                }
                Ok(Crs {
                    domain,
                    authority: Authority::Ogc,
                    version: version.to_string(),
                    crsid: "CRS84".to_string(),
                    srid: 4326,
                    force_xy: false,
                })
            }
            other => Err(WfsError::invalid_parameter(
                format!("CRS URI [{urn}] contains unknown authority [{other}]"),
                "srsName",
            )),
        }
    }

    /// Non-URN notations: the modern URL format and the legacy forms.
    fn from_prefix(uri: &str) -> Result<Crs> {
        // Normalize casing: URLs compare lowercase, `EPSG:` uppercase.
        let origin = if uri.contains("://") {
            uri.to_ascii_lowercase()
        } else {
            uri.to_ascii_uppercase()
        };
        let (force_xy_epsg_4326, force_xy_old_crs) = legacy_axes();

        let candidates: [(&str, bool); 3] = [
            (EPSG_PREFIX, force_xy_epsg_4326 && origin == "EPSG:4326"),
            (LEGACY_URL_PREFIX, force_xy_old_crs),
            (MODERN_URL_PREFIX, false),
        ];
        for (prefix, force_xy) in candidates {
            if let Some(crsid) = origin.strip_prefix(prefix) {
                let srid: i32 = crsid.parse().map_err(|_| {
                    WfsError::invalid_parameter(
                        format!("CRS URI [{uri}] should contain a numeric SRID value."),
                        "srsName",
                    )
                })?;
                check_known_code(srid, uri)?;
                return Ok(Crs {
                    domain: "ogc",
                    authority: Authority::Epsg,
                    version: String::new(),
                    crsid: crsid.to_string(),
                    srid,
                    force_xy,
                });
            }
        }

        Err(unknown_crs(uri))
    }

    /// The OGC URN corresponding to this CRS.
    pub fn urn(&self) -> String {
        format!(
            "urn:{}:def:crs:{}:{}:{}",
            self.domain,
            self.authority.as_str(),
            self.version,
            self.crsid
        )
    }

    /// The legacy notation (`http://www.opengis.net/gml/srs/epsg.xml#<srid>`),
    /// which always has x/y ordering defined.
    pub fn legacy(&self) -> String {
        format!("{LEGACY_URL_PREFIX}{}", self.srid)
    }

    /// Whether the authority defines this CRS with north/east (y/x) axis
    /// ordering. Geographic EPSG systems are latitude-first; CRS84 and
    /// projected systems are x/y. Legacy notations coerce to x/y.
    pub fn is_north_east(&self) -> bool {
        self.authority == Authority::Epsg && !self.force_xy && is_geographic(self.srid)
    }

    /// Whether coordinates are expressed in degrees.
    pub fn is_geographic(&self) -> bool {
        is_geographic(self.srid)
    }

    /// Tell whether this CRS is identical to another, optionally ignoring
    /// the legacy-notation distinction.
    pub fn matches(&self, other: &Crs, compare_legacy: bool) -> bool {
        self.srid == other.srid
            && self.authority == other.authority
            && (!compare_legacy || self.force_xy == other.force_xy)
    }

    /// Transform a geometry into this coordinate reference system.
    ///
    /// Every transformation in the server happens through this method.
    /// Coordinates are stored x/y in memory regardless of the authority
    /// ordering (like PostGIS does); axis swapping happens only when
    /// parsing input and emitting output.
    pub fn apply_to(&self, geometry: &Geometry) -> Result<Geometry> {
        if geometry.crs.srid == self.srid {
            return Ok(Geometry {
                crs: self.clone(),
                kind: geometry.kind.clone(),
            });
        }
        let transform = cached_transform(geometry.crs.srid, self.srid)?;
        let kind = geometry
            .kind
            .try_map_coords(&|x, y| transform.project(x, y))?;
        Ok(Geometry {
            crs: self.clone(),
            kind,
        })
    }
}

fn unknown_crs(uri: &str) -> WfsError {
    WfsError::invalid_parameter(format!("Unknown CRS URI [{uri}] specified"), "srsName")
}

fn proj_string(srid: i32) -> Option<&'static str> {
    u16::try_from(srid)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

fn check_known_code(srid: i32, uri: &str) -> Result<()> {
    if proj_string(srid).is_none() {
        return Err(WfsError::invalid_parameter(
            format!("CRS URI [{uri}] references an unknown EPSG code."),
            "srsName",
        ));
    }
    Ok(())
}

fn is_geographic(srid: i32) -> bool {
    match proj_string(srid) {
        Some(proj) => proj.contains("+proj=longlat"),
        None => srid == 4326 || (4000..5000).contains(&srid),
    }
}

/// A resolved transform pair. proj4rs works in radians for geographic
/// systems, so the degree conversion is folded in here.
struct CachedTransform {
    source: Proj,
    target: Proj,
    source_geographic: bool,
    target_geographic: bool,
}

impl CachedTransform {
    fn new(from_srid: i32, to_srid: i32) -> Result<Self> {
        let source_str = proj_string(from_srid).ok_or_else(|| {
            WfsError::processing_failed(format!("No projection known for SRID {from_srid}"))
        })?;
        let target_str = proj_string(to_srid).ok_or_else(|| {
            WfsError::processing_failed(format!("No projection known for SRID {to_srid}"))
        })?;
        let source = Proj::from_proj_string(source_str).map_err(|e| {
            WfsError::processing_failed(format!("Invalid projection for SRID {from_srid}: {e:?}"))
        })?;
        let target = Proj::from_proj_string(target_str).map_err(|e| {
            WfsError::processing_failed(format!("Invalid projection for SRID {to_srid}: {e:?}"))
        })?;
        Ok(CachedTransform {
            source,
            target,
            source_geographic: is_geographic(from_srid),
            target_geographic: is_geographic(to_srid),
        })
    }

    fn project(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let (x_in, y_in) = if self.source_geographic {
            (x.to_radians(), y.to_radians())
        } else {
            (x, y)
        };
        let mut point = (x_in, y_in, 0.0);
        proj4rs::transform::transform(&self.source, &self.target, &mut point).map_err(|e| {
            WfsError::processing_failed(format!("Coordinate transform failed: {e:?}"))
        })?;
        if self.target_geographic {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }
}

/// Process-wide transform cache. Append-only under a mutex; the critical
/// section is a hash lookup, contention is not a concern.
static TRANSFORMS: LazyLock<Mutex<LruCache<(i32, i32), Arc<CachedTransform>>>> =
    LazyLock::new(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(TRANSFORM_CACHE_SIZE).unwrap(),
        ))
    });

fn cached_transform(from_srid: i32, to_srid: i32) -> Result<Arc<CachedTransform>> {
    let mut cache = TRANSFORMS.lock().expect("transform cache poisoned");
    if let Some(found) = cache.get(&(from_srid, to_srid)) {
        return Ok(found.clone());
    }
    tracing::debug!(from_srid, to_srid, "constructing coordinate transform");
    let transform = Arc::new(CachedTransform::new(from_srid, to_srid)?);
    cache.put((from_srid, to_srid), transform.clone());
    Ok(transform)
}

/// Worldwide GPS, latitude/longitude (y/x). <https://epsg.io/4326>
pub static WGS84: LazyLock<Crs> =
    LazyLock::new(|| Crs::from_string("urn:ogc:def:crs:EPSG::4326").unwrap());

/// GeoJSON default. Like WGS84 but longitude/latitude (x/y).
pub static CRS84: LazyLock<Crs> =
    LazyLock::new(|| Crs::from_string("urn:ogc:def:crs:OGC::CRS84").unwrap());

/// Spherical Mercator (web mapping), see <https://epsg.io/3857>
pub static WEB_MERCATOR: LazyLock<Crs> =
    LazyLock::new(|| Crs::from_string("urn:ogc:def:crs:EPSG::3857").unwrap());

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryKind;
    use geo_types::point;

    #[test]
    fn parses_urn_notation() {
        let crs = Crs::from_string("urn:ogc:def:crs:EPSG::28992").unwrap();
        assert_eq!(crs.srid, 28992);
        assert_eq!(crs.authority, Authority::Epsg);
        assert!(!crs.force_xy);
        assert_eq!(crs.urn(), "urn:ogc:def:crs:EPSG::28992");
    }

    #[test]
    fn parses_crs84() {
        let crs = Crs::from_string("urn:ogc:def:crs:OGC::CRS84").unwrap();
        assert_eq!(crs.srid, 4326);
        assert_eq!(crs.authority, Authority::Ogc);
        assert!(!crs.is_north_east());
    }

    #[test]
    fn parses_legacy_notations() {
        let crs = Crs::from_string("EPSG:4326").unwrap();
        assert!(crs.force_xy);
        assert!(!crs.is_north_east());

        let crs = Crs::from_string("http://www.opengis.net/gml/srs/epsg.xml#4326").unwrap();
        assert!(crs.force_xy);

        let crs = Crs::from_string("http://www.opengis.net/def/crs/epsg/0/4326").unwrap();
        assert!(!crs.force_xy);
        assert!(crs.is_north_east());
    }

    #[test]
    fn parses_bare_srid() {
        let crs = Crs::from_string("28992").unwrap();
        assert_eq!(crs.srid, 28992);
    }

    #[test]
    fn wgs84_is_north_east_ordered() {
        assert!(WGS84.is_north_east());
        assert!(!CRS84.is_north_east());
        assert!(!WEB_MERCATOR.is_north_east());
    }

    #[test]
    fn rejects_unknown_notations() {
        assert!(Crs::from_string("urn:ogc:def:crs:EPSG::abc").is_err());
        assert!(Crs::from_string("urn:x:def:crs:EPSG::4326").is_err());
        assert!(Crs::from_string("ESRI:102100").is_err());
        assert!(Crs::from_string("urn:ogc:def:crs:OGC::CRS27").is_err());
    }

    #[test]
    fn legacy_and_urn_forms_compare_unequal() {
        let urn = Crs::from_string("urn:ogc:def:crs:EPSG::4326").unwrap();
        let legacy = Crs::from_string("EPSG:4326").unwrap();
        assert_ne!(urn, legacy);
        assert!(urn.matches(&legacy, false));
    }

    #[test]
    fn reprojects_rd_new_to_wgs84() {
        // The OLV tower in Amersfoort, the RD origin anchor point.
        let rd = Crs::from_srid(28992).unwrap();
        let geom = Geometry::new(rd, GeometryKind::Point(point!(x: 155000.0, y: 463000.0)));
        let out = WGS84.apply_to(&geom).unwrap();
        match out.kind {
            GeometryKind::Point(p) => {
                assert!((p.x() - 5.387).abs() < 0.01, "lon was {}", p.x());
                assert!((p.y() - 52.155).abs() < 0.01, "lat was {}", p.y());
            }
            other => panic!("expected point, got {other:?}"),
        }
    }

    #[test]
    fn same_srid_transform_is_identity() {
        let geom = Geometry::new(
            WGS84.clone(),
            GeometryKind::Point(point!(x: 5.0, y: 52.0)),
        );
        let out = WGS84.apply_to(&geom).unwrap();
        assert_eq!(out.kind, geom.kind);
    }
}
