//! Atomic XSD type definitions.
//!
//! These types are the vocabulary on which all output is generated. They
//! are constructed from the declarative feature-type specification and
//! drive literal coercion in the query compiler.

use meridian_core::error::{Result, WfsError};
use meridian_core::values::{self, ScalarValue};
use meridian_core::GeometryType;

/// Brief enumeration of basic XSD types plus the GML property types.
///
/// The default namespace is `xs:` (XMLSchema).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XsdType {
    // `xs:any` is an element, not a type, hence anyType.
    AnyType,
    String,
    Boolean,
    Decimal,
    Integer,
    Int,
    Long,
    Float,
    Double,
    Time,
    Date,
    DateTime,
    AnyUri,
    NonNegativeInteger,
    Token,
    Language,

    // Types that contain a GML value as member:
    GmlGeometryPropertyType,
    GmlPointPropertyType,
    GmlCurvePropertyType,
    GmlSurfacePropertyType,
    GmlMultiSurfacePropertyType,
    GmlMultiPointPropertyType,
    GmlMultiCurvePropertyType,
    GmlMultiGeometryPropertyType,
    /// A direct geometry value.
    GmlAbstractGeometryType,
    /// A feature with `gml:name` / `gml:boundedBy` as possible children.
    GmlAbstractFeatureType,
    /// The type of `gml:boundedBy`.
    GmlBoundingShapeType,
}

impl XsdType {
    /// The qualified name, e.g. `xs:string` or `gml:PointPropertyType`.
    pub fn qname(&self) -> &'static str {
        use XsdType::*;
        match self {
            AnyType => "xs:anyType",
            String => "xs:string",
            Boolean => "xs:boolean",
            Decimal => "xs:decimal",
            Integer => "xs:integer",
            Int => "xs:int",
            Long => "xs:long",
            Float => "xs:float",
            Double => "xs:double",
            Time => "xs:time",
            Date => "xs:date",
            DateTime => "xs:dateTime",
            AnyUri => "xs:anyURI",
            NonNegativeInteger => "xs:nonNegativeInteger",
            Token => "xs:token",
            Language => "xs:language",
            GmlGeometryPropertyType => "gml:GeometryPropertyType",
            GmlPointPropertyType => "gml:PointPropertyType",
            GmlCurvePropertyType => "gml:CurvePropertyType",
            GmlSurfacePropertyType => "gml:SurfacePropertyType",
            GmlMultiSurfacePropertyType => "gml:MultiSurfacePropertyType",
            GmlMultiPointPropertyType => "gml:MultiPointPropertyType",
            GmlMultiCurvePropertyType => "gml:MultiCurvePropertyType",
            GmlMultiGeometryPropertyType => "gml:MultiGeometryPropertyType",
            GmlAbstractGeometryType => "gml:AbstractGeometryType",
            GmlAbstractFeatureType => "gml:AbstractFeatureType",
            GmlBoundingShapeType => "gml:BoundingShapeType",
        }
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self.qname().split(':').next(), Some("gml"))
            && *self != XsdType::GmlAbstractFeatureType
    }

    /// The advertised property type for a geometry element.
    pub fn for_geometry(geometry_type: GeometryType) -> XsdType {
        match geometry_type {
            GeometryType::Point => XsdType::GmlPointPropertyType,
            GeometryType::LineString | GeometryType::LinearRing => XsdType::GmlCurvePropertyType,
            GeometryType::Polygon => XsdType::GmlSurfacePropertyType,
            GeometryType::MultiPoint => XsdType::GmlMultiPointPropertyType,
            GeometryType::MultiLineString => XsdType::GmlMultiCurvePropertyType,
            GeometryType::MultiPolygon => XsdType::GmlMultiSurfacePropertyType,
            GeometryType::GeometryCollection => XsdType::GmlMultiGeometryPropertyType,
            GeometryType::Any => XsdType::GmlGeometryPropertyType,
        }
    }

    /// Resolve a QName into a type. Accepts `xs:`/`xsd:` prefixes, the
    /// expanded XMLSchema namespace, bare names and `gml:` property types.
    pub fn from_qname(raw: &str) -> Option<XsdType> {
        let local = if let Some(rest) = raw.strip_prefix("{http://www.w3.org/2001/XMLSchema}") {
            rest
        } else if let Some(rest) = raw.strip_prefix("{http://www.opengis.net/gml/3.2}") {
            return Self::from_gml_local(rest);
        } else if let Some((prefix, rest)) = raw.split_once(':') {
            match prefix {
                "xs" | "xsd" => rest,
                "gml" => return Self::from_gml_local(rest),
                _ => return None,
            }
        } else {
            raw
        };

        use XsdType::*;
        Some(match local {
            "anyType" => AnyType,
            "string" => String,
            "boolean" => Boolean,
            "decimal" => Decimal,
            "integer" => Integer,
            "int" => Int,
            "long" => Long,
            "float" => Float,
            "double" => Double,
            "time" => Time,
            "date" => Date,
            "dateTime" => DateTime,
            "anyURI" => AnyUri,
            "nonNegativeInteger" => NonNegativeInteger,
            "token" => Token,
            "language" => Language,
            _ => return None,
        })
    }

    fn from_gml_local(local: &str) -> Option<XsdType> {
        use XsdType::*;
        Some(match local {
            "GeometryPropertyType" => GmlGeometryPropertyType,
            "PointPropertyType" => GmlPointPropertyType,
            "CurvePropertyType" => GmlCurvePropertyType,
            "SurfacePropertyType" => GmlSurfacePropertyType,
            "MultiSurfacePropertyType" => GmlMultiSurfacePropertyType,
            "MultiPointPropertyType" => GmlMultiPointPropertyType,
            "MultiCurvePropertyType" => GmlMultiCurvePropertyType,
            "MultiGeometryPropertyType" => GmlMultiGeometryPropertyType,
            "AbstractGeometryType" => GmlAbstractGeometryType,
            "AbstractFeatureType" => GmlAbstractFeatureType,
            "BoundingShapeType" => GmlBoundingShapeType,
            _ => return None,
        })
    }

    /// Coerce a raw literal into a typed scalar.
    pub fn to_value(&self, raw: &str) -> Result<ScalarValue> {
        use XsdType::*;
        match self {
            AnyType => Ok(values::auto_cast(raw)),
            String | AnyUri | Token | Language => Ok(ScalarValue::String(raw.to_string())),
            Boolean => values::parse_bool(raw).map(ScalarValue::Bool),
            Integer | Int | Long | NonNegativeInteger => {
                raw.trim().parse::<i64>().map(ScalarValue::Integer).map_err(|_| {
                    WfsError::invalid_parameter(
                        format!("Invalid integer value: '{raw}'"),
                        "filter",
                    )
                })
            }
            Decimal | Float | Double => {
                raw.trim().parse::<f64>().map(ScalarValue::Double).map_err(|_| {
                    WfsError::invalid_parameter(format!("Invalid numeric value: '{raw}'"), "filter")
                })
            }
            Date => values::parse_iso_date(raw).map(ScalarValue::Date),
            DateTime => values::parse_iso_datetime(raw).map(ScalarValue::DateTime),
            Time => values::parse_iso_time(raw).map(ScalarValue::Time),
            _ => Err(WfsError::invalid_parameter(
                format!("Can't compare a literal against a {} value", self.qname()),
                "filter",
            )),
        }
    }
}

impl std::fmt::Display for XsdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.qname())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qname_round_trip() {
        for t in [XsdType::String, XsdType::DateTime, XsdType::GmlPointPropertyType] {
            assert_eq!(XsdType::from_qname(t.qname()), Some(t));
        }
        assert_eq!(XsdType::from_qname("xsd:string"), Some(XsdType::String));
        assert_eq!(XsdType::from_qname("boolean"), Some(XsdType::Boolean));
        assert_eq!(
            XsdType::from_qname("{http://www.w3.org/2001/XMLSchema}double"),
            Some(XsdType::Double)
        );
        assert_eq!(XsdType::from_qname("foo:string"), None);
    }

    #[test]
    fn coercion_catches_bad_literals() {
        assert!(XsdType::Integer.to_value("abc").is_err());
        assert_eq!(
            XsdType::Double.to_value("3.5").unwrap(),
            ScalarValue::Double(3.5)
        );
        assert!(XsdType::GmlPointPropertyType.to_value("x").is_err());
    }

    #[test]
    fn geometry_flag() {
        assert!(XsdType::GmlPointPropertyType.is_geometry());
        assert!(XsdType::GmlBoundingShapeType.is_geometry());
        assert!(!XsdType::String.is_geometry());
        assert!(!XsdType::GmlAbstractFeatureType.is_geometry());
    }
}
