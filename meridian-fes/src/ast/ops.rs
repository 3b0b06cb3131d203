//! FES 2.0 operators: comparison, spatial and logical predicates.

use crate::ast::expr::{Expression, ValueReference};
use crate::gml::{is_gml_element, parse_gml_node, GmlValue};
use crate::xml::XmlElement;
use crate::xmlns;
use meridian_core::error::{Result, WfsError};
use meridian_core::Geometry;

/// Binary value comparisons, `<fes:PropertyIsEqualTo>` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl ComparisonOp {
    pub fn from_tag(local: &str) -> Option<ComparisonOp> {
        match local {
            "PropertyIsEqualTo" => Some(ComparisonOp::Eq),
            "PropertyIsNotEqualTo" => Some(ComparisonOp::NotEq),
            "PropertyIsLessThan" => Some(ComparisonOp::Lt),
            "PropertyIsGreaterThan" => Some(ComparisonOp::Gt),
            "PropertyIsLessThanOrEqualTo" => Some(ComparisonOp::Lte),
            "PropertyIsGreaterThanOrEqualTo" => Some(ComparisonOp::Gte),
            _ => None,
        }
    }

    pub fn tag_name(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "PropertyIsEqualTo",
            ComparisonOp::NotEq => "PropertyIsNotEqualTo",
            ComparisonOp::Lt => "PropertyIsLessThan",
            ComparisonOp::Gt => "PropertyIsGreaterThan",
            ComparisonOp::Lte => "PropertyIsLessThanOrEqualTo",
            ComparisonOp::Gte => "PropertyIsGreaterThanOrEqualTo",
        }
    }

    /// The mirrored operator, for when reversed operands are swapped
    /// (`Literal OP ValueReference` → `ValueReference OP' Literal`).
    pub fn reversed(&self) -> ComparisonOp {
        match self {
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::Lte => ComparisonOp::Gte,
            ComparisonOp::Gte => ComparisonOp::Lte,
            other => *other,
        }
    }
}

/// Binary spatial operators. `BBOX` uses intersects semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialOpName {
    Bbox,
    Equals,
    Disjoint,
    Intersects,
    Touches,
    Crosses,
    Within,
    Contains,
    Overlaps,
}

impl SpatialOpName {
    pub fn from_tag(local: &str) -> Option<SpatialOpName> {
        match local {
            "BBOX" => Some(SpatialOpName::Bbox),
            "Equals" => Some(SpatialOpName::Equals),
            "Disjoint" => Some(SpatialOpName::Disjoint),
            "Intersects" => Some(SpatialOpName::Intersects),
            "Touches" => Some(SpatialOpName::Touches),
            "Crosses" => Some(SpatialOpName::Crosses),
            "Within" => Some(SpatialOpName::Within),
            "Contains" => Some(SpatialOpName::Contains),
            "Overlaps" => Some(SpatialOpName::Overlaps),
            _ => None,
        }
    }

    pub fn tag_name(&self) -> &'static str {
        match self {
            SpatialOpName::Bbox => "BBOX",
            SpatialOpName::Equals => "Equals",
            SpatialOpName::Disjoint => "Disjoint",
            SpatialOpName::Intersects => "Intersects",
            SpatialOpName::Touches => "Touches",
            SpatialOpName::Crosses => "Crosses",
            SpatialOpName::Within => "Within",
            SpatialOpName::Contains => "Contains",
            SpatialOpName::Overlaps => "Overlaps",
        }
    }
}

/// `<fes:DWithin>` / `<fes:Beyond>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceOpName {
    DWithin,
    Beyond,
}

/// `<fes:Distance uom="…">value</fes:Distance>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub value: f64,
    /// Unit of measurement symbol or URI.
    pub uom: String,
}

impl Measure {
    pub fn from_xml(element: &XmlElement) -> Result<Measure> {
        element.expect_tag(xmlns::FES, "Distance")?;
        let value = element.text.trim().parse::<f64>().map_err(|_| {
            WfsError::parsing_failed(
                format!("Invalid <fes:Distance> value '{}'", element.text.trim()),
                "Distance",
            )
        })?;
        Ok(Measure {
            value,
            uom: element.require_attr("uom")?.to_string(),
        })
    }
}

/// The second operand of a binary spatial operator: a geometry, an
/// envelope, or another value reference.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialOperand {
    Value(GmlValue),
    Ref(ValueReference),
}

/// Every operator except the `<fes:ResourceId>` chain.
///
/// `And`, `Or` and `Not` only admit other `NonIdOperator` children, which
/// the dispatch below enforces by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum NonIdOperator {
    Comparison {
        op: ComparisonOp,
        lhs: Expression,
        rhs: Expression,
        match_case: bool,
    },
    Between {
        expr: Expression,
        lower: Expression,
        upper: Expression,
    },
    Like {
        expr: Expression,
        pattern: Expression,
        wild_card: String,
        single_char: String,
        escape_char: String,
        match_case: bool,
    },
    /// True when the element renders with `xsi:nil="true"`.
    Nil { expr: Expression },
    /// True when the element is absent from the output.
    Null { expr: Expression },
    Spatial {
        op: SpatialOpName,
        /// `None` for a single-operand `<fes:BBOX>`; the compiler resolves
        /// it to the feature's main geometry element.
        operand: Option<ValueReference>,
        other: SpatialOperand,
    },
    Distance {
        op: DistanceOpName,
        operand: ValueReference,
        geometry: Geometry,
        distance: Measure,
    },
    /// Temporal operators parse but are not executable.
    Temporal { op: String },
    And(Vec<NonIdOperator>),
    Or(Vec<NonIdOperator>),
    Not(Box<NonIdOperator>),
}

const TEMPORAL_TAGS: &[&str] = &[
    "After",
    "Before",
    "Begins",
    "BegunBy",
    "TContains",
    "TEquals",
    "TOverlaps",
    "During",
    "Meets",
    "OverlappedBy",
    "MetBy",
    "EndedBy",
    "AnyInteracts",
];

impl NonIdOperator {
    /// Dispatch an operator child by its tag name.
    pub fn from_element(element: &XmlElement) -> Result<NonIdOperator> {
        if element.ns.as_deref() != Some(xmlns::FES) {
            return Err(unexpected_operator(element));
        }
        let local = element.local.as_str();

        if let Some(op) = ComparisonOp::from_tag(local) {
            return Self::parse_comparison(element, op);
        }
        if let Some(op) = SpatialOpName::from_tag(local) {
            return Self::parse_spatial(element, op);
        }
        match local {
            "PropertyIsBetween" => Self::parse_between(element),
            "PropertyIsLike" => Self::parse_like(element),
            "PropertyIsNil" => Ok(NonIdOperator::Nil {
                expr: Self::single_expression(element)?,
            }),
            "PropertyIsNull" => Ok(NonIdOperator::Null {
                expr: Self::single_expression(element)?,
            }),
            "DWithin" => Self::parse_distance(element, DistanceOpName::DWithin),
            "Beyond" => Self::parse_distance(element, DistanceOpName::Beyond),
            "And" => {
                element.expect_children(2)?;
                Ok(NonIdOperator::And(Self::operator_children(element)?))
            }
            "Or" => {
                element.expect_children(2)?;
                Ok(NonIdOperator::Or(Self::operator_children(element)?))
            }
            "Not" => {
                element.expect_children(1)?;
                Ok(NonIdOperator::Not(Box::new(Self::from_element(
                    &element.children[0],
                )?)))
            }
            other if TEMPORAL_TAGS.contains(&other) => Ok(NonIdOperator::Temporal {
                op: other.to_string(),
            }),
            _ => Err(unexpected_operator(element)),
        }
    }

    fn parse_comparison(element: &XmlElement, op: ComparisonOp) -> Result<NonIdOperator> {
        element.expect_children(2)?;
        if element.children.len() != 2 {
            return Err(WfsError::parsing_failed(
                format!("<{}> should have 2 operands", element.local),
                element.local.clone(),
            ));
        }
        Ok(NonIdOperator::Comparison {
            op,
            lhs: Expression::from_element(&element.children[0])?,
            rhs: Expression::from_element(&element.children[1])?,
            match_case: parse_match_case(element)?,
        })
    }

    fn parse_between(element: &XmlElement) -> Result<NonIdOperator> {
        element.expect_children(3)?;
        let lower = element.find(xmlns::FES, "LowerBoundary").ok_or_else(|| {
            boundary_error(element)
        })?;
        let upper = element.find(xmlns::FES, "UpperBoundary").ok_or_else(|| {
            boundary_error(element)
        })?;
        if lower.children.len() != 1 || upper.children.len() != 1 {
            return Err(WfsError::parsing_failed(
                "Boundary elements should have 1 expression child node",
                "PropertyIsBetween",
            ));
        }
        Ok(NonIdOperator::Between {
            expr: Expression::from_element(&element.children[0])?,
            lower: Expression::from_element(&lower.children[0])?,
            upper: Expression::from_element(&upper.children[0])?,
        })
    }

    fn parse_like(element: &XmlElement) -> Result<NonIdOperator> {
        element.expect_children(2)?;
        Ok(NonIdOperator::Like {
            expr: Expression::from_element(&element.children[0])?,
            pattern: Expression::from_element(&element.children[1])?,
            // These attributes are required by the WFS spec:
            wild_card: element.require_attr("wildCard")?.to_string(),
            single_char: element.require_attr("singleChar")?.to_string(),
            escape_char: element.require_attr("escapeChar")?.to_string(),
            match_case: parse_match_case(element)?,
        })
    }

    fn parse_spatial(element: &XmlElement, op: SpatialOpName) -> Result<NonIdOperator> {
        let (operand, other) = if op == SpatialOpName::Bbox && element.children.len() == 1 {
            // For BBOX the value reference is optional.
            (None, &element.children[0])
        } else {
            if element.children.len() != 2 {
                return Err(WfsError::parsing_failed(
                    format!("<{}> should have 2 operands", element.local),
                    element.local.clone(),
                ));
            }
            (Some(&element.children[0]), &element.children[1])
        };

        let operand = operand
            .map(ValueReference::from_xml)
            .transpose()?;
        let other = if is_gml_element(other) {
            SpatialOperand::Value(parse_gml_node(other)?)
        } else {
            SpatialOperand::Ref(ValueReference::from_xml(other)?)
        };
        Ok(NonIdOperator::Spatial { op, operand, other })
    }

    fn parse_distance(element: &XmlElement, op: DistanceOpName) -> Result<NonIdOperator> {
        element.expect_children(3)?;
        let geometries: Vec<&XmlElement> =
            element.children.iter().filter(|c| is_gml_element(c)).collect();
        if geometries.is_empty() {
            return Err(WfsError::parsing_failed(
                format!("Missing gml element in <{}>", element.local),
                element.local.clone(),
            ));
        }
        if geometries.len() > 1 {
            return Err(WfsError::parsing_failed(
                format!("Multiple gml elements found in <{}>", element.local),
                element.local.clone(),
            ));
        }
        let reference = element
            .children
            .iter()
            .find(|c| c.is(xmlns::FES, "ValueReference") || c.is(xmlns::FES, "PropertyName"))
            .ok_or_else(|| {
                WfsError::parsing_failed(
                    format!("Missing <fes:ValueReference> in <{}>", element.local),
                    element.local.clone(),
                )
            })?;
        let distance = element.find(xmlns::FES, "Distance").ok_or_else(|| {
            WfsError::parsing_failed(
                format!("Missing <fes:Distance> in <{}>", element.local),
                element.local.clone(),
            )
        })?;
        Ok(NonIdOperator::Distance {
            op,
            operand: ValueReference::from_xml(reference)?,
            geometry: parse_gml_node(geometries[0])?.into_geometry(),
            distance: Measure::from_xml(distance)?,
        })
    }

    fn single_expression(element: &XmlElement) -> Result<Expression> {
        element.expect_children(1)?;
        Expression::from_element(&element.children[0])
    }

    fn operator_children(element: &XmlElement) -> Result<Vec<NonIdOperator>> {
        element
            .children
            .iter()
            .map(NonIdOperator::from_element)
            .collect()
    }
}

fn parse_match_case(element: &XmlElement) -> Result<bool> {
    match element.attr("matchCase") {
        None => Ok(true),
        Some(raw) => meridian_core::values::parse_bool(raw).map_err(|_| {
            WfsError::parsing_failed(
                format!("Invalid matchCase value '{raw}'"),
                element.local.clone(),
            )
        }),
    }
}

fn boundary_error(element: &XmlElement) -> WfsError {
    WfsError::parsing_failed(
        format!(
            "<{}> should have 3 child nodes: (expression), <LowerBoundary>, <UpperBoundary>",
            element.local
        ),
        element.local.clone(),
    )
}

fn unexpected_operator(element: &XmlElement) -> WfsError {
    WfsError::parsing_failed(
        format!("Unsupported operator element <{}>", element.local),
        element.local.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_xml_document;

    fn op(body: &str) -> Result<NonIdOperator> {
        let doc = parse_xml_document(
            &format!(
                r#"<root xmlns:fes="http://www.opengis.net/fes/2.0"
                        xmlns:gml="http://www.opengis.net/gml/3.2">{body}</root>"#
            ),
            None,
        )
        .unwrap();
        NonIdOperator::from_element(&doc.children[0])
    }

    #[test]
    fn parses_binary_comparison() {
        let parsed = op(
            "<fes:PropertyIsGreaterThanOrEqualTo>
               <fes:ValueReference>rating</fes:ValueReference>
               <fes:Literal>3.0</fes:Literal>
             </fes:PropertyIsGreaterThanOrEqualTo>",
        )
        .unwrap();
        match parsed {
            NonIdOperator::Comparison { op, match_case, .. } => {
                assert_eq!(op, ComparisonOp::Gte);
                assert!(match_case);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_like_with_attributes() {
        let parsed = op(
            r#"<fes:PropertyIsLike wildCard="*" singleChar="." escapeChar="\">
                 <fes:ValueReference>name</fes:ValueReference>
                 <fes:Literal>Caf*</fes:Literal>
               </fes:PropertyIsLike>"#,
        )
        .unwrap();
        match parsed {
            NonIdOperator::Like { wild_card, single_char, .. } => {
                assert_eq!(wild_card, "*");
                assert_eq!(single_char, ".");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn like_requires_wildcard_attributes() {
        assert!(op(
            "<fes:PropertyIsLike>
               <fes:ValueReference>name</fes:ValueReference>
               <fes:Literal>x</fes:Literal>
             </fes:PropertyIsLike>"
        )
        .is_err());
    }

    #[test]
    fn bbox_with_single_operand() {
        let parsed = op(
            r#"<fes:BBOX>
                 <gml:Envelope srsName="urn:ogc:def:crs:OGC::CRS84">
                   <gml:lowerCorner>4.58 52.03</gml:lowerCorner>
                   <gml:upperCorner>5.31 52.49</gml:upperCorner>
                 </gml:Envelope>
               </fes:BBOX>"#,
        )
        .unwrap();
        match parsed {
            NonIdOperator::Spatial { op, operand, other } => {
                assert_eq!(op, SpatialOpName::Bbox);
                assert!(operand.is_none());
                assert!(matches!(other, SpatialOperand::Value(GmlValue::Envelope(_))));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_dwithin() {
        let parsed = op(
            r#"<fes:DWithin>
                 <fes:ValueReference>location</fes:ValueReference>
                 <gml:Point srsName="urn:ogc:def:crs:OGC::CRS84"><gml:pos>4.9 52.4</gml:pos></gml:Point>
                 <fes:Distance uom="m">100</fes:Distance>
               </fes:DWithin>"#,
        )
        .unwrap();
        match parsed {
            NonIdOperator::Distance { op, distance, .. } => {
                assert_eq!(op, DistanceOpName::DWithin);
                assert_eq!(distance.value, 100.0);
                assert_eq!(distance.uom, "m");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn and_requires_two_children() {
        assert!(op(
            "<fes:And>
               <fes:PropertyIsNull><fes:ValueReference>name</fes:ValueReference></fes:PropertyIsNull>
             </fes:And>"
        )
        .is_err());
    }

    #[test]
    fn nested_logic_parses() {
        let parsed = op(
            "<fes:Not>
               <fes:PropertyIsNil><fes:ValueReference>name</fes:ValueReference></fes:PropertyIsNil>
             </fes:Not>",
        )
        .unwrap();
        assert!(matches!(parsed, NonIdOperator::Not(_)));
    }

    #[test]
    fn temporal_operators_parse_as_stub() {
        let parsed = op(
            "<fes:After>
               <fes:ValueReference>created</fes:ValueReference>
               <fes:Literal>2020-01-01T00:00:00Z</fes:Literal>
             </fes:After>",
        )
        .unwrap();
        assert_eq!(parsed, NonIdOperator::Temporal { op: "After".into() });
    }

    #[test]
    fn unknown_operator_fails_with_tag_in_locator() {
        let err = op("<fes:SomethingWeird/>").unwrap_err();
        assert_eq!(err.locator.as_deref(), Some("SomethingWeird"));
    }
}
