//! FES 2.0 expressions.
//!
//! The spec defines `ValueReference`, `Literal` and `Function`. The FES 1.0
//! arithmetic tags (`<fes:Add>` etc.) are no longer part of FES 2.0, but
//! clients like QGIS still assume servers accept them, so they parse too.

use crate::gml::{is_gml_element, parse_gml_node, GmlValue};
use crate::xml::XmlElement;
use crate::xmlns;
use meridian_core::error::{Result, WfsError};
use std::collections::HashMap;

/// `<fes:ValueReference>`: an XPath pointing at a schema element.
///
/// The FES 1.0 tag `<PropertyName>` is accepted as an alias; various
/// clients still send it and mapserver/geoserver support it.
#[derive(Debug, Clone)]
pub struct ValueReference {
    pub xpath: String,
    /// Namespace aliases in scope where the reference appeared.
    pub ns_aliases: HashMap<String, String>,
}

impl PartialEq for ValueReference {
    fn eq(&self, other: &Self) -> bool {
        // The alias map is parse-context, not identity.
        self.xpath == other.xpath
    }
}

impl ValueReference {
    pub fn new(xpath: impl Into<String>, ns_aliases: HashMap<String, String>) -> Self {
        ValueReference {
            xpath: xpath.into(),
            ns_aliases,
        }
    }

    pub fn from_xml(element: &XmlElement) -> Result<ValueReference> {
        if !element.is(xmlns::FES, "ValueReference") && !element.is(xmlns::FES, "PropertyName") {
            return Err(WfsError::parsing_failed(
                format!("Expected <ValueReference> element, got <{}>", element.local),
                element.local.clone(),
            ));
        }
        element.expect_no_children()?;
        let xpath = element.text.trim();
        if xpath.is_empty() {
            return Err(WfsError::parsing_failed(
                "Empty <ValueReference> element",
                element.local.clone(),
            ));
        }
        Ok(ValueReference::new(xpath, element.ns_aliases.clone()))
    }
}

impl std::fmt::Display for ValueReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.xpath)
    }
}

/// The raw content of a `<fes:Literal>`.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Plain text, possibly empty.
    Text(String),
    /// A nested GML geometry or envelope.
    Gml(GmlValue),
}

/// `<fes:Literal>`, optionally annotated with a `type="xs:…"` QName.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: LiteralValue,
    /// The declared type, resolved to `{uri}local` notation.
    pub declared_type: Option<String>,
}

impl Literal {
    pub fn text(value: impl Into<String>) -> Self {
        Literal {
            value: LiteralValue::Text(value.into()),
            declared_type: None,
        }
    }

    pub fn from_xml(element: &XmlElement) -> Result<Literal> {
        element.expect_tag(xmlns::FES, "Literal")?;
        let value = match element.children.len() {
            0 => LiteralValue::Text(element.text.trim().to_string()),
            1 if is_gml_element(&element.children[0]) => {
                LiteralValue::Gml(parse_gml_node(&element.children[0])?)
            }
            _ => {
                return Err(WfsError::parsing_failed(
                    format!(
                        "Unsupported child element for <Literal> element: {}.",
                        element.children[0].local
                    ),
                    "Literal",
                ))
            }
        };
        Ok(Literal {
            value,
            declared_type: element.attr("type").map(|t| element.parse_qname(t)),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            LiteralValue::Text(s) => Some(s),
            LiteralValue::Gml(_) => None,
        }
    }
}

/// FES 1.0 arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    fn from_tag(local: &str) -> Option<ArithmeticOp> {
        match local {
            "Add" => Some(ArithmeticOp::Add),
            "Sub" => Some(ArithmeticOp::Sub),
            "Mul" => Some(ArithmeticOp::Mul),
            "Div" => Some(ArithmeticOp::Div),
            _ => None,
        }
    }
}

/// Any FES expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    ValueReference(ValueReference),
    Literal(Literal),
    Function {
        name: String,
        args: Vec<Expression>,
    },
    Arithmetic {
        op: ArithmeticOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
}

impl Expression {
    /// Dispatch an expression child by its tag name.
    pub fn from_element(element: &XmlElement) -> Result<Expression> {
        if element.ns.as_deref() != Some(xmlns::FES) {
            return Err(unexpected_expression(element));
        }
        match element.local.as_str() {
            "ValueReference" | "PropertyName" => {
                ValueReference::from_xml(element).map(Expression::ValueReference)
            }
            "Literal" => Literal::from_xml(element).map(Expression::Literal),
            "Function" => {
                let name = element.require_attr("name")?.to_string();
                let args = element
                    .children
                    .iter()
                    .map(Expression::from_element)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expression::Function { name, args })
            }
            other => match ArithmeticOp::from_tag(other) {
                Some(op) => {
                    element.expect_children(2)?;
                    Ok(Expression::Arithmetic {
                        op,
                        lhs: Box::new(Expression::from_element(&element.children[0])?),
                        rhs: Box::new(Expression::from_element(&element.children[1])?),
                    })
                }
                None => Err(unexpected_expression(element)),
            },
        }
    }

    pub fn value_reference(xpath: &str) -> Expression {
        Expression::ValueReference(ValueReference::new(xpath, HashMap::new()))
    }

    pub fn literal(text: &str) -> Expression {
        Expression::Literal(Literal::text(text))
    }
}

fn unexpected_expression(element: &XmlElement) -> WfsError {
    WfsError::parsing_failed(
        format!("Unexpected expression element <{}>", element.local),
        element.local.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_xml_document;

    fn fes(body: &str) -> XmlElement {
        parse_xml_document(
            &format!(
                r#"<root xmlns:fes="http://www.opengis.net/fes/2.0"
                        xmlns:gml="http://www.opengis.net/gml/3.2">{body}</root>"#
            ),
            None,
        )
        .unwrap()
        .children
        .remove(0)
    }

    #[test]
    fn parses_value_reference() {
        let expr = Expression::from_element(&fes("<fes:ValueReference>app:name</fes:ValueReference>")).unwrap();
        assert_eq!(expr, Expression::value_reference("app:name"));
    }

    #[test]
    fn accepts_fes1_property_name() {
        let expr = Expression::from_element(&fes("<fes:PropertyName>name</fes:PropertyName>")).unwrap();
        assert_eq!(expr, Expression::value_reference("name"));
    }

    #[test]
    fn value_reference_rejects_children() {
        let el = fes("<fes:ValueReference><fes:Literal>x</fes:Literal></fes:ValueReference>");
        assert!(Expression::from_element(&el).is_err());
    }

    #[test]
    fn literal_with_declared_type() {
        let expr = Expression::from_element(&fes(
            r#"<fes:Literal xmlns:xs="http://www.w3.org/2001/XMLSchema" type="xs:boolean">true</fes:Literal>"#,
        ))
        .unwrap();
        match expr {
            Expression::Literal(lit) => {
                assert_eq!(lit.as_text(), Some("true"));
                assert_eq!(
                    lit.declared_type.as_deref(),
                    Some("{http://www.w3.org/2001/XMLSchema}boolean")
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn literal_with_gml_envelope() {
        let expr = Expression::from_element(&fes(
            r#"<fes:Literal>
                 <gml:Envelope srsName="urn:ogc:def:crs:EPSG::4326">
                   <gml:lowerCorner>53.1 5.7</gml:lowerCorner>
                   <gml:upperCorner>53.5 6.1</gml:upperCorner>
                 </gml:Envelope>
               </fes:Literal>"#,
        ))
        .unwrap();
        match expr {
            Expression::Literal(Literal {
                value: LiteralValue::Gml(GmlValue::Envelope(bbox)),
                ..
            }) => {
                // Swapped into x/y on parse.
                assert_eq!(bbox.min_x, 5.7);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn arithmetic_tags_parse() {
        let expr = Expression::from_element(&fes(
            "<fes:Add><fes:ValueReference>rating</fes:ValueReference><fes:Literal>2</fes:Literal></fes:Add>",
        ))
        .unwrap();
        match expr {
            Expression::Arithmetic { op, .. } => assert_eq!(op, ArithmeticOp::Add),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn function_requires_name() {
        let el = fes("<fes:Function><fes:Literal>1</fes:Literal></fes:Function>");
        assert!(Expression::from_element(&el).is_err());
    }

    #[test]
    fn unknown_tag_names_the_tag() {
        let el = fes("<fes:Frobnicate/>");
        let err = Expression::from_element(&el).unwrap_err();
        assert_eq!(err.locator.as_deref(), Some("Frobnicate"));
    }
}
