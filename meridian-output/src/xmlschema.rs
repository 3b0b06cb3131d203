//! DescribeFeatureType: render the XSD for the requested feature types.

use crate::utils::xml_escape;
use meridian_schema::{FeatureType, Occurs, XsdNode, XsdType};
use std::sync::Arc;

/// Content type mandated by WFS for schema output.
pub const CONTENT_TYPE: &str = "application/gml+xml; version=3.2";

/// Render the `xs:schema` document describing the given feature types.
/// All types share one application namespace.
pub fn render_schema(feature_types: &[Arc<FeatureType>], app_namespace: &str) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<xs:schema xmlns:xs=\"http://www.w3.org/2001/XMLSchema\"\n\
         \u{20}\u{20}\u{20}xmlns:gml=\"http://www.opengis.net/gml/3.2\"\n\
         \u{20}\u{20}\u{20}xmlns:app=\"{ns}\"\n\
         \u{20}\u{20}\u{20}targetNamespace=\"{ns}\"\n\
         \u{20}\u{20}\u{20}elementFormDefault=\"qualified\" version=\"0.1\">\n",
        ns = xml_escape(app_namespace)
    ));
    out.push_str(
        "  <xs:import namespace=\"http://www.opengis.net/gml/3.2\" \
         schemaLocation=\"http://schemas.opengis.net/gml/3.2.1/gml.xsd\"/>\n",
    );

    for feature_type in feature_types {
        out.push_str(&format!(
            "  <xs:element name=\"{name}\" type=\"app:{type_name}\" \
             substitutionGroup=\"gml:AbstractFeature\"/>\n",
            name = xml_escape(&feature_type.name),
            type_name = complex_name(feature_type, feature_type.root_type),
        ));
    }

    for feature_type in feature_types {
        for (complex_id, complex) in feature_type.arena.complex_types() {
            let is_root = complex_id == feature_type.root_type;
            out.push_str(&format!(
                "  <xs:complexType name=\"{}\">\n",
                xml_escape(&complex.name)
            ));
            if is_root {
                out.push_str(
                    "    <xs:complexContent>\n\
                     \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<xs:extension base=\"gml:AbstractFeatureType\">\n",
                );
            }
            let indent = if is_root { "        " } else { "    " };
            out.push_str(&format!("{indent}<xs:sequence>\n"));
            for element_id in &complex.elements {
                let node = feature_type.node(*element_id);
                // gml:name / gml:boundedBy come with the AbstractFeature base.
                if node.prefix == "gml" {
                    continue;
                }
                out.push_str(&format!("{indent}  {}\n", element_decl(feature_type, node)));
            }
            out.push_str(&format!("{indent}</xs:sequence>\n"));
            if is_root {
                out.push_str("      </xs:extension>\n    </xs:complexContent>\n");
            }
            out.push_str("  </xs:complexType>\n");
        }
    }

    out.push_str("</xs:schema>\n");
    out
}

fn complex_name(feature_type: &FeatureType, complex_id: meridian_schema::ComplexId) -> String {
    feature_type.arena.complex(complex_id).name.clone()
}

fn element_decl(feature_type: &FeatureType, node: &XsdNode) -> String {
    let type_name = match node.complex_id() {
        Some(complex_id) => format!("app:{}", complex_name(feature_type, complex_id)),
        None => node
            .atomic_type()
            .unwrap_or(XsdType::AnyType)
            .qname()
            .to_string(),
    };
    let mut attrs = format!(
        "name=\"{}\" type=\"{}\"",
        xml_escape(&node.name),
        xml_escape(&type_name)
    );
    attrs.push_str(&format!(" minOccurs=\"{}\"", node.min_occurs));
    match node.max_occurs {
        Occurs::Unbounded => attrs.push_str(" maxOccurs=\"unbounded\""),
        Occurs::Bounded(1) => {}
        Occurs::Bounded(n) => attrs.push_str(&format!(" maxOccurs=\"{n}\"")),
    }
    if node.nillable {
        attrs.push_str(" nillable=\"true\"");
    }
    format!("<xs:element {attrs}/>")
}
