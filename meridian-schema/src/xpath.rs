//! XPath resolution against the schema graph.
//!
//! WFS/FES requests reference elements with a limited XPath dialect:
//! `local`, `app:local`, `parent/child/grandchild`, the attribute axis
//! (`@gml:id`), root descent via the feature's own element name, and
//! `[predicate]` suffixes (which are stripped for resolution).

use crate::arena::{NodeId, NodeKind};
use crate::feature_type::FeatureType;
use meridian_core::error::{Result, WfsError};
use std::collections::HashMap;

const GML32_NS: &str = "http://www.opengis.net/gml/3.2";

/// The result of resolving an XPath: the node chain from the feature root,
/// the absolute data-source path, and the final matched node.
#[derive(Debug, Clone)]
pub struct XPathMatch {
    pub nodes: Vec<NodeId>,
    /// Absolute dotted data-source path of the matched node.
    pub path: String,
    pub child: NodeId,
    /// Whether the chain crosses an unbounded element.
    pub is_many: bool,
}

impl FeatureType {
    /// Resolve an XPath expression to a node in this feature's schema graph.
    ///
    /// `ns_aliases` holds the prefix→uri mapping in scope at the place the
    /// expression appeared. An undeclared `app:` prefix is accepted for
    /// compatibility with clients that never declare it.
    pub fn resolve_element(
        &self,
        xpath: &str,
        ns_aliases: Option<&HashMap<String, String>>,
    ) -> Result<XPathMatch> {
        let fail = || {
            WfsError::invalid_parameter(
                format!("Field '{xpath}' does not exist."),
                xpath.to_string(),
            )
        };

        let trimmed = xpath.trim();
        if trimmed.is_empty() {
            return Err(fail());
        }
        let mut segments: Vec<&str> = trimmed.trim_start_matches('/').split('/').collect();

        // Root descent: "restaurant/name" or "app:restaurant/name".
        if segments.len() > 1 {
            let (_, first_local, _) = split_segment(segments[0]);
            if first_local == self.name {
                segments.remove(0);
            }
        }

        let mut nodes: Vec<NodeId> = Vec::with_capacity(segments.len());
        let mut current_complex = Some(self.root_type);
        let mut is_many = false;

        for (i, segment) in segments.iter().enumerate() {
            let last = i == segments.len() - 1;
            let (prefix, local, is_attr) = split_segment(segment);
            self.check_prefix(prefix, ns_aliases, xpath)?;

            let complex = current_complex.ok_or_else(fail)?;

            let node_id = if is_attr || prefix == Some("gml") {
                self.resolve_special(prefix, local, is_attr, complex).ok_or_else(fail)?
            } else {
                *self
                    .arena
                    .complex(complex)
                    .elements
                    .iter()
                    .find(|id| self.arena.node(**id).name == local)
                    .ok_or_else(fail)?
            };

            let node = self.arena.node(node_id);
            is_many = is_many || node.is_many();
            nodes.push(node_id);

            if last {
                let path = node.source_path.clone().ok_or_else(fail)?;
                return Ok(XPathMatch {
                    nodes,
                    path,
                    child: node_id,
                    is_many,
                });
            }
            current_complex = node.complex_id();
        }

        Err(fail())
    }

    fn resolve_special(
        &self,
        prefix: Option<&str>,
        local: &str,
        is_attr: bool,
        complex: crate::arena::ComplexId,
    ) -> Option<NodeId> {
        if is_attr {
            // Only gml:id is resolvable on the attribute axis.
            if local == "id" && complex == self.root_type {
                return Some(self.id_node);
            }
            return self
                .arena
                .complex(complex)
                .attributes
                .iter()
                .copied()
                .find(|id| self.arena.node(*id).name == local);
        }
        if prefix == Some("gml") {
            return self
                .arena
                .complex(complex)
                .elements
                .iter()
                .copied()
                .find(|id| {
                    let node = self.arena.node(*id);
                    node.name == local
                        && matches!(node.kind, NodeKind::GmlName | NodeKind::GmlBoundedBy)
                });
        }
        None
    }

    /// Validate a namespace prefix against the declared aliases.
    ///
    /// A declared prefix must map onto the application or GML namespace.
    /// Undeclared prefixes are stripped and accepted: clients routinely
    /// send `app:` without ever declaring it.
    fn check_prefix(
        &self,
        prefix: Option<&str>,
        ns_aliases: Option<&HashMap<String, String>>,
        xpath: &str,
    ) -> Result<()> {
        let Some(prefix) = prefix else {
            return Ok(());
        };
        if let Some(uri) = ns_aliases.and_then(|aliases| aliases.get(prefix)) {
            if uri == &self.xml_namespace || uri == GML32_NS {
                return Ok(());
            }
            return Err(WfsError::invalid_parameter(
                format!("Field '{xpath}' does not exist."),
                xpath.to_string(),
            ));
        }
        Ok(())
    }
}

/// Split one path segment into (prefix, local, is_attribute),
/// stripping `[predicate]` suffixes.
fn split_segment(segment: &str) -> (Option<&str>, &str, bool) {
    let mut rest = segment.trim();
    let is_attr = rest.starts_with('@');
    if is_attr {
        rest = &rest[1..];
    }
    if let Some(pos) = rest.find('[') {
        rest = &rest[..pos];
    }
    match rest.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local, is_attr),
        None => (None, rest, is_attr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::XsdType;
    use meridian_core::GeometryType;

    fn sample() -> FeatureType {
        FeatureType::build("restaurant", "http://example.org/gisserver")
            .geometry("location", GeometryType::Point)
            .field("name", XsdType::String)
            .field("rating", XsdType::Double)
            .complex("city", false, |c| {
                c.field("name", XsdType::String).field("region", XsdType::String)
            })
            .finish()
            .unwrap()
    }

    #[test]
    fn resolves_every_supported_form() {
        let ft = sample();
        for xpath in [
            "name",
            "app:name",
            "restaurant/name",
            "app:restaurant/app:name",
        ] {
            let m = ft.resolve_element(xpath, None).unwrap_or_else(|e| {
                panic!("'{xpath}' should resolve: {e}");
            });
            assert_eq!(m.path, "name", "for {xpath}");
        }
    }

    #[test]
    fn resolves_dotted_relation_path() {
        let ft = sample();
        let m = ft.resolve_element("city/region", None).unwrap();
        assert_eq!(m.path, "city.region");
        assert_eq!(m.nodes.len(), 2);
    }

    #[test]
    fn resolves_attribute_axis() {
        let ft = sample();
        let m = ft.resolve_element("@gml:id", None).unwrap();
        assert_eq!(m.child, ft.id_node);
    }

    #[test]
    fn strips_predicates() {
        let ft = sample();
        let m = ft.resolve_element("city[1]/name", None).unwrap();
        assert_eq!(m.path, "city.name");
    }

    #[test]
    fn honors_declared_namespaces() {
        let ft = sample();
        let mut aliases = HashMap::new();
        aliases.insert("ns0".to_string(), "http://example.org/gisserver".to_string());
        assert!(ft.resolve_element("ns0:name", Some(&aliases)).is_ok());

        let mut wrong = HashMap::new();
        wrong.insert("ns0".to_string(), "http://other.example".to_string());
        assert!(ft.resolve_element("ns0:name", Some(&wrong)).is_err());
    }

    #[test]
    fn unresolvable_paths_carry_the_expression_as_locator() {
        let ft = sample();
        let err = ft.resolve_element("unknown_field", None).unwrap_err();
        assert_eq!(err.locator.as_deref(), Some("unknown_field"));
    }

    #[test]
    fn scalar_cannot_have_children() {
        let ft = sample();
        assert!(ft.resolve_element("name/sub", None).is_err());
    }
}
