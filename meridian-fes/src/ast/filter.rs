//! The `<fes:Filter>` element and its KVP lowering.

use crate::ast::expr::Expression;
use crate::ast::identifiers::ResourceId;
use crate::ast::ops::{NonIdOperator, SpatialOpName, SpatialOperand};
use crate::gml::GmlValue;
use crate::kvp::KvpRequest;
use crate::xml::{parse_filter_source, XmlElement};
use crate::xmlns;
use meridian_core::error::{Result, WfsError};
use meridian_core::BoundingBox;

/// The query language this server implements for FILTER values.
pub const QUERY_LANGUAGE: &str = "urn:ogc:def:queryLanguage:OGC-FES:Filter";

/// A filter has a single predicate, or a chain of resource ids.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterPredicate {
    Operator(NonIdOperator),
    /// A bare `<fes:Function>` used as predicate is allowed by the spec.
    Function { name: String, args: Vec<Expression> },
    Ids(Vec<ResourceId>),
}

/// The `<fes:Filter>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub predicate: FilterPredicate,
}

impl Filter {
    pub fn from_xml(element: &XmlElement) -> Result<Filter> {
        element.expect_tag(xmlns::FES, "Filter")?;
        element.expect_children(1)?;

        let first = &element.children[0];
        if element.children.len() > 1 || first.is(xmlns::FES, "ResourceId") {
            // fes:ResourceId is the only element that may appear multiple
            // times directly below <fes:Filter>.
            let ids = element
                .children
                .iter()
                .map(ResourceId::from_xml)
                .collect::<Result<Vec<_>>>()?;
            return Ok(Filter {
                predicate: FilterPredicate::Ids(ids),
            });
        }

        if first.is(xmlns::FES, "Function") {
            let name = first.require_attr("name")?.to_string();
            let args = first
                .children
                .iter()
                .map(Expression::from_element)
                .collect::<Result<Vec<_>>>()?;
            return Ok(Filter {
                predicate: FilterPredicate::Function { name, args },
            });
        }

        Ok(Filter {
            predicate: FilterPredicate::Operator(NonIdOperator::from_element(first)?),
        })
    }

    /// Parse a raw `<fes:Filter>` string (the KVP FILTER value).
    pub fn from_string(
        source: &str,
        ns_aliases: Option<&std::collections::HashMap<String, String>>,
    ) -> Result<Filter> {
        let element = parse_filter_source(source, ns_aliases)?;
        Filter::from_xml(&element)
    }

    /// Assemble the selection clause from the KVP parameters.
    ///
    /// FILTER, BBOX and RESOURCEID are mutually exclusive; the latter two
    /// lower onto the filter AST so downstream code has one code path.
    pub fn from_kvp(kvp: &KvpRequest) -> Result<Option<Filter>> {
        if let Some(language) = kvp.get_opt("FILTER_LANGUAGE", None) {
            if language != QUERY_LANGUAGE {
                return Err(WfsError::invalid_parameter(
                    format!("Invalid value for filterLanguage: {language}"),
                    "filterLanguage",
                ));
            }
        }

        let filter = kvp.get_parsed("FILTER", None, |raw| {
            Filter::from_string(raw, Some(&kvp.ns_aliases))
        })?;
        let bbox = kvp.get_parsed("BBOX", None, BoundingBox::from_string)?;
        let resource_ids: Vec<ResourceId> = kvp
            .get_list("RESOURCEID", None)
            .map(|rids| rids.into_iter().map(ResourceId::new).collect())
            .unwrap_or_default();

        // Make sure the query options are not mixed.
        if filter.is_some() && (bbox.is_some() || !resource_ids.is_empty()) {
            return Err(WfsError::invalid_parameter(
                "The FILTER parameter is mutually exclusive with BBOX and RESOURCEID",
                "filter",
            ));
        }
        if !resource_ids.is_empty() && bbox.is_some() {
            return Err(WfsError::invalid_parameter(
                "The RESOURCEID parameter is mutually exclusive with BBOX and FILTER",
                "resourceId",
            ));
        }

        if let Some(filter) = filter {
            return Ok(Some(filter));
        }
        if !resource_ids.is_empty() {
            return Ok(Some(Filter {
                predicate: FilterPredicate::Ids(resource_ids),
            }));
        }
        if let Some(bbox) = bbox {
            return Ok(Some(Filter {
                predicate: FilterPredicate::Operator(NonIdOperator::Spatial {
                    op: SpatialOpName::Bbox,
                    operand: None,
                    other: SpatialOperand::Value(GmlValue::Envelope(bbox)),
                }),
            }));
        }
        Ok(None)
    }

    /// The type names referenced by resource-id predicates, when this is
    /// an id filter. Ids without a type produce `None` entries.
    pub fn resource_id_types(&self) -> Option<Vec<Option<&str>>> {
        match &self.predicate {
            FilterPredicate::Ids(ids) => {
                Some(ids.iter().map(|id| id.type_name.as_deref()).collect())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn kvp(query: &str) -> KvpRequest {
        KvpRequest::from_query_string(query, &HashMap::new()).unwrap()
    }

    #[test]
    fn filter_without_namespace_parses() {
        let filter = Filter::from_string(
            "<Filter><PropertyIsEqualTo><ValueReference>name</ValueReference><Literal>x</Literal></PropertyIsEqualTo></Filter>",
            None,
        )
        .unwrap();
        assert!(matches!(filter.predicate, FilterPredicate::Operator(_)));
    }

    #[test]
    fn multiple_resource_ids_group() {
        let filter = Filter::from_string(
            r#"<Filter><ResourceId rid="restaurant.1"/><ResourceId rid="restaurant.2"/></Filter>"#,
            None,
        )
        .unwrap();
        match &filter.predicate {
            FilterPredicate::Ids(ids) => assert_eq!(ids.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn kvp_bbox_lowers_to_spatial_predicate() {
        let filter = Filter::from_kvp(&kvp("BBOX=4.58,52.03,5.31,52.49")).unwrap().unwrap();
        match filter.predicate {
            FilterPredicate::Operator(NonIdOperator::Spatial { op, operand, .. }) => {
                assert_eq!(op, SpatialOpName::Bbox);
                assert!(operand.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn kvp_resourceid_lowers_to_id_filter() {
        let filter = Filter::from_kvp(&kvp("RESOURCEID=restaurant.1,restaurant.5"))
            .unwrap()
            .unwrap();
        assert_eq!(
            filter.resource_id_types(),
            Some(vec![Some("restaurant"), Some("restaurant")])
        );
    }

    #[test]
    fn bbox_and_filter_are_mutually_exclusive() {
        let err = Filter::from_kvp(&kvp(
            "BBOX=1,2,3,4&FILTER=%3CFilter%3E%3CResourceId%20rid%3D%22a.1%22/%3E%3C/Filter%3E",
        ))
        .unwrap_err();
        assert_eq!(err.locator.as_deref(), Some("filter"));
    }

    #[test]
    fn filter_language_must_be_fes() {
        let err = Filter::from_kvp(&kvp("FILTER_LANGUAGE=urn:other")).unwrap_err();
        assert_eq!(err.locator.as_deref(), Some("filterLanguage"));
    }

    #[test]
    fn empty_kvp_means_no_filter() {
        assert!(Filter::from_kvp(&kvp("COUNT=5")).unwrap().is_none());
    }
}
