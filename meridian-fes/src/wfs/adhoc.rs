//! The ad-hoc query expression: `<wfs:Query>` and its KVP parameters.
//!
//! This represents all dynamic queries received as request parameters
//! ("adhoc"), such as FILTER and BBOX from an HTTP GET. The KVP caller is
//! expected to have split parenthesized parameter groups already; one
//! `AdhocQuery` handles a single group.

use crate::ast::expr::ValueReference;
use crate::ast::filter::Filter;
use crate::ast::sort::SortBy;
use crate::kvp::KvpRequest;
use crate::xml::XmlElement;
use crate::xmlns;
use meridian_core::crs::Crs;
use meridian_core::error::{Result, WfsError};

/// The parsed `<wfs:Query>` element / KVP group.
#[derive(Debug, Clone, PartialEq)]
pub struct AdhocQuery {
    /// Qualified type names. More than one means a join (not supported).
    pub type_names: Vec<String>,
    /// For XML POST requests this handle is echoed in exceptions.
    pub handle: String,
    /// The CRS to render geometries in.
    pub srs_name: Option<Crs>,
    /// Projection clause; `None` renders all known fields.
    pub property_names: Option<Vec<ValueReference>>,
    pub filter: Option<Filter>,
    pub sort_by: Option<SortBy>,
}

impl AdhocQuery {
    /// Parse the XML `<wfs:Query>` element.
    pub fn from_xml(element: &XmlElement) -> Result<AdhocQuery> {
        element.expect_tag(xmlns::WFS, "Query")?;
        let type_names: Vec<String> = element
            .require_attr("typeNames")?
            .split_whitespace()
            .map(|qname| element.parse_qname(qname))
            .collect();
        if element.attr("aliases").is_some() {
            return Err(WfsError::operation_not_supported("Join queries are not supported")
                .locator("aliases"));
        }

        let srs_name = element
            .attr("srsName")
            .map(Crs::from_string)
            .transpose()?;

        let mut property_names = Vec::new();
        let mut filter = None;
        let mut sort_by = None;
        for child in &element.children {
            if child.is(xmlns::WFS, "PropertyName") {
                child.expect_no_children()?;
                property_names.push(ValueReference::new(
                    child.text.trim(),
                    child.ns_aliases.clone(),
                ));
            } else if child.is(xmlns::FES, "Filter") {
                filter = Some(Filter::from_xml(child)?);
            } else if child.is(xmlns::FES, "SortBy") {
                sort_by = Some(SortBy::from_xml(child)?);
            } else {
                return Err(WfsError::parsing_failed(
                    format!("Unexpected element <{}> in <wfs:Query>", child.local),
                    child.local.clone(),
                ));
            }
        }

        let query = AdhocQuery {
            type_names,
            handle: element.attr("handle").unwrap_or("").to_string(),
            srs_name,
            property_names: if property_names.is_empty() {
                None
            } else {
                Some(property_names)
            },
            filter,
            sort_by,
        };
        query.validate()
    }

    /// Build from a (group-split) KVP request.
    pub fn from_kvp(kvp: &KvpRequest) -> Result<AdhocQuery> {
        let type_names: Vec<String> = kvp
            .get_list("TYPENAMES", Some("TYPENAME"))
            .map(|names| names.iter().map(|n| kvp.parse_qname(n)).collect())
            .unwrap_or_default();

        // KVP requests may omit the type names when RESOURCEID is given.
        if type_names.is_empty() && !kvp.contains("RESOURCEID") {
            return Err(WfsError::missing_parameter("typeNames"));
        }
        if kvp.get_opt("ALIASES", None).is_some() {
            return Err(WfsError::operation_not_supported("Join queries are not supported")
                .locator("aliases"));
        }

        let srs_name = kvp.get_parsed("SRSNAME", None, Crs::from_string)?;
        let filter = Filter::from_kvp(kvp)?;
        let sort_by = SortBy::from_kvp(kvp)?;

        // WFS 1.x syntax of PROPERTYNAME=* means "everything".
        let property_names = match kvp.get_list("PROPERTYNAME", None) {
            Some(names) if names != ["*"] => Some(
                names
                    .into_iter()
                    .map(|name| ValueReference::new(name, kvp.ns_aliases.clone()))
                    .collect(),
            ),
            _ => None,
        };

        let query = AdhocQuery {
            type_names,
            handle: String::new(),
            srs_name,
            property_names,
            filter,
            sort_by,
        };
        query.validate()
    }

    fn validate(self) -> Result<AdhocQuery> {
        if self.type_names.len() > 1 {
            return Err(WfsError::operation_not_supported("Join queries are not supported")
                .locator("typeNames"));
        }
        Ok(self)
    }

    /// Which type names this query touches; falls back to the types named
    /// by resource-id predicates.
    pub fn effective_type_names(&self) -> Vec<String> {
        if !self.type_names.is_empty() {
            return self.type_names.clone();
        }
        self.filter
            .as_ref()
            .and_then(|f| f.resource_id_types())
            .map(|types| {
                let mut names: Vec<String> = types
                    .into_iter()
                    .flatten()
                    .map(str::to_string)
                    .collect();
                names.dedup();
                names
            })
            .unwrap_or_default()
    }

    /// The locator to blame when this query fails.
    pub fn query_locator(&self) -> &'static str {
        match &self.filter {
            Some(filter) if filter.resource_id_types().is_some() => "resourceId",
            _ => "filter",
        }
    }

    /// Regenerate KVP parameters for pagination links. Filters are not
    /// translated back (mapserver doesn't either); callers preserve the
    /// original query string instead.
    pub fn as_kvp(&self) -> Vec<(String, String)> {
        let mut params = vec![("TYPENAMES".to_string(), self.type_names.join(","))];
        if let Some(srs) = &self.srs_name {
            params.push(("SRSNAME".to_string(), srs.to_string()));
        }
        if let Some(sort_by) = &self.sort_by {
            params.push(("SORTBY".to_string(), sort_by.as_kvp()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_xml_document;
    use std::collections::HashMap;

    fn app_aliases() -> HashMap<String, String> {
        HashMap::from([("app".to_string(), "http://example.org/gisserver".to_string())])
    }

    #[test]
    fn kvp_and_xml_forms_agree() {
        let kvp = KvpRequest::from_query_string(
            "TYPENAMES=app:restaurant&SRSNAME=urn:ogc:def:crs:EPSG::4326&SORTBY=name",
            &app_aliases(),
        )
        .unwrap();
        let from_kvp = AdhocQuery::from_kvp(&kvp).unwrap();

        let doc = parse_xml_document(
            r#"<wfs:Query xmlns:wfs="http://www.opengis.net/wfs/2.0"
                          xmlns:fes="http://www.opengis.net/fes/2.0"
                          xmlns:app="http://example.org/gisserver"
                          typeNames="app:restaurant" srsName="urn:ogc:def:crs:EPSG::4326">
                 <fes:SortBy>
                   <fes:SortProperty><fes:ValueReference>name</fes:ValueReference></fes:SortProperty>
                 </fes:SortBy>
               </wfs:Query>"#,
            None,
        )
        .unwrap();
        let from_xml = AdhocQuery::from_xml(&doc).unwrap();

        assert_eq!(from_kvp.type_names, from_xml.type_names);
        assert_eq!(from_kvp.sort_by, from_xml.sort_by);
        assert_eq!(from_kvp.srs_name, from_xml.srs_name);
    }

    #[test]
    fn typenames_required_without_resourceid() {
        let kvp = KvpRequest::from_query_string("COUNT=5", &app_aliases()).unwrap();
        let err = AdhocQuery::from_kvp(&kvp).unwrap_err();
        assert_eq!(err.code.as_str(), "MissingParameterValue");
    }

    #[test]
    fn resourceid_replaces_typenames() {
        let kvp =
            KvpRequest::from_query_string("RESOURCEID=restaurant.3", &app_aliases()).unwrap();
        let query = AdhocQuery::from_kvp(&kvp).unwrap();
        assert_eq!(query.effective_type_names(), vec!["restaurant"]);
        assert_eq!(query.query_locator(), "resourceId");
    }

    #[test]
    fn join_queries_are_rejected() {
        let kvp = KvpRequest::from_query_string("TYPENAMES=a,b", &app_aliases()).unwrap();
        let err = AdhocQuery::from_kvp(&kvp).unwrap_err();
        assert_eq!(err.code.as_str(), "OperationNotSupported");
    }

    #[test]
    fn propertyname_star_means_all() {
        let kvp = KvpRequest::from_query_string(
            "TYPENAMES=app:restaurant&PROPERTYNAME=*",
            &app_aliases(),
        )
        .unwrap();
        assert!(AdhocQuery::from_kvp(&kvp).unwrap().property_names.is_none());
    }
}
