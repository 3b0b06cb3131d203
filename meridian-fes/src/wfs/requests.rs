//! Top-level WFS 2.0 request types, parsed from KVP or XML.

use crate::ast::expr::ValueReference;
use crate::kvp::KvpRequest;
use crate::wfs::adhoc::AdhocQuery;
use crate::xml::XmlElement;
use crate::xmlns;
use meridian_core::error::{Result, WfsError};
use std::collections::HashMap;

/// Protocol versions this server accepts. 2.0.0 is canonical; the 1.x
/// values are accepted on input for old clients.
pub const ACCEPT_VERSIONS: &[&str] = &["2.0.0"];
const KNOWN_VERSIONS: &[&str] = &["2.0.0", "1.1.0", "1.0.0"];

/// `RESULTTYPE=`: full results, or only the count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultType {
    #[default]
    Results,
    Hits,
}

impl ResultType {
    fn from_string(value: &str) -> Result<ResultType> {
        match value.to_ascii_uppercase().as_str() {
            "RESULTS" => Ok(ResultType::Results),
            "HITS" => Ok(ResultType::Hits),
            _ => Err(WfsError::invalid_parameter(
                format!("Invalid RESULTTYPE value: {value}"),
                "resultType",
            )),
        }
    }
}

/// A query inside GetFeature / GetPropertyValue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpression {
    Adhoc(AdhocQuery),
    Stored(StoredQueryInvocation),
}

/// An invocation of a registered stored query.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredQueryInvocation {
    pub id: String,
    /// Parameter name (uppercased) → raw value.
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetCapabilities {
    /// Negotiated protocol version.
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DescribeFeatureType {
    /// Empty means all registered types.
    pub type_names: Vec<String>,
    pub output_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetFeature {
    pub queries: Vec<QueryExpression>,
    pub result_type: ResultType,
    pub start_index: u64,
    pub count: Option<u64>,
    pub output_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetPropertyValue {
    pub query: QueryExpression,
    pub value_reference: ValueReference,
    pub result_type: ResultType,
    pub start_index: u64,
    pub count: Option<u64>,
    pub output_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DescribeStoredQueries {
    /// Empty means all registered stored queries.
    pub stored_query_ids: Vec<String>,
}

/// Any parsed top-level request.
#[derive(Debug, Clone, PartialEq)]
pub enum WfsRequest {
    GetCapabilities(GetCapabilities),
    DescribeFeatureType(DescribeFeatureType),
    GetFeature(GetFeature),
    GetPropertyValue(GetPropertyValue),
    ListStoredQueries,
    DescribeStoredQueries(DescribeStoredQueries),
}

impl WfsRequest {
    /// Parse a KVP (GET) request, dispatching on `REQUEST=`.
    pub fn from_kvp(kvp: &KvpRequest) -> Result<WfsRequest> {
        check_service(kvp.get_opt("SERVICE", None))?;
        let operation = kvp.require("REQUEST", None)?;
        match operation.to_ascii_uppercase().as_str() {
            "GETCAPABILITIES" => Self::capabilities_from_kvp(kvp),
            "DESCRIBEFEATURETYPE" => {
                check_version(kvp.get_opt("VERSION", None))?;
                Ok(WfsRequest::DescribeFeatureType(DescribeFeatureType {
                    type_names: kvp
                        .get_list("TYPENAMES", Some("TYPENAME"))
                        .map(|names| names.iter().map(|n| kvp.parse_qname(n)).collect())
                        .unwrap_or_default(),
                    output_format: kvp.get_opt("OUTPUTFORMAT", None).map(str::to_string),
                }))
            }
            "GETFEATURE" => {
                check_version(kvp.get_opt("VERSION", None))?;
                Self::get_feature_from_kvp(kvp).map(WfsRequest::GetFeature)
            }
            "GETPROPERTYVALUE" => {
                check_version(kvp.get_opt("VERSION", None))?;
                Self::get_property_value_from_kvp(kvp)
            }
            "LISTSTOREDQUERIES" => Ok(WfsRequest::ListStoredQueries),
            "DESCRIBESTOREDQUERIES" => Ok(WfsRequest::DescribeStoredQueries(
                DescribeStoredQueries {
                    stored_query_ids: kvp
                        .get_list("STOREDQUERY_ID", None)
                        .unwrap_or_default(),
                },
            )),
            other => Err(WfsError::operation_not_supported(format!(
                "'{other}' is not implemented by this server."
            ))
            .locator("request")),
        }
    }

    /// Parse an XML (POST) request, dispatching on the root tag.
    pub fn from_xml(root: &XmlElement) -> Result<WfsRequest> {
        if root.ns.as_deref() != Some(xmlns::WFS) {
            return Err(WfsError::operation_not_supported(format!(
                "Unsupported request element <{}>",
                root.local
            ))
            .locator(root.local.clone()));
        }
        check_service(root.attr("service"))?;
        match root.local.as_str() {
            "GetCapabilities" => {
                let accept_versions = root
                    .find(xmlns::OWS, "AcceptVersions")
                    .map(|av| {
                        av.children
                            .iter()
                            .filter(|c| c.is(xmlns::OWS, "Version"))
                            .map(|c| c.text.trim().to_string())
                            .collect::<Vec<_>>()
                    })
                    .filter(|versions| !versions.is_empty());
                Ok(WfsRequest::GetCapabilities(GetCapabilities {
                    version: negotiate_version(accept_versions.as_deref())?,
                }))
            }
            "DescribeFeatureType" => {
                check_version(root.attr("version"))?;
                let type_names = root
                    .children
                    .iter()
                    .filter(|c| c.is(xmlns::WFS, "TypeName"))
                    .map(|c| c.parse_qname(c.text.trim()))
                    .collect();
                Ok(WfsRequest::DescribeFeatureType(DescribeFeatureType {
                    type_names,
                    output_format: root.attr("outputFormat").map(str::to_string),
                }))
            }
            "GetFeature" => {
                check_version(root.attr("version"))?;
                Ok(WfsRequest::GetFeature(GetFeature {
                    queries: Self::queries_from_xml(root)?,
                    result_type: root
                        .attr("resultType")
                        .map(ResultType::from_string)
                        .transpose()?
                        .unwrap_or_default(),
                    start_index: parse_start_index(root.attr("startIndex"))?,
                    count: parse_count(root.attr("count"))?,
                    output_format: root.attr("outputFormat").map(str::to_string),
                }))
            }
            "GetPropertyValue" => {
                check_version(root.attr("version"))?;
                let mut queries = Self::queries_from_xml(root)?;
                if queries.len() != 1 {
                    return Err(WfsError::parsing_failed(
                        "GetPropertyValue expects exactly one query",
                        "GetPropertyValue",
                    ));
                }
                let value_reference = root.require_attr("valueReference")?;
                Ok(WfsRequest::GetPropertyValue(GetPropertyValue {
                    query: queries.remove(0),
                    value_reference: ValueReference::new(
                        value_reference.trim(),
                        root.ns_aliases.clone(),
                    ),
                    result_type: root
                        .attr("resultType")
                        .map(ResultType::from_string)
                        .transpose()?
                        .unwrap_or_default(),
                    start_index: parse_start_index(root.attr("startIndex"))?,
                    count: parse_count(root.attr("count"))?,
                    output_format: root.attr("outputFormat").map(str::to_string),
                }))
            }
            "ListStoredQueries" => Ok(WfsRequest::ListStoredQueries),
            "DescribeStoredQueries" => {
                let ids = root
                    .children
                    .iter()
                    .filter(|c| c.is(xmlns::WFS, "StoredQueryId"))
                    .map(|c| c.text.trim().to_string())
                    .collect();
                Ok(WfsRequest::DescribeStoredQueries(DescribeStoredQueries {
                    stored_query_ids: ids,
                }))
            }
            other => Err(WfsError::operation_not_supported(format!(
                "'{other}' is not implemented by this server."
            ))
            .locator(other.to_string())),
        }
    }

    fn capabilities_from_kvp(kvp: &KvpRequest) -> Result<WfsRequest> {
        let accept_versions = kvp.get_list("ACCEPTVERSIONS", None);
        if accept_versions.is_some() && kvp.get_opt("VERSION", None).is_some() {
            return Err(WfsError::invalid_parameter(
                "Can't provide both ACCEPTVERSIONS and VERSION",
                "acceptVersions",
            ));
        }
        let version = match kvp.get_opt("VERSION", None) {
            Some(version) => {
                check_version(Some(version))?;
                "2.0.0".to_string()
            }
            None => negotiate_version(accept_versions.as_deref())?,
        };
        Ok(WfsRequest::GetCapabilities(GetCapabilities { version }))
    }

    fn get_feature_from_kvp(kvp: &KvpRequest) -> Result<GetFeature> {
        if let Some(resolve) = kvp.get_opt("RESOLVE", None) {
            if resolve != "none" {
                return Err(WfsError::option_not_supported(
                    "Only RESOLVE=none is supported",
                    "resolve",
                ));
            }
        }
        let queries = Self::queries_from_kvp(kvp)?;
        Ok(GetFeature {
            queries,
            result_type: kvp
                .get_parsed("RESULTTYPE", None, ResultType::from_string)?
                .unwrap_or_default(),
            start_index: parse_start_index(kvp.get_opt("STARTINDEX", None))?,
            count: parse_count(kvp.get_opt("COUNT", Some("MAXFEATURES")))?,
            output_format: kvp.get_opt("OUTPUTFORMAT", None).map(str::to_string),
        })
    }

    fn get_property_value_from_kvp(kvp: &KvpRequest) -> Result<WfsRequest> {
        if let Some(resolve) = kvp.get_opt("RESOLVE", None) {
            if resolve != "none" {
                return Err(WfsError::option_not_supported(
                    "Only RESOLVE=none is supported",
                    "resolve",
                ));
            }
        }
        let mut queries = Self::queries_from_kvp(kvp)?;
        if queries.len() != 1 {
            return Err(WfsError::parsing_failed(
                "GetPropertyValue expects exactly one query",
                "typeNames",
            ));
        }
        let value_reference = kvp.require("VALUEREFERENCE", None)?;
        Ok(WfsRequest::GetPropertyValue(GetPropertyValue {
            query: queries.remove(0),
            value_reference: ValueReference::new(value_reference, kvp.ns_aliases.clone()),
            result_type: kvp
                .get_parsed("RESULTTYPE", None, ResultType::from_string)?
                .unwrap_or_default(),
            start_index: parse_start_index(kvp.get_opt("STARTINDEX", None))?,
            count: parse_count(kvp.get_opt("COUNT", Some("MAXFEATURES")))?,
            output_format: kvp.get_opt("OUTPUTFORMAT", None).map(str::to_string),
        }))
    }

    fn queries_from_kvp(kvp: &KvpRequest) -> Result<Vec<QueryExpression>> {
        if let Some(id) = kvp.get_opt("STOREDQUERY_ID", None) {
            // Adhoc parameters can't be combined with a stored query.
            for adhoc_param in ["FILTER", "BBOX", "RESOURCEID"] {
                if kvp.get_opt(adhoc_param, None).is_some() {
                    return Err(WfsError::invalid_parameter(
                        "Stored query can't be combined with adhoc-query parameters",
                        adhoc_param.to_ascii_lowercase(),
                    ));
                }
            }
            let parameters = kvp
                .original
                .iter()
                .map(|(name, value)| (name.to_ascii_uppercase(), value.clone()))
                .collect();
            return Ok(vec![QueryExpression::Stored(StoredQueryInvocation {
                id: id.to_string(),
                parameters,
            })]);
        }

        kvp.split_parameter_groups()?
            .iter()
            .map(|group| AdhocQuery::from_kvp(group).map(QueryExpression::Adhoc))
            .collect()
    }

    fn queries_from_xml(root: &XmlElement) -> Result<Vec<QueryExpression>> {
        let mut queries = Vec::new();
        for child in &root.children {
            if child.is(xmlns::WFS, "Query") {
                queries.push(QueryExpression::Adhoc(AdhocQuery::from_xml(child)?));
            } else if child.is(xmlns::WFS, "StoredQuery") {
                let id = child.require_attr("id")?.to_string();
                let mut parameters = HashMap::new();
                for param in &child.children {
                    if param.is(xmlns::WFS, "Parameter") {
                        parameters.insert(
                            param.require_attr("name")?.to_ascii_uppercase(),
                            param.text.trim().to_string(),
                        );
                    }
                }
                queries.push(QueryExpression::Stored(StoredQueryInvocation {
                    id,
                    parameters,
                }));
            } else {
                return Err(WfsError::parsing_failed(
                    format!("Unexpected element <{}> in <wfs:{}>", child.local, root.local),
                    child.local.clone(),
                ));
            }
        }
        if queries.is_empty() {
            return Err(WfsError::missing_parameter("query"));
        }
        Ok(queries)
    }
}

fn check_service(service: Option<&str>) -> Result<()> {
    match service {
        // The service parameter defaults to WFS.
        None => Ok(()),
        Some(value) if value.eq_ignore_ascii_case("WFS") => Ok(()),
        Some(other) => Err(WfsError::invalid_parameter(
            format!("Unsupported service type: {other}"),
            "service",
        )),
    }
}

fn check_version(version: Option<&str>) -> Result<()> {
    match version {
        None => Ok(()),
        Some(value) if KNOWN_VERSIONS.contains(&value) => Ok(()),
        Some(other) => Err(WfsError::invalid_parameter(
            format!("Unsupported version: {other}"),
            "version",
        )),
    }
}

/// Version negotiation for GetCapabilities: pick the highest requested
/// version this server implements.
fn negotiate_version(accept_versions: Option<&[String]>) -> Result<String> {
    let Some(requested) = accept_versions else {
        return Ok("2.0.0".to_string());
    };
    let mut matched: Vec<&String> = requested
        .iter()
        .filter(|v| ACCEPT_VERSIONS.contains(&v.as_str()))
        .collect();
    matched.sort();
    match matched.last() {
        Some(version) => Ok((*version).clone()),
        None => Err(WfsError::version_negotiation_failed(format!(
            "'{}' does not contain supported versions, supported are: {}.",
            requested.join(","),
            ACCEPT_VERSIONS.join(", ")
        ))),
    }
}


fn parse_start_index(raw: Option<&str>) -> Result<u64> {
    match raw {
        None => Ok(0),
        Some(value) => value.trim().parse::<u64>().map_err(|_| {
            WfsError::invalid_parameter(
                format!("Invalid STARTINDEX value: {value}"),
                "startIndex",
            )
        }),
    }
}

fn parse_count(raw: Option<&str>) -> Result<Option<u64>> {
    match raw {
        None => Ok(None),
        Some(value) => {
            let count = value.trim().parse::<u64>().map_err(|_| {
                WfsError::invalid_parameter(format!("Invalid COUNT value: {value}"), "count")
            })?;
            if count == 0 {
                return Err(WfsError::invalid_parameter(
                    "COUNT should be a positive number",
                    "count",
                ));
            }
            Ok(Some(count))
        }
    }
}
