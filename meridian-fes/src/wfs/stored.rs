//! Stored queries: predefined, parameterized queries on the server.
//!
//! A good description of the concept lives in the mapserver docs
//! (<https://mapserver.org/ogc/wfs_server.html#stored-queries-wfs-2-0>).
//! The registry is populated at bootstrap and immutable afterwards; the
//! only built-in is `GetFeatureById`.

use crate::ast::filter::{Filter, FilterPredicate};
use crate::ast::identifiers::ResourceId;
use crate::wfs::adhoc::AdhocQuery;
use crate::wfs::requests::StoredQueryInvocation;
use meridian_core::error::{Result, WfsError};
use std::collections::HashMap;
use std::sync::Arc;

/// The id of the built-in GetFeatureById stored query.
pub const GET_FEATURE_BY_ID: &str = "urn:ogc:def:query:OGC-WFS::GetFeatureById";

/// WFS metadata of a stored query, rendered by DescribeStoredQueries.
#[derive(Debug, Clone)]
pub struct StoredQueryDescription {
    pub id: String,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    /// Parameter name → `xs:` type QName.
    pub parameters: Vec<(String, String)>,
}

/// The materialized form of an invoked stored query.
#[derive(Debug, Clone)]
pub struct ResolvedStoredQuery {
    pub adhoc: AdhocQuery,
    /// GetFeatureById renders the bare feature without collection wrappers.
    pub standalone: bool,
}

type Resolver =
    dyn Fn(&HashMap<String, String>, bool) -> Result<ResolvedStoredQuery> + Send + Sync;

/// One registered stored query: metadata plus the resolver that turns the
/// invocation parameters into an adhoc query.
pub struct StoredQueryDef {
    pub meta: StoredQueryDescription,
    resolver: Arc<Resolver>,
}

/// Registry of stored queries callable via `STOREDQUERY_ID`.
#[derive(Default)]
pub struct StoredQueryRegistry {
    queries: Vec<StoredQueryDef>,
}

impl StoredQueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the spec-mandated built-ins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            StoredQueryDescription {
                id: GET_FEATURE_BY_ID.to_string(),
                title: Some("Get feature by identifier".to_string()),
                abstract_text: Some(
                    "Returns the single feature that corresponds with the ID argument".to_string(),
                ),
                parameters: vec![("ID".to_string(), "xs:string".to_string())],
            },
            resolve_get_feature_by_id,
        );
        registry
    }

    pub fn register(
        &mut self,
        meta: StoredQueryDescription,
        resolver: impl Fn(&HashMap<String, String>, bool) -> Result<ResolvedStoredQuery>
            + Send
            + Sync
            + 'static,
    ) {
        self.queries.push(StoredQueryDef {
            meta,
            resolver: Arc::new(resolver),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredQueryDef> {
        self.queries.iter()
    }

    pub fn get(&self, id: &str) -> Result<&StoredQueryDef> {
        self.queries.iter().find(|def| def.meta.id == id).ok_or_else(|| {
            WfsError::invalid_parameter(
                format!("Stored query does not exist: {id}"),
                "STOREDQUERY_ID",
            )
        })
    }

    /// Resolve an invocation: check declared parameters, run the resolver.
    pub fn resolve(
        &self,
        invocation: &StoredQueryInvocation,
        strict: bool,
    ) -> Result<ResolvedStoredQuery> {
        let def = self.get(&invocation.id)?;
        let mut args = HashMap::new();
        for (name, _) in &def.meta.parameters {
            match invocation.parameters.get(&name.to_ascii_uppercase()) {
                Some(value) => {
                    args.insert(name.clone(), value.clone());
                }
                None => {
                    return Err(WfsError::new(
                        meridian_core::ExceptionCode::MissingParameterValue,
                        format!("Stored query {} requires an '{name}' parameter", def.meta.id),
                    )
                    .locator(name.clone()));
                }
            }
        }
        (def.resolver)(&args, strict)
    }
}

fn resolve_get_feature_by_id(
    args: &HashMap<String, String>,
    strict: bool,
) -> Result<ResolvedStoredQuery> {
    let id = args.get("ID").expect("checked by resolve()");
    if !id.contains('.') {
        // WFS 2.0.2 says NotFound; the strict flag keeps the literal
        // InvalidParameterValue of the base spec.
        let error = WfsError::invalid_parameter(
            format!("Invalid ID value: expected typeName.id format, got '{id}'"),
            "ID",
        );
        return Err(if strict { error } else { error.status(404) });
    }

    let resource_id = ResourceId::new(id.clone());
    let type_name = resource_id
        .type_name
        .clone()
        .expect("rid with a dot always has a type");
    Ok(ResolvedStoredQuery {
        adhoc: AdhocQuery {
            type_names: vec![type_name],
            handle: String::new(),
            srs_name: None,
            property_names: None,
            filter: Some(Filter {
                predicate: FilterPredicate::Ids(vec![resource_id]),
            }),
            sort_by: None,
        },
        standalone: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(id: &str, params: &[(&str, &str)]) -> StoredQueryInvocation {
        StoredQueryInvocation {
            id: id.to_string(),
            parameters: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn resolves_get_feature_by_id() {
        let registry = StoredQueryRegistry::with_builtins();
        let resolved = registry
            .resolve(&invocation(GET_FEATURE_BY_ID, &[("ID", "restaurant.3")]), false)
            .unwrap();
        assert!(resolved.standalone);
        assert_eq!(resolved.adhoc.type_names, vec!["restaurant"]);
    }

    #[test]
    fn missing_id_parameter() {
        let registry = StoredQueryRegistry::with_builtins();
        let err = registry
            .resolve(&invocation(GET_FEATURE_BY_ID, &[]), false)
            .unwrap_err();
        assert_eq!(err.code.as_str(), "MissingParameterValue");
        assert_eq!(err.locator.as_deref(), Some("ID"));
    }

    #[test]
    fn malformed_id_is_404_unless_strict() {
        let registry = StoredQueryRegistry::with_builtins();
        let lax = registry
            .resolve(&invocation(GET_FEATURE_BY_ID, &[("ID", "garbage")]), false)
            .unwrap_err();
        assert_eq!(lax.status, 404);
        assert_eq!(lax.code.as_str(), "InvalidParameterValue");

        let strict = registry
            .resolve(&invocation(GET_FEATURE_BY_ID, &[("ID", "garbage")]), true)
            .unwrap_err();
        assert_eq!(strict.status, 400);
    }

    #[test]
    fn unknown_stored_query() {
        let registry = StoredQueryRegistry::with_builtins();
        let err = registry
            .resolve(&invocation("urn:nope", &[]), false)
            .unwrap_err();
        assert_eq!(err.locator.as_deref(), Some("STOREDQUERY_ID"));
    }
}
