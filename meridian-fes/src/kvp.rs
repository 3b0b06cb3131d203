//! The Key-Value-Pair (GET) request format.
//!
//! Parameter names are case-insensitive. Some parameters use notation
//! formats of their own: comma-separated lists, `xmlns(prefix,uri)` tuples,
//! and parenthesized grouping that packs several queries into one request.

use crate::xmlns;
use meridian_core::error::{Result, WfsError};
use std::collections::HashMap;

/// A parsed KVP request.
#[derive(Debug, Clone)]
pub struct KvpRequest {
    /// Uppercased parameter name → value.
    params: HashMap<String, String>,
    /// The raw pairs in original casing and order, for pagination links.
    pub original: Vec<(String, String)>,
    /// Namespace aliases: defaults, application namespaces, then the
    /// request's own NAMESPACES parameter.
    pub ns_aliases: HashMap<String, String>,
}

impl KvpRequest {
    pub fn from_pairs(
        pairs: Vec<(String, String)>,
        app_aliases: &HashMap<String, String>,
    ) -> Result<KvpRequest> {
        let params: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| (name.to_ascii_uppercase(), value.clone()))
            .collect();

        let mut ns_aliases = xmlns::default_aliases();
        ns_aliases.extend(app_aliases.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(value) = params.get("NAMESPACES") {
            ns_aliases.extend(parse_kvp_namespaces(value)?);
        }

        Ok(KvpRequest {
            params,
            original: pairs,
            ns_aliases,
        })
    }

    /// Parse a raw URL query string (`a=1&b=2`), decoding percent-escapes
    /// and `+` as space.
    pub fn from_query_string(
        query: &str,
        app_aliases: &HashMap<String, String>,
    ) -> Result<KvpRequest> {
        let mut pairs = Vec::new();
        for piece in query.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = piece.split_once('=').unwrap_or((piece, ""));
            pairs.push((decode_component(name)?, decode_component(value)?));
        }
        Self::from_pairs(pairs, app_aliases)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(&name.to_ascii_uppercase())
    }

    /// Raw value lookup; empty values count as present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Optional parameter with an optional WFS 1 alias
    /// (e.g. TYPENAMES/TYPENAME). Empty values read as absent.
    pub fn get_opt(&self, name: &str, alias: Option<&str>) -> Option<&str> {
        self.get(name)
            .filter(|v| !v.is_empty())
            .or_else(|| alias.and_then(|a| self.get(a)).filter(|v| !v.is_empty()))
    }

    /// Required parameter: absent raises `MissingParameterValue`, empty
    /// raises `InvalidParameterValue`.
    pub fn require(&self, name: &str, alias: Option<&str>) -> Result<&str> {
        let present = self
            .get(name)
            .or_else(|| alias.and_then(|a| self.get(a)));
        match present {
            None => Err(WfsError::missing_parameter(name)),
            Some("") => Err(WfsError::invalid_parameter(
                format!("Empty '{}' parameter", name.to_ascii_uppercase()),
                name,
            )),
            Some(value) => Ok(value),
        }
    }

    /// A comma-separated list parameter.
    pub fn get_list(&self, name: &str, alias: Option<&str>) -> Option<Vec<String>> {
        self.get_opt(name, alias)
            .map(|v| v.split(',').map(str::to_string).collect())
    }

    /// Parse a parameter with a custom conversion. Errors from the parser
    /// get this parameter's name as locator unless they carry their own.
    pub fn get_parsed<T>(
        &self,
        name: &str,
        alias: Option<&str>,
        parser: impl FnOnce(&str) -> Result<T>,
    ) -> Result<Option<T>> {
        match self.get_opt(name, alias) {
            None => Ok(None),
            Some(value) => parser(value).map(Some).map_err(|mut e| {
                if e.locator.is_none() {
                    e.locator = Some(name.to_string());
                }
                e
            }),
        }
    }

    /// Resolve a QName value through the request's namespace aliases.
    pub fn parse_qname(&self, value: &str) -> String {
        crate::xml::parse_qname(value, &self.ns_aliases)
    }

    /// Split parenthesized parameter lists into individual requests.
    ///
    /// `TYPENAMES=(A,B)(C,D)&FILTER=(…)(…)` turns into two request
    /// variants; parameters without grouping are shared between them.
    /// All grouped parameters must have the same number of groups.
    pub fn split_parameter_groups(&self) -> Result<Vec<KvpRequest>> {
        let mut grouped: Vec<(&String, Vec<&str>)> = Vec::new();
        for (name, value) in &self.params {
            if value.starts_with('(') && value.ends_with(')') {
                grouped.push((name, value[1..value.len() - 1].split(")(").collect()));
            }
        }
        if grouped.is_empty() {
            return Ok(vec![self.clone()]);
        }

        let sizes: std::collections::HashSet<usize> =
            grouped.iter().map(|(_, groups)| groups.len()).collect();
        if sizes.len() > 1 {
            let mut keys: Vec<&str> = grouped.iter().map(|(name, _)| name.as_str()).collect();
            keys.sort_unstable();
            return Err(WfsError::parsing_failed(
                format!("Inconsistent pairs between: {}", keys.join(", ")),
                keys[0],
            ));
        }

        let size = sizes.into_iter().next().unwrap();
        let mut variants = Vec::with_capacity(size);
        for i in 0..size {
            let mut variant = self.clone();
            for (name, groups) in &grouped {
                variant
                    .params
                    .insert((*name).clone(), groups[i].to_string());
            }
            variants.push(variant);
        }
        Ok(variants)
    }
}

fn decode_component(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|cow| cow.into_owned())
        .map_err(|_| WfsError::parsing_failed("Query string is not valid UTF-8", "query"))
}

/// Parse the `NAMESPACES` parameter:
/// `xmlns(prefix,uri)[,xmlns(prefix,uri)…]` or `xmlns(uri)` for the default.
pub fn parse_kvp_namespaces(value: &str) -> Result<HashMap<String, String>> {
    let mut namespaces = HashMap::new();
    if value.is_empty() {
        return Ok(namespaces);
    }

    let mut tokens = value.split(',');
    while let Some(token) = tokens.next() {
        let Some(inner) = token.strip_prefix("xmlns(") else {
            return Err(WfsError::invalid_parameter(
                format!("Expected xmlns(...) format: {value}"),
                "namespaces",
            ));
        };
        if let Some(uri) = inner.strip_suffix(')') {
            // xmlns(uri) declares the default namespace.
            namespaces.insert(String::new(), uri.to_string());
        } else {
            let uri = tokens.next().unwrap_or("");
            let Some(uri) = uri.strip_suffix(')') else {
                return Err(WfsError::invalid_parameter(
                    format!("Expected xmlns(prefix,uri) format: {value}"),
                    "namespaces",
                ));
            };
            namespaces.insert(inner.to_string(), uri.to_string());
        }
    }
    Ok(namespaces)
}
