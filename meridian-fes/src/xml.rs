//! A namespace-aware XML element tree.
//!
//! quick-xml gives a flat event stream; the parsers need a tree with the
//! in-scope `xmlns` declarations attached to every element so that QName
//! values inside attributes and text can be resolved later (e.g.
//! `typeNames="app:restaurant"`, `type="xs:boolean"`).

use crate::xmlns;
use meridian_core::error::{Result, WfsError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

/// One XML attribute with a resolved namespace (None for unprefixed).
#[derive(Debug, Clone, PartialEq)]
pub struct XmlAttr {
    pub ns: Option<String>,
    pub local: String,
    pub value: String,
}

/// An XML element with resolved namespaces and in-scope alias map.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    /// Resolved namespace URI of the tag, `None` when none applies.
    pub ns: Option<String>,
    /// Local tag name.
    pub local: String,
    pub attributes: Vec<XmlAttr>,
    /// Concatenated, trimmed text content.
    pub text: String,
    pub children: Vec<XmlElement>,
    /// prefix → uri declarations in scope here; key `""` is the default ns.
    pub ns_aliases: HashMap<String, String>,
}

impl XmlElement {
    /// The fully-qualified tag in `{uri}local` notation.
    pub fn tag(&self) -> String {
        match &self.ns {
            Some(ns) => format!("{{{ns}}}{}", self.local),
            None => self.local.clone(),
        }
    }

    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.local == local && self.ns.as_deref() == Some(ns)
    }

    /// Fail with `OperationParsingFailed` unless this element carries the
    /// expected tag.
    pub fn expect_tag(&self, ns: &str, local: &str) -> Result<()> {
        if self.is(ns, local) {
            return Ok(());
        }
        Err(WfsError::parsing_failed(
            format!("Expected <{local}> element, got <{}>", self.local),
            self.local.clone(),
        ))
    }

    /// Strict check for leaf elements such as `<fes:ValueReference>`.
    pub fn expect_no_children(&self) -> Result<()> {
        if let Some(child) = self.children.first() {
            return Err(WfsError::parsing_failed(
                format!("Unexpected child element <{}> in <{}>", child.local, self.local),
                self.local.clone(),
            ));
        }
        Ok(())
    }

    pub fn expect_children(&self, min: usize) -> Result<()> {
        if self.children.len() < min {
            return Err(WfsError::parsing_failed(
                format!("<{}> should have at least {min} child node(s)", self.local),
                self.local.clone(),
            ));
        }
        Ok(())
    }

    /// An unprefixed attribute by local name.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.ns.is_none() && a.local == local)
            .map(|a| a.value.as_str())
    }

    /// A namespaced attribute, e.g. `gml:id`.
    pub fn attr_ns(&self, ns: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.ns.as_deref() == Some(ns) && a.local == local)
            .map(|a| a.value.as_str())
    }

    pub fn require_attr(&self, local: &str) -> Result<&str> {
        self.attr(local).ok_or_else(|| {
            WfsError::parsing_failed(
                format!("Missing required attribute '{local}' in <{}>", self.local),
                self.local.clone(),
            )
        })
    }

    /// Find the first direct child with the given tag.
    pub fn find(&self, ns: &str, local: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(ns, local))
    }

    /// Resolve a `prefix:name` value through the in-scope aliases into
    /// `{uri}name` notation. Unprefixed values resolve through the default
    /// namespace; unknown prefixes are passed through untouched for
    /// compatibility with sloppy clients.
    pub fn parse_qname(&self, value: &str) -> String {
        parse_qname(value, &self.ns_aliases)
    }
}

/// Resolve a QName against an alias map.
pub fn parse_qname(value: &str, ns_aliases: &HashMap<String, String>) -> String {
    if value.starts_with('{') {
        return value.to_string();
    }
    match value.split_once(':') {
        Some((prefix, local)) => match ns_aliases.get(prefix) {
            Some(uri) => format!("{{{uri}}}{local}"),
            None => value.to_string(),
        },
        None => match ns_aliases.get("") {
            Some(uri) if !uri.is_empty() => format!("{{{uri}}}{value}"),
            _ => value.to_string(),
        },
    }
}

/// Strip the `{uri}` part of a qualified name.
pub fn local_name(qname: &str) -> &str {
    match qname.find('}') {
        Some(pos) => &qname[pos + 1..],
        None => match qname.find(':') {
            Some(pos) => &qname[pos + 1..],
            None => qname,
        },
    }
}

/// Parse an XML document into an element tree.
///
/// `extra_aliases` seeds prefix declarations that are in scope without
/// appearing in the document (used for KVP FILTER values, where NAMESPACES
/// provides them).
pub fn parse_xml_document(
    source: &str,
    extra_aliases: Option<&HashMap<String, String>>,
) -> Result<XmlElement> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(true);

    let mut root_scope: HashMap<String, String> = HashMap::new();
    if let Some(extra) = extra_aliases {
        root_scope.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let scope = stack
                    .last()
                    .map(|parent| parent.ns_aliases.clone())
                    .unwrap_or_else(|| root_scope.clone());
                let element = open_element(&start, scope)?;
                stack.push(element);
            }
            Ok(Event::Empty(start)) => {
                let scope = stack
                    .last()
                    .map(|parent| parent.ns_aliases.clone())
                    .unwrap_or_else(|| root_scope.clone());
                let element = open_element(&start, scope)?;
                close_element(element, &mut stack, &mut root);
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().expect("end event without matching start");
                close_element(element, &mut stack, &mut root);
            }
            Ok(Event::Text(text)) => {
                if let Some(current) = stack.last_mut() {
                    let value = text.unescape().map_err(xml_syntax_error)?;
                    current.text.push_str(&value);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(data.as_ref()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // comments, PIs, doctype
            Err(e) => return Err(xml_syntax_error(e)),
        }
    }

    root.ok_or_else(|| {
        WfsError::parsing_failed("The XML document contains no root element", "body")
    })
}

fn close_element(element: XmlElement, stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn open_element(start: &BytesStart<'_>, mut scope: HashMap<String, String>) -> Result<XmlElement> {
    // First pass: collect the xmlns declarations into the scope.
    let mut plain_attrs: Vec<(String, String)> = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| {
            WfsError::parsing_failed(format!("Malformed XML attribute: {e}"), "body")
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(xml_syntax_error)?
            .into_owned();
        if key == "xmlns" {
            scope.insert(String::new(), value);
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.insert(prefix.to_string(), value);
        } else {
            plain_attrs.push((key, value));
        }
    }

    let raw_tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let (ns, local) = resolve_prefix(&raw_tag, &scope, true)?;

    let mut attributes = Vec::with_capacity(plain_attrs.len());
    for (key, value) in plain_attrs {
        let (ns, local) = resolve_prefix(&key, &scope, false)?;
        attributes.push(XmlAttr { ns, local, value });
    }

    Ok(XmlElement {
        ns,
        local,
        attributes,
        text: String::new(),
        children: Vec::new(),
        ns_aliases: scope,
    })
}

/// Resolve the prefix of a tag or attribute name. Elements pick up the
/// default namespace; attributes never do (per the XML namespaces spec).
fn resolve_prefix(
    raw: &str,
    scope: &HashMap<String, String>,
    use_default: bool,
) -> Result<(Option<String>, String)> {
    match raw.split_once(':') {
        Some((prefix, local)) => match scope.get(prefix) {
            Some(uri) => Ok((Some(uri.clone()), local.to_string())),
            None => Err(WfsError::parsing_failed(
                format!("Undeclared XML namespace prefix '{prefix}' on <{raw}>"),
                raw.to_string(),
            )),
        },
        None => {
            let default_ns = if use_default {
                scope.get("").filter(|uri| !uri.is_empty()).cloned()
            } else {
                None
            };
            Ok((default_ns, raw.to_string()))
        }
    }
}

fn xml_syntax_error(e: impl std::fmt::Display) -> WfsError {
    WfsError::parsing_failed(format!("Malformed XML: {e}"), "body")
}

/// Parse a `<fes:Filter>` source string.
///
/// KVP requests routinely omit the namespace declaration on the filter;
/// both geoserver and mapserver accept that, so the fes 2.0 and gml 3.2
/// namespaces are injected when the first tag has no `xmlns`. Leading
/// whitespace is tolerated.
pub fn parse_filter_source(
    source: &str,
    extra_aliases: Option<&HashMap<String, String>>,
) -> Result<XmlElement> {
    let trimmed = source.trim_start();
    let patched;
    let source = match trimmed.find('>') {
        Some(end_first) => {
            let first_tag = &trimmed[..end_first];
            if !first_tag.contains("xmlns")
                && (first_tag == "<Filter" || first_tag.starts_with("<Filter "))
            {
                patched = format!(
                    "{} xmlns=\"{}\" xmlns:gml=\"{}\"{}",
                    first_tag,
                    xmlns::FES,
                    xmlns::GML32,
                    &trimmed[end_first..]
                );
                patched.as_str()
            } else {
                trimmed
            }
        }
        None => trimmed,
    };
    parse_xml_document(source, extra_aliases)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_namespaces_per_scope() {
        let doc = parse_xml_document(
            r#"<fes:Filter xmlns:fes="http://www.opengis.net/fes/2.0">
                 <fes:PropertyIsEqualTo>
                   <fes:ValueReference>name</fes:ValueReference>
                   <fes:Literal>x</fes:Literal>
                 </fes:PropertyIsEqualTo>
               </fes:Filter>"#,
            None,
        )
        .unwrap();
        assert!(doc.is(xmlns::FES, "Filter"));
        assert!(doc.children[0].is(xmlns::FES, "PropertyIsEqualTo"));
        assert_eq!(doc.children[0].children[0].text, "name");
    }

    #[test]
    fn default_namespace_applies_to_elements_not_attributes() {
        let doc = parse_xml_document(
            r#"<Filter xmlns="http://www.opengis.net/fes/2.0"><ResourceId rid="a.1"/></Filter>"#,
            None,
        )
        .unwrap();
        assert!(doc.is(xmlns::FES, "Filter"));
        let rid = &doc.children[0];
        assert!(rid.is(xmlns::FES, "ResourceId"));
        assert_eq!(rid.attr("rid"), Some("a.1"));
    }

    #[test]
    fn undeclared_prefix_is_rejected() {
        let err = parse_xml_document("<fes:Filter/>", None).unwrap_err();
        assert_eq!(err.code.as_str(), "OperationParsingFailed");
    }

    #[test]
    fn filter_without_xmlns_gets_fes_injected() {
        let doc = parse_filter_source(
            "  <Filter><ResourceId rid=\"a.1\"/></Filter>",
            None,
        )
        .unwrap();
        assert!(doc.is(xmlns::FES, "Filter"));
        assert_eq!(doc.ns_aliases.get("gml").map(String::as_str), Some(xmlns::GML32));
    }

    #[test]
    fn qname_resolution() {
        let mut aliases = HashMap::new();
        aliases.insert("app".to_string(), "http://example.org/app".to_string());
        assert_eq!(
            parse_qname("app:restaurant", &aliases),
            "{http://example.org/app}restaurant"
        );
        assert_eq!(parse_qname("restaurant", &aliases), "restaurant");
        assert_eq!(parse_qname("x:y", &aliases), "x:y");
    }

    #[test]
    fn nested_scope_overrides() {
        let doc = parse_xml_document(
            r#"<a xmlns="urn:one"><b xmlns="urn:two"/><c/></a>"#,
            None,
        )
        .unwrap();
        assert_eq!(doc.ns.as_deref(), Some("urn:one"));
        assert_eq!(doc.children[0].ns.as_deref(), Some("urn:two"));
        assert_eq!(doc.children[1].ns.as_deref(), Some("urn:one"));
    }
}
