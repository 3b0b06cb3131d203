//! ListStoredQueries / DescribeStoredQueries output.

use crate::utils::xml_escape;
use meridian_core::error::{Result, WfsError};
use meridian_fes::wfs::stored::StoredQueryRegistry;
use meridian_schema::FeatureTypeRegistry;

pub const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Render the `<wfs:ListStoredQueriesResponse>` document.
pub fn render_list_stored_queries(
    stored: &StoredQueryRegistry,
    registry: &FeatureTypeRegistry,
) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<wfs:ListStoredQueriesResponse xmlns:wfs=\"http://www.opengis.net/wfs/2.0\" \
         xmlns:app=\"{}\">\n",
        xml_escape(&registry.xml_namespace)
    ));
    for def in stored.iter() {
        out.push_str(&format!(
            "  <wfs:StoredQuery id=\"{}\">\n",
            xml_escape(&def.meta.id)
        ));
        if let Some(title) = &def.meta.title {
            out.push_str(&format!("    <wfs:Title>{}</wfs:Title>\n", xml_escape(title)));
        }
        // Every feature type can answer the generic queries.
        for feature_type in registry.iter() {
            out.push_str(&format!(
                "    <wfs:ReturnFeatureType>{}</wfs:ReturnFeatureType>\n",
                xml_escape(&feature_type.xml_name())
            ));
        }
        out.push_str("  </wfs:StoredQuery>\n");
    }
    out.push_str("</wfs:ListStoredQueriesResponse>\n");
    out
}

/// Render the `<wfs:DescribeStoredQueriesResponse>` document.
/// An empty id list describes every registered query.
pub fn render_describe_stored_queries(
    stored: &StoredQueryRegistry,
    registry: &FeatureTypeRegistry,
    ids: &[String],
) -> Result<String> {
    let selected: Vec<_> = if ids.is_empty() {
        stored.iter().collect()
    } else {
        ids.iter()
            .map(|id| stored.get(id))
            .collect::<Result<Vec<_>>>()
            .map_err(|mut e: WfsError| {
                e.locator = Some("storedQueryId".to_string());
                e
            })?
    };

    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<wfs:DescribeStoredQueriesResponse xmlns:wfs=\"http://www.opengis.net/wfs/2.0\" \
         xmlns:xs=\"http://www.w3.org/2001/XMLSchema\" xmlns:app=\"{}\">\n",
        xml_escape(&registry.xml_namespace)
    ));
    for def in selected {
        out.push_str(&format!(
            "  <wfs:StoredQueryDescription id=\"{}\">\n",
            xml_escape(&def.meta.id)
        ));
        if let Some(title) = &def.meta.title {
            out.push_str(&format!("    <wfs:Title>{}</wfs:Title>\n", xml_escape(title)));
        }
        if let Some(abstract_text) = &def.meta.abstract_text {
            out.push_str(&format!(
                "    <wfs:Abstract>{}</wfs:Abstract>\n",
                xml_escape(abstract_text)
            ));
        }
        for (name, xsd_type) in &def.meta.parameters {
            out.push_str(&format!(
                "    <wfs:Parameter name=\"{}\" type=\"{}\"/>\n",
                xml_escape(name),
                xml_escape(xsd_type)
            ));
        }
        for feature_type in registry.iter() {
            out.push_str(&format!(
                "    <wfs:QueryExpressionText returnFeatureTypes=\"{}\" \
                 language=\"urn:ogc:def:queryLanguage:OGC-WFS::WFSQueryExpression\" \
                 isPrivate=\"true\"/>\n",
                xml_escape(&feature_type.xml_name())
            ));
        }
        out.push_str("  </wfs:StoredQueryDescription>\n");
    }
    out.push_str("</wfs:DescribeStoredQueriesResponse>\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_schema::{FeatureType, XsdType};

    fn registries() -> (StoredQueryRegistry, FeatureTypeRegistry) {
        let mut registry = FeatureTypeRegistry::new("http://example.org/gisserver");
        registry.register(
            FeatureType::build("restaurant", "http://example.org/gisserver")
                .field("name", XsdType::String)
                .finish()
                .unwrap(),
        );
        (StoredQueryRegistry::with_builtins(), registry)
    }

    #[test]
    fn lists_the_builtin_query() {
        let (stored, registry) = registries();
        let xml = render_list_stored_queries(&stored, &registry);
        assert!(xml.contains("urn:ogc:def:query:OGC-WFS::GetFeatureById"));
        assert!(xml.contains("<wfs:ReturnFeatureType>app:restaurant</wfs:ReturnFeatureType>"));
    }

    #[test]
    fn describe_includes_parameters() {
        let (stored, registry) = registries();
        let xml = render_describe_stored_queries(&stored, &registry, &[]).unwrap();
        assert!(xml.contains("<wfs:Parameter name=\"ID\" type=\"xs:string\"/>"));
    }

    #[test]
    fn describe_unknown_id_fails() {
        let (stored, registry) = registries();
        assert!(
            render_describe_stored_queries(&stored, &registry, &["urn:nope".to_string()]).is_err()
        );
    }
}
