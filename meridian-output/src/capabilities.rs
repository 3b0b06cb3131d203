//! GetCapabilities: the service metadata document.

use crate::format::OutputFormat;
use crate::utils::xml_escape;
use meridian_core::ServiceConfig;
use meridian_fes::functions::FunctionRegistry;
use meridian_schema::FeatureTypeRegistry;

/// Service-level metadata shown in the capabilities document.
#[derive(Debug, Clone, Default)]
pub struct ServiceDescription {
    pub title: String,
    pub abstract_text: Option<String>,
    pub keywords: Vec<String>,
    pub provider_name: Option<String>,
    pub provider_site: Option<String>,
    pub contact_person: Option<String>,
}

/// The operations advertised with their KVP parameter domains.
const OPERATIONS: &[(&str, &[(&str, &[&str])])] = &[
    (
        "GetCapabilities",
        &[
            ("AcceptVersions", &["2.0.0"]),
            ("AcceptFormats", &["text/xml"]),
        ],
    ),
    ("DescribeFeatureType", &[]),
    (
        "GetFeature",
        &[("resultType", &["results", "hits"]), ("resolve", &["none"])],
    ),
    (
        "GetPropertyValue",
        &[("resultType", &["results", "hits"]), ("resolve", &["none"])],
    ),
    ("ListStoredQueries", &[]),
    ("DescribeStoredQueries", &[]),
];

const SPATIAL_OPERATORS: &[&str] = &[
    "BBOX", "Equals", "Disjoint", "Intersects", "Touches", "Crosses", "Within", "Contains",
    "Overlaps", "DWithin", "Beyond",
];

const COMPARISON_OPERATORS: &[&str] = &[
    "PropertyIsEqualTo",
    "PropertyIsNotEqualTo",
    "PropertyIsLessThan",
    "PropertyIsGreaterThan",
    "PropertyIsLessThanOrEqualTo",
    "PropertyIsGreaterThanOrEqualTo",
    "PropertyIsLike",
    "PropertyIsNil",
    "PropertyIsNull",
    "PropertyIsBetween",
];

/// The conformance constraints reported by this implementation.
const CONFORMANCE: &[(&str, bool)] = &[
    ("ImplementsBasicWFS", true),
    ("ImplementsTransactionalWFS", false),
    ("ImplementsLockingWFS", false),
    ("KVPEncoding", true),
    ("XMLEncoding", true),
    ("SOAPEncoding", false),
    ("ImplementsInheritance", false),
    ("ImplementsRemoteResolve", false),
    ("ImplementsResultPaging", true),
    ("ImplementsStandardJoins", false),
    ("ImplementsSpatialJoins", false),
    ("ImplementsTemporalJoins", false),
    ("ImplementsFeatureVersioning", false),
    ("ManageStoredQueries", false),
];

pub struct CapabilitiesContext<'a> {
    pub service: &'a ServiceDescription,
    pub registry: &'a FeatureTypeRegistry,
    pub functions: &'a FunctionRegistry,
    pub config: &'a ServiceConfig,
    pub base_url: &'a str,
}

/// Compose the full capabilities document.
pub fn render_capabilities(ctx: &CapabilitiesContext<'_>) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<wfs:WFS_Capabilities version=\"2.0.0\"\n\
         \u{20}\u{20}\u{20}xmlns:wfs=\"http://www.opengis.net/wfs/2.0\"\n\
         \u{20}\u{20}\u{20}xmlns:ows=\"http://www.opengis.net/ows/1.1\"\n\
         \u{20}\u{20}\u{20}xmlns:fes=\"http://www.opengis.net/fes/2.0\"\n\
         \u{20}\u{20}\u{20}xmlns:gml=\"http://www.opengis.net/gml/3.2\"\n\
         \u{20}\u{20}\u{20}xmlns:xlink=\"http://www.w3.org/1999/xlink\"\n\
         \u{20}\u{20}\u{20}xmlns:app=\"{}\">\n",
        xml_escape(&ctx.registry.xml_namespace)
    ));

    render_service_identification(&mut out, ctx.service);
    render_service_provider(&mut out, ctx.service);
    render_operations_metadata(&mut out, ctx);
    render_feature_type_list(&mut out, ctx);
    render_filter_capabilities(&mut out, ctx.functions);

    out.push_str("</wfs:WFS_Capabilities>\n");
    out
}

fn render_service_identification(out: &mut String, service: &ServiceDescription) {
    out.push_str("  <ows:ServiceIdentification>\n");
    out.push_str(&format!(
        "    <ows:Title>{}</ows:Title>\n",
        xml_escape(&service.title)
    ));
    if let Some(abstract_text) = &service.abstract_text {
        out.push_str(&format!(
            "    <ows:Abstract>{}</ows:Abstract>\n",
            xml_escape(abstract_text)
        ));
    }
    if !service.keywords.is_empty() {
        out.push_str("    <ows:Keywords>\n");
        for keyword in &service.keywords {
            out.push_str(&format!(
                "      <ows:Keyword>{}</ows:Keyword>\n",
                xml_escape(keyword)
            ));
        }
        out.push_str("    </ows:Keywords>\n");
    }
    out.push_str(
        "    <ows:ServiceType>WFS</ows:ServiceType>\n\
         \u{20}\u{20}\u{20}\u{20}<ows:ServiceTypeVersion>2.0.0</ows:ServiceTypeVersion>\n\
         \u{20}\u{20}</ows:ServiceIdentification>\n",
    );
}

fn render_service_provider(out: &mut String, service: &ServiceDescription) {
    out.push_str("  <ows:ServiceProvider>\n");
    if let Some(name) = &service.provider_name {
        out.push_str(&format!(
            "    <ows:ProviderName>{}</ows:ProviderName>\n",
            xml_escape(name)
        ));
    }
    if let Some(site) = &service.provider_site {
        out.push_str(&format!(
            "    <ows:ProviderSite xlink:href=\"{}\"/>\n",
            xml_escape(site)
        ));
    }
    if let Some(contact) = &service.contact_person {
        out.push_str(&format!(
            "    <ows:ServiceContact><ows:IndividualName>{}</ows:IndividualName></ows:ServiceContact>\n",
            xml_escape(contact)
        ));
    }
    out.push_str("  </ows:ServiceProvider>\n");
}

fn render_operations_metadata(out: &mut String, ctx: &CapabilitiesContext<'_>) {
    let url = xml_escape(ctx.base_url);
    out.push_str("  <ows:OperationsMetadata>\n");
    for (name, parameters) in OPERATIONS {
        out.push_str(&format!("    <ows:Operation name=\"{name}\">\n"));
        out.push_str(&format!(
            "      <ows:DCP><ows:HTTP>\
             <ows:Get xlink:href=\"{url}\"/>\
             <ows:Post xlink:href=\"{url}\"/>\
             </ows:HTTP></ows:DCP>\n"
        ));
        if matches!(*name, "GetFeature" | "GetPropertyValue") {
            render_allowed_values(out, "outputFormat", &output_format_values());
        }
        for (parameter, values) in *parameters {
            render_allowed_values(
                out,
                parameter,
                &values.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
            );
        }
        out.push_str("    </ows:Operation>\n");
    }

    out.push_str(&format!(
        "    <ows:Parameter name=\"version\"><ows:AllowedValues>\
         <ows:Value>2.0.0</ows:Value></ows:AllowedValues></ows:Parameter>\n"
    ));
    for (constraint, implemented) in CONFORMANCE {
        out.push_str(&format!(
            "    <ows:Constraint name=\"{constraint}\">\
             <ows:NoValues/><ows:DefaultValue>{}</ows:DefaultValue>\
             </ows:Constraint>\n",
            if *implemented { "TRUE" } else { "FALSE" }
        ));
    }
    out.push_str(&format!(
        "    <ows:Constraint name=\"CountDefault\">\
         <ows:NoValues/><ows:DefaultValue>{}</ows:DefaultValue></ows:Constraint>\n",
        ctx.config.default_page_size
    ));
    out.push_str("  </ows:OperationsMetadata>\n");
}

fn render_allowed_values(out: &mut String, name: &str, values: &[String]) {
    out.push_str(&format!(
        "      <ows:Parameter name=\"{name}\"><ows:AllowedValues>"
    ));
    for value in values {
        out.push_str(&format!("<ows:Value>{}</ows:Value>", xml_escape(value)));
    }
    out.push_str("</ows:AllowedValues></ows:Parameter>\n");
}

fn output_format_values() -> Vec<String> {
    OutputFormat::all()
        .iter()
        .flat_map(|f| f.advertised())
        .map(str::to_string)
        .collect()
}

fn render_feature_type_list(out: &mut String, ctx: &CapabilitiesContext<'_>) {
    out.push_str("  <wfs:FeatureTypeList>\n");
    for feature_type in ctx.registry.iter() {
        out.push_str("    <wfs:FeatureType>\n");
        out.push_str(&format!(
            "      <wfs:Name>{}</wfs:Name>\n",
            xml_escape(&feature_type.xml_name())
        ));
        out.push_str(&format!(
            "      <wfs:Title>{}</wfs:Title>\n",
            xml_escape(&feature_type.title)
        ));
        if let Some(abstract_text) = &feature_type.abstract_text {
            out.push_str(&format!(
                "      <wfs:Abstract>{}</wfs:Abstract>\n",
                xml_escape(abstract_text)
            ));
        }
        if !feature_type.keywords.is_empty() {
            out.push_str("      <ows:Keywords>");
            for keyword in &feature_type.keywords {
                out.push_str(&format!(
                    "<ows:Keyword>{}</ows:Keyword>",
                    xml_escape(keyword)
                ));
            }
            out.push_str("</ows:Keywords>\n");
        }
        out.push_str(&format!(
            "      <wfs:DefaultCRS>{}</wfs:DefaultCRS>\n",
            xml_escape(&feature_type.crs.urn())
        ));
        for crs in &feature_type.other_crs {
            out.push_str(&format!(
                "      <wfs:OtherCRS>{}</wfs:OtherCRS>\n",
                xml_escape(&crs.urn())
            ));
        }
        out.push_str("      <wfs:OutputFormats>");
        for format in output_format_values() {
            out.push_str(&format!("<wfs:Format>{}</wfs:Format>", xml_escape(&format)));
        }
        out.push_str("</wfs:OutputFormats>\n");

        if ctx.config.capabilities_bounding_box {
            if let Some(bbox) = &feature_type.wgs84_bounding_box {
                out.push_str(&format!(
                    "      <ows:WGS84BoundingBox>\
                     <ows:LowerCorner>{} {}</ows:LowerCorner>\
                     <ows:UpperCorner>{} {}</ows:UpperCorner>\
                     </ows:WGS84BoundingBox>\n",
                    bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y
                ));
            }
        }
        out.push_str("    </wfs:FeatureType>\n");
    }
    out.push_str("  </wfs:FeatureTypeList>\n");
}

fn render_filter_capabilities(out: &mut String, functions: &FunctionRegistry) {
    out.push_str("  <fes:Filter_Capabilities>\n");
    out.push_str(
        "    <fes:Conformance>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:Constraint name=\"ImplementsQuery\">\
         <ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:Constraint name=\"ImplementsAdHocQuery\">\
         <ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:Constraint name=\"ImplementsResourceId\">\
         <ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:Constraint name=\"ImplementsMinStandardFilter\">\
         <ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:Constraint name=\"ImplementsStandardFilter\">\
         <ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:Constraint name=\"ImplementsMinSpatialFilter\">\
         <ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:Constraint name=\"ImplementsSpatialFilter\">\
         <ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:Constraint name=\"ImplementsSorting\">\
         <ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:Constraint name=\"ImplementsTemporalFilter\">\
         <ows:NoValues/><ows:DefaultValue>FALSE</ows:DefaultValue></fes:Constraint>\n\
         \u{20}\u{20}\u{20}\u{20}</fes:Conformance>\n",
    );
    out.push_str(
        "    <fes:Id_Capabilities>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:ResourceIdentifier name=\"fes:ResourceId\"/>\n\
         \u{20}\u{20}\u{20}\u{20}</fes:Id_Capabilities>\n",
    );

    out.push_str(
        "    <fes:Scalar_Capabilities>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:LogicalOperators/>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:ComparisonOperators>\n",
    );
    for operator in COMPARISON_OPERATORS {
        out.push_str(&format!(
            "        <fes:ComparisonOperator name=\"{operator}\"/>\n"
        ));
    }
    out.push_str(
        "      </fes:ComparisonOperators>\n\
         \u{20}\u{20}\u{20}\u{20}</fes:Scalar_Capabilities>\n",
    );

    out.push_str(
        "    <fes:Spatial_Capabilities>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:GeometryOperands>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:GeometryOperand name=\"gml:Envelope\"/>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:GeometryOperand name=\"gml:Point\"/>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:GeometryOperand name=\"gml:LineString\"/>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:GeometryOperand name=\"gml:Polygon\"/>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}</fes:GeometryOperands>\n\
         \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}<fes:SpatialOperators>\n",
    );
    for operator in SPATIAL_OPERATORS {
        out.push_str(&format!(
            "        <fes:SpatialOperator name=\"{operator}\"/>\n"
        ));
    }
    out.push_str(
        "      </fes:SpatialOperators>\n\
         \u{20}\u{20}\u{20}\u{20}</fes:Spatial_Capabilities>\n",
    );

    if !functions.is_empty() {
        out.push_str("    <fes:Functions>\n");
        let mut defs: Vec<_> = functions.iter().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        for def in defs {
            out.push_str(&format!(
                "      <fes:Function name=\"{}\">\n        <fes:Returns>{}</fes:Returns>\n",
                xml_escape(&def.name),
                def.return_type
            ));
            if !def.argument_types.is_empty() {
                out.push_str("        <fes:Arguments>\n");
                for (i, argument) in def.argument_types.iter().enumerate() {
                    out.push_str(&format!(
                        "          <fes:Argument name=\"arg{}\"><fes:Type>{argument}</fes:Type></fes:Argument>\n",
                        i + 1
                    ));
                }
                out.push_str("        </fes:Arguments>\n");
            }
            out.push_str("      </fes:Function>\n");
        }
        out.push_str("    </fes:Functions>\n");
    }

    out.push_str("  </fes:Filter_Capabilities>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::GeometryType;
    use meridian_schema::{FeatureType, XsdType};

    fn context_parts() -> (
        ServiceDescription,
        FeatureTypeRegistry,
        FunctionRegistry,
        ServiceConfig,
    ) {
        let service = ServiceDescription {
            title: "Places".to_string(),
            ..ServiceDescription::default()
        };
        let mut registry = FeatureTypeRegistry::new("http://example.org/gisserver");
        registry.register(
            FeatureType::build("restaurant", "http://example.org/gisserver")
                .title("Restaurants")
                .crs(meridian_core::Crs::from_srid(28992).unwrap())
                .geometry("location", GeometryType::Point)
                .field("name", XsdType::String)
                .finish()
                .unwrap(),
        );
        (
            service,
            registry,
            FunctionRegistry::with_defaults(),
            ServiceConfig::default(),
        )
    }

    #[test]
    fn capabilities_lists_the_feature_type() {
        let (service, registry, functions, config) = context_parts();
        let xml = render_capabilities(&CapabilitiesContext {
            service: &service,
            registry: &registry,
            functions: &functions,
            config: &config,
            base_url: "http://testserver/wfs",
        });
        assert!(xml.contains("<wfs:Name>app:restaurant</wfs:Name>"));
        assert!(xml.contains("<wfs:DefaultCRS>urn:ogc:def:crs:EPSG::28992</wfs:DefaultCRS>"));
        assert!(xml.contains("<wfs:Format>application/geo+json</wfs:Format>"));
        assert!(xml.contains("<fes:SpatialOperator name=\"BBOX\"/>"));
        assert!(xml.contains("ImplementsResultPaging"));
        assert!(xml.contains("<fes:Function name=\"abs\">"));
    }
}
