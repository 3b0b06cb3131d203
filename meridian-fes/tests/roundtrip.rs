//! The KVP format is defined as a lowering onto the XML form: for every
//! request, parsing the KVP encoding must produce an AST structurally
//! equal to parsing the equivalent XML document.

use meridian_fes::xml::parse_xml_document;
use meridian_fes::{KvpRequest, WfsRequest};
use std::collections::HashMap;

fn app_aliases() -> HashMap<String, String> {
    HashMap::from([(
        "app".to_string(),
        "http://example.org/gisserver".to_string(),
    )])
}

fn from_kvp(query: &str) -> WfsRequest {
    let kvp = KvpRequest::from_query_string(query, &app_aliases()).unwrap();
    WfsRequest::from_kvp(&kvp).unwrap()
}

fn from_xml(document: &str) -> WfsRequest {
    let root = parse_xml_document(document, None).unwrap();
    WfsRequest::from_xml(&root).unwrap()
}

#[test]
fn get_feature_with_filter_and_sorting() {
    let filter = r#"<Filter><PropertyIsGreaterThanOrEqualTo><ValueReference>app:rating</ValueReference><Literal>3.0</Literal></PropertyIsGreaterThanOrEqualTo></Filter>"#;
    let kvp = from_kvp(&format!(
        "SERVICE=WFS&VERSION=2.0.0&REQUEST=GetFeature&TYPENAMES=app:restaurant\
         &COUNT=10&STARTINDEX=5&SORTBY=rating%20DESC,name&FILTER={}",
        urlencoding::encode(filter)
    ));

    let xml = from_xml(
        r#"<wfs:GetFeature service="WFS" version="2.0.0" count="10" startIndex="5"
               xmlns:wfs="http://www.opengis.net/wfs/2.0"
               xmlns:fes="http://www.opengis.net/fes/2.0"
               xmlns:app="http://example.org/gisserver">
             <wfs:Query typeNames="app:restaurant">
               <fes:Filter>
                 <fes:PropertyIsGreaterThanOrEqualTo>
                   <fes:ValueReference>app:rating</fes:ValueReference>
                   <fes:Literal>3.0</fes:Literal>
                 </fes:PropertyIsGreaterThanOrEqualTo>
               </fes:Filter>
               <fes:SortBy>
                 <fes:SortProperty>
                   <fes:ValueReference>rating</fes:ValueReference>
                   <fes:SortOrder>DESC</fes:SortOrder>
                 </fes:SortProperty>
                 <fes:SortProperty>
                   <fes:ValueReference>name</fes:ValueReference>
                 </fes:SortProperty>
               </fes:SortBy>
             </wfs:Query>
           </wfs:GetFeature>"#,
    );

    assert_eq!(kvp, xml);
}

#[test]
fn get_feature_with_resource_ids() {
    let kvp = from_kvp(
        "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:restaurant\
         &RESOURCEID=restaurant.1,restaurant.5",
    );
    let xml = from_xml(
        r#"<wfs:GetFeature service="WFS" version="2.0.0"
               xmlns:wfs="http://www.opengis.net/wfs/2.0"
               xmlns:fes="http://www.opengis.net/fes/2.0"
               xmlns:app="http://example.org/gisserver">
             <wfs:Query typeNames="app:restaurant">
               <fes:Filter>
                 <fes:ResourceId rid="restaurant.1"/>
                 <fes:ResourceId rid="restaurant.5"/>
               </fes:Filter>
             </wfs:Query>
           </wfs:GetFeature>"#,
    );
    assert_eq!(kvp, xml);
}

#[test]
fn get_feature_with_bbox() {
    // The KVP BBOX parameter lowers onto the same single-operand
    // <fes:BBOX> predicate the XML form spells out.
    let kvp = from_kvp(
        "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:restaurant\
         &BBOX=4.58,52.03,5.31,52.49,urn:ogc:def:crs:OGC::CRS84",
    );
    let xml = from_xml(
        r#"<wfs:GetFeature service="WFS" version="2.0.0"
               xmlns:wfs="http://www.opengis.net/wfs/2.0"
               xmlns:fes="http://www.opengis.net/fes/2.0"
               xmlns:gml="http://www.opengis.net/gml/3.2"
               xmlns:app="http://example.org/gisserver">
             <wfs:Query typeNames="app:restaurant">
               <fes:Filter>
                 <fes:BBOX>
                   <gml:Envelope srsName="urn:ogc:def:crs:OGC::CRS84">
                     <gml:lowerCorner>4.58 52.03</gml:lowerCorner>
                     <gml:upperCorner>5.31 52.49</gml:upperCorner>
                   </gml:Envelope>
                 </fes:BBOX>
               </fes:Filter>
             </wfs:Query>
           </wfs:GetFeature>"#,
    );
    assert_eq!(kvp, xml);
}

#[test]
fn get_property_value_forms_agree() {
    let kvp = from_kvp(
        "SERVICE=WFS&REQUEST=GetPropertyValue&TYPENAMES=app:restaurant\
         &VALUEREFERENCE=app:name",
    );
    let xml = from_xml(
        r#"<wfs:GetPropertyValue service="WFS" version="2.0.0" valueReference="app:name"
               xmlns:wfs="http://www.opengis.net/wfs/2.0"
               xmlns:app="http://example.org/gisserver">
             <wfs:Query typeNames="app:restaurant"/>
           </wfs:GetPropertyValue>"#,
    );
    assert_eq!(kvp, xml);
}

#[test]
fn stored_query_forms_agree() {
    let kvp = from_kvp(
        "SERVICE=WFS&REQUEST=GetFeature\
         &STOREDQUERY_ID=urn:ogc:def:query:OGC-WFS::GetFeatureById&ID=restaurant.3",
    );
    let xml = from_xml(
        r#"<wfs:GetFeature service="WFS" version="2.0.0"
               xmlns:wfs="http://www.opengis.net/wfs/2.0">
             <wfs:StoredQuery id="urn:ogc:def:query:OGC-WFS::GetFeatureById">
               <wfs:Parameter name="ID">restaurant.3</wfs:Parameter>
             </wfs:StoredQuery>
           </wfs:GetFeature>"#,
    );
    // The KVP form carries every parameter along; compare the invocations
    // on the fields that matter.
    match (kvp, xml) {
        (
            WfsRequest::GetFeature(kvp_request),
            WfsRequest::GetFeature(xml_request),
        ) => {
            let kvp_query = &kvp_request.queries[0];
            let xml_query = &xml_request.queries[0];
            match (kvp_query, xml_query) {
                (
                    meridian_fes::QueryExpression::Stored(kvp_invocation),
                    meridian_fes::QueryExpression::Stored(xml_invocation),
                ) => {
                    assert_eq!(kvp_invocation.id, xml_invocation.id);
                    assert_eq!(
                        kvp_invocation.parameters.get("ID"),
                        xml_invocation.parameters.get("ID")
                    );
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        other => panic!("unexpected {other:?}"),
    }
}
