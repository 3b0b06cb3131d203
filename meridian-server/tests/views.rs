//! End-to-end tests over the demo dataset: one `restaurant` feature type
//! in namespace `http://example.org/gisserver`, default CRS EPSG:28992.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use meridian_core::ServiceConfig;
use meridian_server::{demo, WfsServer};
use serde_json::Value;
use tower::ServiceExt;

fn server() -> WfsServer {
    server_with(ServiceConfig::default())
}

fn server_with(config: ServiceConfig) -> WfsServer {
    WfsServer::new(demo::demo_state(config, "http://testserver/wfs"))
}

async fn get(server: &WfsServer, query: &str) -> (StatusCode, String, String) {
    let request = Request::builder()
        .uri(format!("/wfs?{query}"))
        .body(Body::empty())
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap(), content_type)
}

async fn post(server: &WfsServer, body: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri("/wfs")
        .header("content-type", "application/xml")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn get_capabilities() {
    let server = server();
    let (status, body, content_type) =
        get(&server, "SERVICE=WFS&REQUEST=GetCapabilities").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(content_type.starts_with("text/xml"));
    assert!(body.contains("<wfs:Name>app:restaurant</wfs:Name>"));
    assert!(body.contains("<wfs:DefaultCRS>urn:ogc:def:crs:EPSG::28992</wfs:DefaultCRS>"));
    assert!(body.contains("<wfs:Format>application/geo+json</wfs:Format>"));
}

#[tokio::test]
async fn get_feature_gml_reprojected_to_wgs84() {
    let server = server();
    let (status, body, content_type) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:restaurant&COUNT=2\
         &SRSNAME=urn:ogc:def:crs:EPSG::4326",
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(content_type.starts_with("application/gml+xml"));
    assert!(body.contains("numberReturned=\"2\""));
    assert!(body.contains("numberMatched=\"4\""));
    assert!(body.contains("gml:id=\"restaurant.1\""));
    assert!(body.contains("srsName=\"urn:ogc:def:crs:EPSG::4326\""));
    // Authority order for the 4326 urn is latitude-first.
    let pos = body
        .split("<gml:pos srsDimension=\"2\">")
        .nth(1)
        .and_then(|rest| rest.split('<').next())
        .expect("a gml:pos in the output");
    let mut parts = pos.split(' ');
    let lat: f64 = parts.next().unwrap().parse().unwrap();
    let lon: f64 = parts.next().unwrap().parse().unwrap();
    assert!((50.0..54.0).contains(&lat), "latitude first, got {pos}");
    assert!((3.0..7.0).contains(&lon), "longitude second, got {pos}");
}

#[tokio::test]
async fn get_feature_geojson_in_crs84() {
    let server = server();
    let (status, body, content_type) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:restaurant&OUTPUTFORMAT=geojson\
         &BBOX=4.58,52.03,5.31,52.49,urn:ogc:def:crs:OGC::CRS84",
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(content_type.starts_with("application/geo+json"));

    let document: Value = serde_json::from_str(&body).expect("valid JSON");
    assert_eq!(document["type"], "FeatureCollection");
    assert_eq!(
        document["crs"]["properties"]["name"],
        "urn:ogc:def:crs:OGC::CRS84"
    );
    let features = document["features"].as_array().unwrap();
    assert_eq!(features.len(), 4);
    for feature in features {
        let coordinates = feature["geometry"]["coordinates"].as_array().unwrap();
        let lon = coordinates[0].as_f64().unwrap();
        let lat = coordinates[1].as_f64().unwrap();
        assert!((4.58..=5.31).contains(&lon), "longitude first: {lon}");
        assert!((52.03..=52.49).contains(&lat), "latitude second: {lat}");
    }
    assert_eq!(document["numberReturned"], 4);
    assert_eq!(document["numberMatched"], 4);
}

#[tokio::test]
async fn post_get_feature_with_and_filter() {
    let server = server();
    let body = r#"<?xml version="1.0"?>
<wfs:GetFeature service="WFS" version="2.0.0"
    xmlns:wfs="http://www.opengis.net/wfs/2.0"
    xmlns:fes="http://www.opengis.net/fes/2.0"
    xmlns:gml="http://www.opengis.net/gml/3.2"
    xmlns:app="http://example.org/gisserver">
  <wfs:Query typeNames="app:restaurant">
    <fes:Filter>
      <fes:And>
        <fes:BBOX>
          <gml:Envelope srsName="urn:ogc:def:crs:OGC::CRS84">
            <gml:lowerCorner>4.58 52.20</gml:lowerCorner>
            <gml:upperCorner>5.31 52.49</gml:upperCorner>
          </gml:Envelope>
        </fes:BBOX>
        <fes:PropertyIsGreaterThanOrEqualTo>
          <fes:ValueReference>app:rating</fes:ValueReference>
          <fes:Literal>3.0</fes:Literal>
        </fes:PropertyIsGreaterThanOrEqualTo>
      </fes:And>
    </fes:Filter>
  </wfs:Query>
</wfs:GetFeature>"#;
    let (status, body) = post(&server, body).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    // The envelope covers Amsterdam only; rating >= 3.0 keeps 1 and 4.
    assert!(body.contains("gml:id=\"restaurant.1\""));
    assert!(body.contains("gml:id=\"restaurant.4\""));
    assert!(!body.contains("gml:id=\"restaurant.2\""));
    assert!(!body.contains("gml:id=\"restaurant.3\""));
}

#[tokio::test]
async fn get_feature_by_id_not_found() {
    let server = server();
    let (status, body, _) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetFeature\
         &STOREDQUERY_ID=urn:ogc:def:query:OGC-WFS::GetFeatureById&ID=restaurant.999999",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("<ows:ExceptionReport"));
    assert!(body.contains("NotFound"));
}

#[tokio::test]
async fn get_feature_by_id_malformed_id() {
    let server = server();
    let (status, body, _) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetFeature\
         &STOREDQUERY_ID=urn:ogc:def:query:OGC-WFS::GetFeatureById&ID=garbage",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("InvalidParameterValue"));

    let strict = server_with(ServiceConfig {
        wfs_strict_standard: true,
        ..ServiceConfig::default()
    });
    let (status, _, _) = get(
        &strict,
        "SERVICE=WFS&REQUEST=GetFeature\
         &STOREDQUERY_ID=urn:ogc:def:query:OGC-WFS::GetFeatureById&ID=garbage",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_feature_by_id_renders_bare_feature() {
    let server = server();
    let (status, body, _) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetFeature\
         &STOREDQUERY_ID=urn:ogc:def:query:OGC-WFS::GetFeatureById&ID=restaurant.2",
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(!body.contains("wfs:FeatureCollection"));
    assert!(body.contains("gml:id=\"restaurant.2\""));
    assert!(body.contains("Snackbar Goud"));
}

#[tokio::test]
async fn get_feature_with_like_filter() {
    let server = server();
    let filter = urlencoding::encode(
        r#"<Filter><PropertyIsLike wildCard="*" singleChar="." escapeChar="\"><ValueReference>app:name</ValueReference><Literal>Caf*</Literal></PropertyIsLike></Filter>"#,
    )
    .into_owned();
    let (status, body, _) = get(
        &server,
        &format!("SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:restaurant&FILTER={filter}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body.contains("Café Noir"));
    assert!(body.contains("Café Brecht"));
    assert!(!body.contains("Snackbar"));
    assert!(body.contains("numberReturned=\"2\""));
}

#[tokio::test]
async fn pagination_is_deterministic_and_linked() {
    let server = server();
    let mut seen = Vec::new();
    for start in [0, 2] {
        let (status, body, _) = get(
            &server,
            &format!(
                "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:restaurant\
                 &SORTBY=rating%20DESC&COUNT=2&STARTINDEX={start}"
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        for piece in body.split("gml:id=\"restaurant.").skip(1) {
            let id: String = piece.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !piece[id.len()..].starts_with('.') {
                // Skip per-geometry ids (restaurant.N.seq).
                seen.push(id.clone());
            }
        }
    }
    // rating DESC: 4.5 (1), 3.5 (3), 3.0 (4), 2.0 (2).
    assert_eq!(seen, vec!["1", "3", "4", "2"]);

    let (_, first_page, _) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:restaurant&COUNT=2&STARTINDEX=0",
    )
    .await;
    assert!(first_page.contains("next=\""));
    assert!(!first_page.contains("previous=\""));
}

#[tokio::test]
async fn result_type_hits_counts_without_members() {
    let server = server();
    let (status, body, _) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:restaurant&RESULTTYPE=hits",
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body.contains("numberMatched=\"4\""));
    assert!(body.contains("numberReturned=\"0\""));
    assert!(!body.contains("<wfs:member>"));
}

#[tokio::test]
async fn count_policy_never_reports_unknown() {
    let server = server_with(ServiceConfig {
        count_mode: meridian_core::CountMode::Never,
        ..ServiceConfig::default()
    });
    let (_, body, _) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:restaurant",
    )
    .await;
    assert!(body.contains("numberMatched=\"unknown\""));
}

#[tokio::test]
async fn describe_feature_type() {
    let server = server();
    let (status, body, content_type) = get(
        &server,
        "SERVICE=WFS&REQUEST=DescribeFeatureType&TYPENAMES=app:restaurant",
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(content_type.starts_with("application/gml+xml"));
    assert!(body.contains("<xs:element name=\"restaurant\""));
    assert!(body.contains("gml:PointPropertyType"));
}

#[tokio::test]
async fn csv_output_renders_wkt() {
    let server = server();
    let (status, body, content_type) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:restaurant&OUTPUTFORMAT=csv&COUNT=1",
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(content_type.starts_with("text/csv"));
    let mut lines = body.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("id,"));
    assert!(header.contains("city.name"));
    let row = lines.next().unwrap();
    assert!(row.contains("POINT"));
}

#[tokio::test]
async fn get_property_value() {
    let server = server();
    let (status, body, _) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetPropertyValue&TYPENAMES=app:restaurant\
         &VALUEREFERENCE=app:name&SORTBY=name",
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body.contains("<wfs:ValueCollection"));
    assert!(body.contains("<wfs:member><app:name>Café Brecht</app:name></wfs:member>"));
}

#[tokio::test]
async fn stored_query_listing() {
    let server = server();
    let (status, body, _) = get(&server, "SERVICE=WFS&REQUEST=ListStoredQueries").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("urn:ogc:def:query:OGC-WFS::GetFeatureById"));

    let (status, body, _) = get(&server, "SERVICE=WFS&REQUEST=DescribeStoredQueries").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<wfs:Parameter name=\"ID\" type=\"xs:string\"/>"));
}

#[tokio::test]
async fn unknown_operation_is_rejected() {
    let server = server();
    let (status, body, _) = get(&server, "SERVICE=WFS&REQUEST=Transaction").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("OperationNotSupported"));
}

#[tokio::test]
async fn unknown_typename_is_rejected() {
    let server = server();
    let (status, body, _) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:nonexistent",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("InvalidParameterValue"));
    assert!(body.contains("nonexistent"));
}

#[tokio::test]
async fn missing_request_parameter() {
    let server = server();
    let (status, body, _) = get(&server, "SERVICE=WFS").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("MissingParameterValue"));
}

#[tokio::test]
async fn bbox_with_filter_conflict() {
    let server = server();
    let filter = urlencoding::encode("<Filter><ResourceId rid=\"restaurant.1\"/></Filter>");
    let (status, body, _) = get(
        &server,
        &format!(
            "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:restaurant\
             &BBOX=1,2,3,4&FILTER={filter}"
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("mutually exclusive"));
}

#[tokio::test]
async fn resourceid_kvp_selects_features() {
    let server = server();
    let (status, body, _) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetFeature&RESOURCEID=restaurant.1,restaurant.3",
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body.contains("numberReturned=\"2\""));
    assert!(body.contains("gml:id=\"restaurant.1\""));
    assert!(body.contains("gml:id=\"restaurant.3\""));
}

#[tokio::test]
async fn legacy_epsg_4326_notation_is_longitude_first() {
    let server = server();
    let (status, body, _) = get(
        &server,
        "SERVICE=WFS&REQUEST=GetFeature&TYPENAMES=app:restaurant&COUNT=1&SRSNAME=EPSG:4326",
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let pos = body
        .split("<gml:pos srsDimension=\"2\">")
        .nth(1)
        .and_then(|rest| rest.split('<').next())
        .expect("a gml:pos in the output");
    let first: f64 = pos.split(' ').next().unwrap().parse().unwrap();
    assert!((3.0..7.0).contains(&first), "longitude first, got {pos}");
}
