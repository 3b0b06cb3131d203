//! Operation handlers: turn a parsed request into a response.

use crate::error::{Result, ServerError};
use crate::state::AppState;
use axum::body::Body;
use axum::http::header;
use axum::response::Response;
use meridian_core::WfsError;
use meridian_fes::wfs::requests::{
    DescribeFeatureType, DescribeStoredQueries, GetFeature, GetPropertyValue, QueryExpression,
    ResultType, WfsRequest,
};
use meridian_fes::AdhocQuery;
use meridian_output::capabilities::{render_capabilities, CapabilitiesContext};
use meridian_output::csv::CsvRenderer;
use meridian_output::geojson::GeoJsonRenderer;
use meridian_output::gml32::{self, Gml32Renderer, GmlValueRenderer};
use meridian_output::{stored, xmlschema, OutputFormat};
use meridian_query::collection::effective_page_size;
use meridian_query::{
    compile_query, CompilerContext, FeatureCollection, FeatureProjection, GeoTextFormat,
    GeometryTextRequest, SimpleFeatureCollection,
};
use std::sync::Arc;

const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Dispatch a parsed request. `kvp_pairs` carries the original GET
/// parameters (original casing), used to build pagination links.
pub async fn execute(
    state: &Arc<AppState>,
    request: WfsRequest,
    kvp_pairs: Option<Vec<(String, String)>>,
) -> Result<Response> {
    match request {
        WfsRequest::GetCapabilities(_) => get_capabilities(state),
        WfsRequest::DescribeFeatureType(request) => describe_feature_type(state, request),
        WfsRequest::GetFeature(request) => get_feature(state, request, kvp_pairs).await,
        WfsRequest::GetPropertyValue(request) => get_property_value(state, request).await,
        WfsRequest::ListStoredQueries => Ok(xml_response(
            stored::CONTENT_TYPE,
            stored::render_list_stored_queries(&state.stored_queries, &state.registry),
        )),
        WfsRequest::DescribeStoredQueries(DescribeStoredQueries { stored_query_ids }) => {
            let body = stored::render_describe_stored_queries(
                &state.stored_queries,
                &state.registry,
                &stored_query_ids,
            )?;
            Ok(xml_response(stored::CONTENT_TYPE, body))
        }
    }
}

fn get_capabilities(state: &Arc<AppState>) -> Result<Response> {
    let body = render_capabilities(&CapabilitiesContext {
        service: &state.service,
        registry: &state.registry,
        functions: &state.functions,
        config: &state.config,
        base_url: &state.base_url,
    });
    Ok(xml_response(XML_CONTENT_TYPE, body))
}

fn describe_feature_type(
    state: &Arc<AppState>,
    request: DescribeFeatureType,
) -> Result<Response> {
    if let Some(format) = &request.output_format {
        let normalized = format.to_ascii_uppercase();
        if normalized != "XMLSCHEMA" && !format.contains("gml") && !format.contains("xml") {
            return Err(WfsError::invalid_parameter(
                format!("'{format}' is not a permitted output format."),
                "outputFormat",
            )
            .into());
        }
    }

    let feature_types = if request.type_names.is_empty() {
        state.registry.iter().cloned().collect()
    } else {
        request
            .type_names
            .iter()
            .map(|name| state.registry.resolve(name, "typeNames"))
            .collect::<meridian_core::Result<Vec<_>>>()?
    };
    let body = xmlschema::render_schema(&feature_types, &state.registry.xml_namespace);
    Ok(xml_response(xmlschema::CONTENT_TYPE, body))
}

/// Resolve one query expression into a bound collection slice.
async fn bind_query(
    state: &Arc<AppState>,
    query: &QueryExpression,
    start: u64,
    limit: Option<u64>,
    use_db_rendering_for: Option<OutputFormat>,
) -> Result<(SimpleFeatureCollection, bool)> {
    let (adhoc, standalone): (AdhocQuery, bool) = match query {
        QueryExpression::Adhoc(adhoc) => (adhoc.clone(), false),
        QueryExpression::Stored(invocation) => {
            let resolved = state
                .stored_queries
                .resolve(invocation, state.config.wfs_strict_standard)?;
            (resolved.adhoc, resolved.standalone)
        }
    };

    let type_names = adhoc.effective_type_names();
    let Some(type_name) = type_names.first() else {
        return Err(WfsError::missing_parameter("typeNames")
            .locator(adhoc.query_locator())
            .into());
    };
    let feature_type = state.registry.resolve(type_name, adhoc.query_locator())?;

    let compiler = CompilerContext {
        feature_type: &feature_type,
        functions: &state.functions,
        config: &state.config,
    };
    let mut compiled = compile_query(&adhoc, &compiler)?;

    let mut projection = FeatureProjection::new(
        feature_type.clone(),
        adhoc.property_names.as_deref(),
        adhoc.srs_name.clone(),
        state.config.supported_crs_only,
    )?;
    if standalone {
        projection = projection.standalone();
    }
    projection.apply_to(&mut compiled);

    let mut sub = SimpleFeatureCollection {
        feature_type,
        projection,
        query: compiled,
        start,
        limit,
        number_matched: None,
    };

    if let Some(format) = use_db_rendering_for {
        decorate_for_db_rendering(state, &mut sub, format);
    }

    Ok((sub, standalone))
}

/// Push geometry serialization into the datastore when configured.
fn decorate_for_db_rendering(
    state: &Arc<AppState>,
    sub: &mut SimpleFeatureCollection,
    format: OutputFormat,
) {
    let precision = state.config.coordinate_precision;
    match format {
        OutputFormat::Gml32 => {
            let output_crs = sub.projection.output_crs.clone();
            let mut query = std::mem::take(&mut sub.query);
            gml32::decorate_query(&mut query, sub, &output_crs, precision);
            sub.query = query;
        }
        OutputFormat::Csv => {
            let srid = sub.projection.output_crs.srid;
            let mut requests = Vec::new();
            for id in sub.projection.geometry_elements() {
                let node = sub.projection.node(id);
                if let Some(path) = &node.source_path {
                    requests.push(GeometryTextRequest {
                        name: format!("_as_wkt_{}", path.replace('.', "_")),
                        path: path.clone(),
                        format: GeoTextFormat::Wkt,
                        srid,
                        precision,
                    });
                }
            }
            sub.query.geometry_text.extend(requests);
        }
        OutputFormat::GeoJson => {
            // GeoJSON always emits CRS84.
            if let Some(id) = sub.projection.main_geometry_element() {
                let node = sub.projection.node(id);
                if let Some(path) = &node.source_path {
                    sub.query.geometry_text.push(GeometryTextRequest {
                        name: format!("_as_geojson_{}", path.replace('.', "_")),
                        path: path.clone(),
                        format: GeoTextFormat::GeoJson,
                        srid: 4326,
                        precision,
                    });
                }
            }
        }
    }
}

async fn get_feature(
    state: &Arc<AppState>,
    request: GetFeature,
    kvp_pairs: Option<Vec<(String, String)>>,
) -> Result<Response> {
    let format = OutputFormat::resolve(request.output_format.as_deref())?;
    let limit = match request.result_type {
        ResultType::Hits => Some(0),
        ResultType::Results => effective_page_size(
            request.count,
            format.max_page_size(&state.config),
            &state.config,
        ),
    };

    let db_rendering = state.config.use_db_rendering.then_some(format);
    let mut subs = Vec::with_capacity(request.queries.len());
    let mut standalone = false;
    for query in &request.queries {
        let (mut sub, is_standalone) =
            bind_query(state, query, request.start_index, limit, db_rendering).await?;
        standalone = standalone || is_standalone;
        if request.result_type == ResultType::Hits {
            // Hits always counts, independent of the count policy.
            let count = state
                .store
                .count(&sub.feature_type.name, &sub.query)
                .await
                .map_err(|e| wrap_store_error(state, e))?;
            sub.number_matched = Some(count);
        } else {
            sub.apply_count_policy(state.store.as_ref(), state.config.count_mode)
                .await
                .map_err(|e| wrap_store_error(state, e))?;
        }
        subs.push(sub);
    }

    let ctx = state.render_context();

    if standalone {
        // GetFeatureById renders the bare feature; missing ids become a
        // 404 before any byte is streamed.
        let body = gml32::render_feature_by_id(&ctx, &subs[0]).await?;
        return Ok(xml_response(xmlschema::CONTENT_TYPE, body));
    }

    let mut collection = FeatureCollection::new(subs);
    if request.result_type == ResultType::Results {
        add_pagination_links(
            state,
            &mut collection,
            kvp_pairs.as_deref(),
            request.start_index,
            limit,
        );
    }

    Ok(match format {
        OutputFormat::Gml32 => {
            let renderer = Gml32Renderer { ctx, collection };
            let disposition = renderer.content_disposition();
            streaming_response(format.content_type(), disposition, renderer.into_stream())
        }
        OutputFormat::GeoJson => {
            let renderer = GeoJsonRenderer { ctx, collection };
            let disposition = renderer.content_disposition();
            streaming_response(format.content_type(), disposition, renderer.into_stream())
        }
        OutputFormat::Csv => {
            let mut collection = collection;
            CsvRenderer::prepare(&mut collection);
            let renderer = CsvRenderer { ctx, collection };
            let disposition = renderer.content_disposition();
            streaming_response(format.content_type(), disposition, renderer.into_stream())
        }
    })
}

async fn get_property_value(
    state: &Arc<AppState>,
    request: GetPropertyValue,
) -> Result<Response> {
    let limit = match request.result_type {
        ResultType::Hits => Some(0),
        ResultType::Results => effective_page_size(
            request.count,
            Some(state.config.max_page_size),
            &state.config,
        ),
    };
    let (mut sub, _) = bind_query(state, &request.query, request.start_index, limit, None).await?;

    // Swap the projection for the single requested value.
    sub.projection = FeatureProjection::for_value_reference(
        sub.feature_type.clone(),
        &request.value_reference,
        sub.projection.output_crs.clone().into(),
        state.config.supported_crs_only,
    )
    .map_err(|mut e: WfsError| {
        if e.locator.as_deref() == Some(request.value_reference.xpath.as_str()) {
            e.locator = Some("valueReference".to_string());
        }
        e
    })?;
    {
        let mut query = std::mem::take(&mut sub.query);
        sub.projection.apply_to(&mut query);
        sub.query = query;
    }

    if request.result_type == ResultType::Hits {
        sub.number_matched = Some(
            state
                .store
                .count(&sub.feature_type.name, &sub.query)
                .await
                .map_err(|e| wrap_store_error(state, e))?,
        );
    } else {
        sub.apply_count_policy(state.store.as_ref(), state.config.count_mode)
            .await
            .map_err(|e| wrap_store_error(state, e))?;
    }

    let ctx = state.render_context();
    let collection = FeatureCollection::new(vec![sub]);
    let renderer = GmlValueRenderer { ctx, collection };
    Ok(streaming_response(
        "application/gml+xml; version=3.2",
        String::new(),
        renderer.into_stream(),
    ))
}

/// Datastore failures are wrapped into an actionable client error when
/// configured; otherwise they propagate as a processing failure.
fn wrap_store_error(state: &Arc<AppState>, error: WfsError) -> WfsError {
    if state.config.wrap_filter_db_errors
        && error.code == meridian_core::ExceptionCode::OperationProcessingFailed
    {
        tracing::error!(error = %error, "datastore error while filtering");
        return WfsError::invalid_parameter("Internal error when processing filter", "filter");
    }
    error
}

/// Build next/previous links by replacing STARTINDEX in the original
/// query string, preserving the casing of every other parameter.
fn add_pagination_links(
    state: &Arc<AppState>,
    collection: &mut FeatureCollection,
    kvp_pairs: Option<&[(String, String)]>,
    start: u64,
    limit: Option<u64>,
) {
    let (Some(pairs), Some(limit)) = (kvp_pairs, limit) else {
        return;
    };
    if limit == 0 {
        return;
    }

    if start > 0 {
        let previous = start.saturating_sub(limit);
        collection.previous = Some(build_link(state, pairs, previous));
    }
    if let Some(matched) = collection.number_matched() {
        if start + limit < matched {
            collection.next = Some(build_link(state, pairs, start + limit));
        }
    }
}

fn build_link(state: &Arc<AppState>, pairs: &[(String, String)], start_index: u64) -> String {
    let mut query = String::new();
    let mut replaced = false;
    for (name, value) in pairs {
        let value = if name.eq_ignore_ascii_case("STARTINDEX") {
            replaced = true;
            start_index.to_string()
        } else {
            value.clone()
        };
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "{}={}",
            urlencoding::encode(name),
            urlencoding::encode(&value)
        ));
    }
    if !replaced {
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("STARTINDEX={start_index}"));
    }
    format!("{}?{}", state.base_url, query)
}

fn xml_response(content_type: &str, body: String) -> Response {
    Response::builder()
        .status(200)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .expect("response builder cannot fail")
}

fn streaming_response(
    content_type: &str,
    content_disposition: String,
    stream: impl futures::Stream<Item = bytes::Bytes> + Send + 'static,
) -> Response {
    let stream = futures::StreamExt::map(stream, Ok::<_, std::convert::Infallible>);
    let mut builder = Response::builder()
        .status(200)
        .header(header::CONTENT_TYPE, content_type);
    if !content_disposition.is_empty() {
        builder = builder.header(header::CONTENT_DISPOSITION, content_disposition);
    }
    builder
        .body(Body::from_stream(stream))
        .expect("response builder cannot fail")
}
