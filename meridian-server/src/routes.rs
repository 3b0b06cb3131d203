//! HTTP route handlers and router configuration.

use crate::error::ServerError;
use crate::operations;
use crate::state::AppState;
use axum::extract::{RawQuery, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use meridian_fes::xml::parse_xml_document;
use meridian_fes::{KvpRequest, WfsRequest};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/wfs", get(handle_get).post(handle_post))
        .route("/wfs/", get(handle_get).post(handle_post))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// KVP entry point: `GET /wfs?SERVICE=WFS&REQUEST=…`.
async fn handle_get(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Response {
    let result = async {
        let query = query.unwrap_or_default();
        let kvp = KvpRequest::from_query_string(&query, &state.app_aliases())?;
        let request = WfsRequest::from_kvp(&kvp)?;
        tracing::debug!(request = ?request_name(&request), "dispatching KVP request");
        operations::execute(&state, request, Some(kvp.original.clone())).await
    }
    .await;
    unwrap_response(result)
}

/// XML entry point: `POST /wfs` with a request document body.
async fn handle_post(State(state): State<Arc<AppState>>, body: String) -> Response {
    let result = async {
        let root = parse_xml_document(&body, None)?;
        let request = WfsRequest::from_xml(&root)?;
        tracing::debug!(request = ?request_name(&request), "dispatching XML request");
        operations::execute(&state, request, None).await
    }
    .await;
    unwrap_response(result)
}

fn unwrap_response(result: Result<Response, ServerError>) -> Response {
    match result {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

fn request_name(request: &WfsRequest) -> &'static str {
    match request {
        WfsRequest::GetCapabilities(_) => "GetCapabilities",
        WfsRequest::DescribeFeatureType(_) => "DescribeFeatureType",
        WfsRequest::GetFeature(_) => "GetFeature",
        WfsRequest::GetPropertyValue(_) => "GetPropertyValue",
        WfsRequest::ListStoredQueries => "ListStoredQueries",
        WfsRequest::DescribeStoredQueries(_) => "DescribeStoredQueries",
    }
}
