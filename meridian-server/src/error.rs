//! HTTP mapping for WFS exceptions.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use meridian_core::WfsError;
use meridian_output::exception_report;

/// Wrapper so `WfsError` can be returned straight from handlers.
#[derive(Debug)]
pub struct ServerError(pub WfsError);

impl From<WfsError> for ServerError {
    fn from(error: WfsError) -> Self {
        ServerError(error)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        tracing::debug!(
            status = status.as_u16(),
            code = self.0.code.as_str(),
            locator = self.0.locator.as_deref().unwrap_or(""),
            "returning exception report"
        );
        (
            status,
            [("content-type", "text/xml; charset=utf-8")],
            exception_report(&self.0),
        )
            .into_response()
    }
}

/// Result alias for handlers.
pub type Result<T> = std::result::Result<T, ServerError>;
