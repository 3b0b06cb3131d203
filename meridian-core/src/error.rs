//! The OGC exception taxonomy with HTTP status mapping.
//!
//! Every user-facing failure in the server maps onto one `ExceptionCode`,
//! which is what ends up in the `ows:ExceptionReport` body. The `locator`
//! names the parameter or XPath that caused the failure, where known.

use thiserror::Error;

/// OGC `exceptionCode` values implemented by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    /// Malformed XML or an unexpected child element.
    OperationParsingFailed,
    /// Downstream datastore or transform failure.
    OperationProcessingFailed,
    /// Semantically invalid value (unknown CRS, type name, XPath, literal).
    InvalidParameterValue,
    /// Required parameter absent.
    MissingParameterValue,
    /// Recognized but unsupported option.
    OptionNotSupported,
    /// `REQUEST=` names an operation this server does not implement.
    OperationNotSupported,
    /// Client insisted on an unsupported protocol version.
    VersionNegotiationFailed,
    /// The requested resource id could not be found.
    NotFound,
    /// Fallback for unexpected failures.
    NoApplicableCode,
}

impl ExceptionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionCode::OperationParsingFailed => "OperationParsingFailed",
            ExceptionCode::OperationProcessingFailed => "OperationProcessingFailed",
            ExceptionCode::InvalidParameterValue => "InvalidParameterValue",
            ExceptionCode::MissingParameterValue => "MissingParameterValue",
            ExceptionCode::OptionNotSupported => "OptionNotSupported",
            ExceptionCode::OperationNotSupported => "OperationNotSupported",
            ExceptionCode::VersionNegotiationFailed => "VersionNegotiationFailed",
            ExceptionCode::NotFound => "NotFound",
            ExceptionCode::NoApplicableCode => "NoApplicableCode",
        }
    }

    /// Default HTTP status for this code. 400 is the most common in the spec.
    pub fn default_status(&self) -> u16 {
        match self {
            ExceptionCode::OperationProcessingFailed => 500,
            ExceptionCode::NoApplicableCode => 500,
            ExceptionCode::NotFound => 404,
            _ => 400,
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A WFS exception: the data behind an `ows:ExceptionReport`.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{code}: {text}")]
pub struct WfsError {
    pub code: ExceptionCode,
    pub text: String,
    pub locator: Option<String>,
    pub status: u16,
}

impl WfsError {
    pub fn new(code: ExceptionCode, text: impl Into<String>) -> Self {
        WfsError {
            code,
            text: text.into(),
            locator: None,
            status: code.default_status(),
        }
    }

    /// Attach the parameter name or XPath that caused the failure.
    pub fn locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    /// Override the HTTP status code.
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn invalid_parameter(text: impl Into<String>, locator: impl Into<String>) -> Self {
        Self::new(ExceptionCode::InvalidParameterValue, text).locator(locator)
    }

    pub fn missing_parameter(locator: impl Into<String>) -> Self {
        let locator = locator.into();
        Self::new(
            ExceptionCode::MissingParameterValue,
            format!("Missing required '{locator}' parameter."),
        )
        .locator(locator)
    }

    pub fn parsing_failed(text: impl Into<String>, locator: impl Into<String>) -> Self {
        Self::new(ExceptionCode::OperationParsingFailed, text).locator(locator)
    }

    pub fn processing_failed(text: impl Into<String>) -> Self {
        Self::new(ExceptionCode::OperationProcessingFailed, text)
    }

    pub fn option_not_supported(text: impl Into<String>, locator: impl Into<String>) -> Self {
        Self::new(ExceptionCode::OptionNotSupported, text).locator(locator)
    }

    pub fn operation_not_supported(text: impl Into<String>) -> Self {
        Self::new(ExceptionCode::OperationNotSupported, text)
    }

    pub fn version_negotiation_failed(text: impl Into<String>) -> Self {
        Self::new(ExceptionCode::VersionNegotiationFailed, text).locator("acceptVersions")
    }

    pub fn not_found(text: impl Into<String>) -> Self {
        Self::new(ExceptionCode::NotFound, text)
    }

    pub fn internal(text: impl Into<String>) -> Self {
        Self::new(ExceptionCode::NoApplicableCode, text)
    }
}

/// Result alias used across the workspace.
pub type Result<T, E = WfsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_spec() {
        assert_eq!(WfsError::missing_parameter("typeNames").status, 400);
        assert_eq!(WfsError::processing_failed("boom").status, 500);
        assert_eq!(WfsError::not_found("gone").status, 404);
        assert_eq!(
            WfsError::invalid_parameter("bad", "srsName")
                .status(404)
                .status,
            404
        );
    }

    #[test]
    fn locator_is_carried() {
        let e = WfsError::invalid_parameter("Unknown CRS", "srsName");
        assert_eq!(e.locator.as_deref(), Some("srsName"));
        assert_eq!(e.code.as_str(), "InvalidParameterValue");
    }
}
