//! `ows:ExceptionReport` rendering.

use crate::utils::xml_escape;
use meridian_core::WfsError;

/// The report without the XML declaration, for embedding in a
/// `<wfs:truncatedResponse>`.
pub fn exception_report_body(error: &WfsError) -> String {
    let full = exception_report(error);
    match full.split_once('\n') {
        Some((_, body)) => body.to_string(),
        None => full,
    }
}

/// Serialize an error to the XML exception document.
pub fn exception_report(error: &WfsError) -> String {
    let locator_attr = match &error.locator {
        Some(locator) => format!(" locator=\"{}\"", xml_escape(locator)),
        None => String::new(),
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <ows:ExceptionReport\
         \u{20}xmlns:ows=\"http://www.opengis.net/ows/1.1\"\
         \u{20}xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"\
         \u{20}xsi:schemaLocation=\"http://www.opengis.net/ows/1.1 \
         http://schemas.opengis.net/ows/1.1.0/owsExceptionReport.xsd\"\
         \u{20}xml:lang=\"en-US\" version=\"2.0.0\">\n\
         \u{20}\u{20}<ows:Exception exceptionCode=\"{code}\"{locator_attr}>\n\n\
         \u{20}\u{20}\u{20}\u{20}<ows:ExceptionText>{text}</ows:ExceptionText>\n\n\
         \u{20}\u{20}</ows:Exception>\n\
         </ows:ExceptionReport>\n",
        code = error.code.as_str(),
        text = xml_escape(&error.text),
    )
}
