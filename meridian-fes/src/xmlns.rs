//! XML namespace constants used across the protocol.

use std::collections::HashMap;

pub const WFS: &str = "http://www.opengis.net/wfs/2.0";
pub const FES: &str = "http://www.opengis.net/fes/2.0";
pub const GML32: &str = "http://www.opengis.net/gml/3.2";
/// The GML 2 namespace; old clients still send geometries in it.
pub const GML21: &str = "http://www.opengis.net/gml";
pub const OWS: &str = "http://www.opengis.net/ows/1.1";
pub const XS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XLINK: &str = "http://www.w3.org/1999/xlink";

/// Default prefix→uri aliases assumed when a request omits declarations.
pub fn default_aliases() -> HashMap<String, String> {
    HashMap::from([
        ("wfs".to_string(), WFS.to_string()),
        ("fes".to_string(), FES.to_string()),
        ("gml".to_string(), GML32.to_string()),
        ("ows".to_string(), OWS.to_string()),
        ("xs".to_string(), XS.to_string()),
        ("xsd".to_string(), XS.to_string()),
        ("xsi".to_string(), XSI.to_string()),
        ("xlink".to_string(), XLINK.to_string()),
    ])
}
