//! FES 2.0 resource identifiers.

use crate::xml::XmlElement;
use crate::xmlns;
use meridian_core::error::Result;

/// `<fes:ResourceId rid="typename.id"/>`.
///
/// The rid splits at the last dot into a type name and a bare id. Rids
/// without a dot keep `type_name = None`; the compiler turns those into an
/// empty result rather than an error (CITE sends bare UUIDs), unless the
/// strict-standard flag is on.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceId {
    pub rid: String,
    pub type_name: Option<String>,
    pub id: Option<String>,
    /// Feature versioning attributes parse but are not executable.
    pub version: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl ResourceId {
    pub fn new(rid: impl Into<String>) -> ResourceId {
        let rid = rid.into();
        let (type_name, id) = match rid.rsplit_once('.') {
            Some((type_name, id)) => (Some(type_name.to_string()), Some(id.to_string())),
            None => (None, None),
        };
        ResourceId {
            rid,
            type_name,
            id,
            version: None,
            start_time: None,
            end_time: None,
        }
    }

    pub fn from_xml(element: &XmlElement) -> Result<ResourceId> {
        element.expect_tag(xmlns::FES, "ResourceId")?;
        element.expect_no_children()?;
        let rid = element.require_attr("rid")?;
        let mut resource_id = ResourceId::new(rid);
        resource_id.version = element.attr("version").map(str::to_string);
        resource_id.start_time = element.attr("startTime").map(str::to_string);
        resource_id.end_time = element.attr("endTime").map(str::to_string);
        Ok(resource_id)
    }

    /// The id to match against the identity field; falls back to the whole
    /// rid when no `typename.` prefix was present.
    pub fn lookup_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.rid)
    }

    pub fn has_version_attributes(&self) -> bool {
        self.version.is_some() || self.start_time.is_some() || self.end_time.is_some()
    }
}
