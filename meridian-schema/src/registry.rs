//! The process-wide feature type registry.
//!
//! Populated during server bootstrap and immutable afterwards.

use crate::feature_type::FeatureType;
use meridian_core::error::{Result, WfsError};
use std::collections::HashMap;
use std::sync::Arc;

const OPENGIS_PREFIX: &str = "{http://www.opengis.net/";

/// Registry of all feature types exposed by the service, keyed by local name.
#[derive(Debug, Default)]
pub struct FeatureTypeRegistry {
    pub xml_namespace: String,
    types: Vec<Arc<FeatureType>>,
    by_name: HashMap<String, usize>,
}

impl FeatureTypeRegistry {
    pub fn new(xml_namespace: impl Into<String>) -> Self {
        FeatureTypeRegistry {
            xml_namespace: xml_namespace.into(),
            types: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn register(&mut self, feature_type: FeatureType) {
        let name = feature_type.name.clone();
        self.types.push(Arc::new(feature_type));
        self.by_name.insert(name, self.types.len() - 1);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FeatureType>> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Find a feature type by a (possibly qualified) type name.
    ///
    /// Accepts `local`, `pfx:local` and `{uri}local` notations. When an XML
    /// POST used `xmlns="http://www.opengis.net/wfs/2.0"` as its default
    /// namespace, QName values accidentally resolve into the wfs namespace;
    /// that is corrected here rather than rejected.
    pub fn resolve(&self, type_name: &str, locator: &str) -> Result<Arc<FeatureType>> {
        let local = local_name(type_name);
        if let Some(rest) = type_name.strip_prefix('{') {
            if let Some((uri, _)) = rest.split_once('}') {
                if uri != self.xml_namespace && !type_name.starts_with(OPENGIS_PREFIX) {
                    return Err(self.unknown(type_name, locator));
                }
            }
        }
        self.by_name
            .get(local)
            .map(|i| self.types[*i].clone())
            .ok_or_else(|| self.unknown(type_name, locator))
    }

    fn unknown(&self, type_name: &str, locator: &str) -> WfsError {
        WfsError::invalid_parameter(
            format!("Typename '{}' doesn't exist in this server.", local_name(type_name)),
            locator,
        )
    }
}

fn local_name(type_name: &str) -> &str {
    if let Some(pos) = type_name.find('}') {
        &type_name[pos + 1..]
    } else if let Some(pos) = type_name.find(':') {
        &type_name[pos + 1..]
    } else {
        type_name
    }
}
