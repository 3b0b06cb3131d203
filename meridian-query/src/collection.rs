//! Result collections for GetFeature / GetPropertyValue.
//!
//! A `FeatureCollection` composes one `SimpleFeatureCollection` per feature
//! type in the request. The collections hold the compiled query and the
//! pagination window; rows only start flowing when a renderer opens the
//! cursor, so building a collection never touches the datastore except for
//! the optional count.

use crate::datastore::Datastore;
use crate::predicate::CompiledQuery;
use crate::projection::FeatureProjection;
use chrono::{SecondsFormat, Utc};
use meridian_core::config::{CountMode, ServiceConfig};
use meridian_core::error::Result;
use meridian_schema::FeatureType;
use std::sync::Arc;

/// One feature type's slice of the response.
#[derive(Debug, Clone)]
pub struct SimpleFeatureCollection {
    pub feature_type: Arc<FeatureType>,
    pub projection: FeatureProjection,
    pub query: CompiledQuery,
    pub start: u64,
    /// Page size; `None` streams to the end of the result set.
    pub limit: Option<u64>,
    /// Full cardinality of the filter, when counting is enabled.
    pub number_matched: Option<u64>,
}

impl SimpleFeatureCollection {
    /// Compute `number_matched` according to the count policy.
    pub async fn apply_count_policy(
        &mut self,
        store: &dyn Datastore,
        mode: CountMode,
    ) -> Result<()> {
        let should_count = match mode {
            CountMode::Never => false,
            CountMode::Always => true,
            CountMode::FirstPageOnly => self.start == 0,
        };
        if should_count {
            self.number_matched = Some(
                store
                    .count(&self.feature_type.name, &self.query)
                    .await?,
            );
        }
        Ok(())
    }
}

/// The main result type for GetFeature.
#[derive(Debug, Clone)]
pub struct FeatureCollection {
    pub results: Vec<SimpleFeatureCollection>,
    /// ISO timestamp stamped on the response document.
    pub timestamp: String,
    pub next: Option<String>,
    pub previous: Option<String>,
}

impl FeatureCollection {
    pub fn new(results: Vec<SimpleFeatureCollection>) -> Self {
        FeatureCollection {
            results,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            next: None,
            previous: None,
        }
    }

    /// Total matches across all sub-collections; `None` renders as
    /// `numberMatched="unknown"`.
    pub fn number_matched(&self) -> Option<u64> {
        self.results
            .iter()
            .map(|sub| sub.number_matched)
            .try_fold(0u64, |total, count| count.map(|c| total + c))
    }
}

/// Clamp the requested page size to the renderer's bound. `max_page`
/// `None` allows unbounded pages (GeoJSON/CSV).
pub fn effective_page_size(
    requested: Option<u64>,
    max_page: Option<u64>,
    config: &ServiceConfig,
) -> Option<u64> {
    let wanted = requested.unwrap_or(config.default_page_size);
    match max_page {
        Some(max) => Some(wanted.min(max)),
        None => Some(wanted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        let config = ServiceConfig::default();
        assert_eq!(
            effective_page_size(Some(100), Some(10), &config),
            Some(10)
        );
        assert_eq!(
            effective_page_size(None, Some(10000), &config),
            Some(config.default_page_size)
        );
        assert_eq!(effective_page_size(Some(1_000_000), None, &config), Some(1_000_000));
    }
}
