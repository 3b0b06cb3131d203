//! Application state shared across request handlers.
//!
//! Everything here is read-only after bootstrap: the feature type
//! registry, the stored query and function registries, the datastore
//! handle and the service configuration. Per-request state lives on the
//! request task only.

use meridian_core::ServiceConfig;
use meridian_fes::functions::FunctionRegistry;
use meridian_fes::wfs::stored::StoredQueryRegistry;
use meridian_output::capabilities::ServiceDescription;
use meridian_output::RenderContext;
use meridian_query::Datastore;
use meridian_schema::FeatureTypeRegistry;
use std::collections::HashMap;
use std::sync::Arc;

pub struct AppState {
    pub config: ServiceConfig,
    pub service: ServiceDescription,
    pub registry: FeatureTypeRegistry,
    pub stored_queries: StoredQueryRegistry,
    pub functions: Arc<FunctionRegistry>,
    pub store: Arc<dyn Datastore>,
    /// The externally visible endpoint, used in links and schema URLs.
    pub base_url: String,
}

impl AppState {
    /// The prefix→namespace aliases of the application schema, assumed
    /// in-scope for KVP requests.
    pub fn app_aliases(&self) -> HashMap<String, String> {
        HashMap::from([("app".to_string(), self.registry.xml_namespace.clone())])
    }

    pub fn render_context(&self) -> RenderContext {
        RenderContext {
            config: self.config.clone(),
            store: self.store.clone(),
            base_url: self.base_url.clone(),
            app_namespace: self.registry.xml_namespace.clone(),
            app_prefix: "app".to_string(),
        }
    }
}
