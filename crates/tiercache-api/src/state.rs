//! Application state

use axum::http::HeaderMap;
use std::sync::Arc;
use tiercache_core::{KeyValSettings, PersistDirective, PersistenceService};

/// Prometheus handle used to render `/-/metrics`
pub type MetricsHandle = metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<KeyValSettings>,
    /// Durable tier; `None` turns every persistence directive into a no-op
    pub persistence: Option<Arc<PersistenceService>>,
}

impl AppState {
    pub fn new(settings: KeyValSettings, persistence: Option<Arc<PersistenceService>>) -> Self {
        Self {
            settings: Arc::new(settings),
            persistence,
        }
    }

    /// Durable tier and target for a request, when persistence applies to it
    pub fn persist_target(
        &self,
        headers: &HeaderMap,
    ) -> Option<(Arc<PersistenceService>, PersistDirective)> {
        let persistence = self.persistence.as_ref()?;
        let directive = self.settings.resolve_persist(headers)?;
        Some((persistence.clone(), directive))
    }
}
