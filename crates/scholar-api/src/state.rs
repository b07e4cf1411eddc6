//! Application state shared across handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use scholar_core::analytics::AnalyticsComposer;
use scholar_core::auth::token::TokenService;
use scholar_core::db::DbPool;
use scholar_core::fanout::Notifier;
use std::sync::Arc;

/// Shared application state.
///
/// Built once at start-up; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    /// Signs and verifies access tokens, mints refresh tokens.
    pub tokens: Arc<TokenService>,
    /// Notification fan-out.
    pub notifier: Notifier,
    /// Dashboard and analytics snapshots.
    pub analytics: AnalyticsComposer,
    /// Prometheus metrics handle for rendering metrics.
    pub prometheus_handle: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    pub fn new(db: DbPool, tokens: TokenService) -> Self {
        Self {
            notifier: Notifier::new(&db),
            analytics: AnalyticsComposer::new(&db),
            tokens: Arc::new(tokens),
            prometheus_handle: None,
            db,
        }
    }

    pub fn with_prometheus_handle(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus_handle = Some(Arc::new(handle));
        self
    }
}
