//! HTTP request metrics
//!
//! [`HttpMetrics`] owns one catalog, its instruments and its exporter. It is
//! built once from a [`MiddlewareConfig`] and shared by every request task.

pub mod config;
mod error;
pub mod exposition;
mod instruments;
pub mod middleware;
pub mod registration;

use std::sync::Arc;

use axum::extract::Request;
use axum::routing::get;
use axum::Router;
use httpmeter_core::attributes::{default_host_label, default_route_label, LabelMappingFn};
use httpmeter_core::catalog::Catalog;
use opentelemetry::global;
use opentelemetry::metrics::MeterProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use tracing::{info, warn};

pub use config::{MiddlewareConfig, SkipperFn};
pub use error::MetricsError;
pub use exposition::{metrics_handler, write_gathered_metrics, Gatherer};
pub use instruments::HttpInstruments;
pub use middleware::track_metrics;
pub use registration::{register_idempotent, CatalogCollector, Registration};

const METER_NAME: &str = "httpmeter";

pub struct HttpMetrics {
    catalog: &'static Catalog,
    instruments: HttpInstruments,
    namespace: String,
    metrics_path: String,
    skipper: Option<SkipperFn>,
    route_label: LabelMappingFn,
    host_label: LabelMappingFn,
    gatherer: Arc<dyn Gatherer>,
    registration: Registration,
    // Dropping the last provider handle shuts the exporter down.
    _provider: SdkMeterProvider,
}

impl HttpMetrics {
    /// Creates the instruments, the exporter and the meter provider, and
    /// registers the exporter with the configured registerer.
    ///
    /// The provider is also installed as the global meter provider. Any
    /// error here is a configuration error and should abort startup.
    pub fn new(config: MiddlewareConfig) -> Result<Self, MetricsError> {
        let catalog = Catalog::for_mode(config.naming_mode);
        let namespace = config.namespace();

        let exporter_registry = Registry::new();
        let exporter = registration::exporter(
            catalog,
            &namespace,
            config.scope_info,
            exporter_registry.clone(),
        )?;
        let provider = registration::meter_provider(catalog, &config, exporter)?;

        let meter = provider.meter(METER_NAME);
        let instruments = HttpInstruments::new(&meter, catalog, config.track_in_flight)?;

        let collector = CatalogCollector::new(catalog, &namespace, exporter_registry)?;
        let registration = register_idempotent(&config.registerer(), collector)?;
        if registration == Registration::Replaced {
            warn!(namespace = %namespace, "Replaced metrics registered by a previous instance");
        }

        global::set_meter_provider(provider.clone());

        info!(
            namespace = %namespace,
            mode = ?catalog.mode(),
            path = %config.metrics_path,
            in_flight = config.track_in_flight,
            "HTTP metrics initialized"
        );

        let route_label = config
            .route_label
            .clone()
            .unwrap_or_else(default_route_label);
        let host_label = config
            .host_label
            .clone()
            .unwrap_or_else(default_host_label);

        Ok(Self {
            catalog,
            instruments,
            namespace,
            metrics_path: config.metrics_path.clone(),
            skipper: config.skipper.clone(),
            route_label,
            host_label,
            gatherer: config.gatherer(),
            registration,
            _provider: provider,
        })
    }

    /// Mounts the exposition endpoint on `router` and wraps it in the
    /// middleware.
    ///
    /// Routes added to the returned router afterwards are not measured.
    pub fn setup<S>(self: &Arc<Self>, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            .route(
                &self.metrics_path,
                get(metrics_handler).with_state(self.clone()),
            )
            .layer(axum::middleware::from_fn_with_state(
                self.clone(),
                track_metrics,
            ))
    }

    pub fn catalog(&self) -> &'static Catalog {
        self.catalog
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn metrics_path(&self) -> &str {
        &self.metrics_path
    }

    pub fn registration(&self) -> Registration {
        self.registration
    }

    pub fn gatherer(&self) -> Arc<dyn Gatherer> {
        self.gatherer.clone()
    }

    fn skips(&self, request: &Request) -> bool {
        request.uri().path() == self.metrics_path
            || self.skipper.as_ref().is_some_and(|skip| skip(request))
    }
}
