//! Provider bootstrap and collector registration
//!
//! Every middleware instance exports into a private registry. What gets
//! registered with the caller's registerer is a [`CatalogCollector`] in
//! front of it, whose descriptors are the catalog's exported metric names.
//! Two instances with the same namespace and naming mode therefore collide
//! on registration, and [`register_idempotent`] resolves that collision.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};

use httpmeter_core::catalog::{sanitize_name, BucketView, Catalog};
use opentelemetry::KeyValue;
use opentelemetry_prometheus::PrometheusExporter;
use opentelemetry_sdk::metrics::{Aggregation, Instrument, SdkMeterProvider, Stream};
use opentelemetry_sdk::Resource;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::Registry;
use tracing::{debug, warn};

use super::config::MiddlewareConfig;
use super::MetricsError;

/// Outcome of [`register_idempotent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    /// A collector with the same descriptors was already registered and has
    /// been replaced.
    Replaced,
}

/// Descriptor sets of every collector registered through
/// [`register_idempotent`], so a colliding collector can still be found when
/// its descriptors differ from the new one's.
static REGISTERED: LazyLock<Mutex<Vec<Vec<Desc>>>> = LazyLock::new(Mutex::default);

/// Stands in for a registered collector when unregistering it.
#[derive(Clone)]
struct Descriptors(Vec<Desc>);

impl Collector for Descriptors {
    fn desc(&self) -> Vec<&Desc> {
        self.0.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        Vec::new()
    }
}

fn same_ids(a: &[Desc], b: &[Desc]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.id == b.id)
}

fn shares_a_desc(a: &[Desc], b: &[Desc]) -> bool {
    a.iter().any(|a| b.iter().any(|b| a.id == b.id))
}

/// Registers `collector`, replacing previously registered collectors it
/// collides with instead of failing.
///
/// A collision is a collector sharing at least one descriptor. The replaced
/// collector does not need the same descriptor set as long as it was itself
/// registered through this function. Any other registration error is
/// returned unchanged.
pub fn register_idempotent<C>(
    registerer: &Registry,
    collector: C,
) -> Result<Registration, prometheus::Error>
where
    C: Collector + Clone + 'static,
{
    let descs: Vec<Desc> = collector.desc().into_iter().cloned().collect();
    let mut registered = REGISTERED.lock().unwrap_or_else(PoisonError::into_inner);

    let mut outcome = Registration::Registered;
    loop {
        match registerer.register(Box::new(collector.clone())) {
            Ok(()) => break,
            Err(prometheus::Error::AlreadyReg) => {
                warn!("Collector already registered, replacing it");
                let candidates = std::iter::once(&descs).chain(
                    registered
                        .iter()
                        .rev()
                        .filter(|known| shares_a_desc(known, &descs)),
                );
                let mut removed = false;
                for known in candidates {
                    if registerer.unregister(Box::new(Descriptors(known.clone()))).is_ok() {
                        removed = true;
                        break;
                    }
                }
                if !removed {
                    return Err(prometheus::Error::AlreadyReg);
                }
                outcome = Registration::Replaced;
            }
            Err(e) => return Err(e),
        }
    }

    if !registered.iter().any(|known| same_ids(known, &descs)) {
        registered.push(descs);
    }
    Ok(outcome)
}

/// Exposes the private exporter registry under the catalog's descriptors.
#[derive(Clone)]
pub struct CatalogCollector {
    descs: Vec<Desc>,
    inner: Registry,
}

impl CatalogCollector {
    pub fn new(catalog: &Catalog, namespace: &str, inner: Registry) -> Result<Self, prometheus::Error> {
        let descs = catalog
            .instruments()
            .iter()
            .map(|def| {
                let labels = def
                    .labels
                    .iter()
                    .map(|label| sanitize_name(catalog.label_key(*label)))
                    .collect();
                Desc::new(
                    catalog.exported_name(namespace, def),
                    def.description.to_string(),
                    labels,
                    HashMap::new(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { descs, inner })
    }
}

impl Collector for CatalogCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.inner.gather()
    }
}

pub(crate) fn resource(config: &MiddlewareConfig) -> Resource {
    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attribute(KeyValue::new("service.version", config.service_version.clone()))
        .with_attribute(KeyValue::new("service.namespace", config.namespace()))
        .build()
}

pub(crate) fn exporter(
    catalog: &Catalog,
    namespace: &str,
    scope_info: bool,
    registry: Registry,
) -> Result<PrometheusExporter, MetricsError> {
    let mut builder = opentelemetry_prometheus::exporter().with_registry(registry);
    if !namespace.is_empty() {
        builder = builder.with_namespace(namespace);
    }
    if !catalog.unit_suffixes() {
        builder = builder.without_units();
    }
    if !catalog.exporter_metadata() {
        builder = builder.without_target_info();
    }
    if !(scope_info && catalog.exporter_metadata()) {
        builder = builder.without_scope_info();
    }

    builder
        .build()
        .map_err(|e| MetricsError::Exporter(e.to_string()))
}

fn bucket_stream(view: &BucketView) -> Result<Stream, MetricsError> {
    Stream::builder()
        .with_aggregation(Aggregation::ExplicitBucketHistogram {
            boundaries: view.boundaries.to_vec(),
            record_min_max: true,
        })
        .build()
        .map_err(|e| MetricsError::View {
            pattern: view.pattern,
            reason: e.to_string(),
        })
}

/// Builds the meter provider for `catalog`.
///
/// One view per bucket class; an instrument gets the boundaries of the first
/// view its name matches. Instruments matching no view keep the default
/// aggregation.
pub(crate) fn meter_provider(
    catalog: &'static Catalog,
    config: &MiddlewareConfig,
    exporter: PrometheusExporter,
) -> Result<SdkMeterProvider, MetricsError> {
    let mut builder = SdkMeterProvider::builder()
        .with_resource(resource(config))
        .with_reader(exporter);

    for view in catalog.bucket_views() {
        bucket_stream(view)?;
        debug!(pattern = view.pattern, unit_class = ?view.unit_class, "Adding histogram view");

        builder = builder.with_view(move |instrument: &Instrument| {
            let selected = catalog.bucket_view_for(instrument.name())?;
            if !std::ptr::eq(selected, view) {
                return None;
            }
            bucket_stream(view).ok()
        });
    }

    Ok(builder.build())
}
