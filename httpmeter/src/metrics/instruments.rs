use httpmeter_core::catalog::{Catalog, InstrumentDef, InstrumentId, Label};
use httpmeter_core::error::CatalogError;
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};

/// Applies description and unit of an [`InstrumentDef`] to an instrument builder.
macro_rules! with_metadata {
    ($builder:expr, $def:expr) => {{
        let def: &InstrumentDef = $def;
        let builder = $builder.with_description(def.description);
        match def.unit {
            Some(unit) => builder.with_unit(unit),
            None => builder,
        }
    }};
}

/// Instrument handles for one middleware instance
///
/// Built from the active catalog; every handle is safe to record into from
/// concurrent requests.
#[derive(Clone)]
pub struct HttpInstruments {
    pub requests: Counter<u64>,
    pub request_duration: Histogram<f64>,
    pub request_size: Histogram<u64>,
    pub response_size: Histogram<u64>,
    pub active_requests: Option<UpDownCounter<i64>>,

    /// Labels shared by the four per-request instruments
    pub labels: &'static [Label],
    pub in_flight_labels: &'static [Label],
}

impl HttpInstruments {
    pub fn new(
        meter: &Meter,
        catalog: &Catalog,
        track_in_flight: bool,
    ) -> Result<Self, CatalogError> {
        let requests = catalog.instrument(InstrumentId::Requests)?;
        let duration = catalog.instrument(InstrumentId::RequestDuration)?;
        let request_size = catalog.instrument(InstrumentId::RequestSize)?;
        let response_size = catalog.instrument(InstrumentId::ResponseSize)?;
        let active = catalog.instrument(InstrumentId::ActiveRequests)?;

        for def in [requests, duration, request_size, response_size, active] {
            def.validate()?;
        }

        Ok(Self {
            requests: with_metadata!(meter.u64_counter(requests.name), requests).build(),
            request_duration: with_metadata!(meter.f64_histogram(duration.name), duration).build(),
            request_size: with_metadata!(meter.u64_histogram(request_size.name), request_size)
                .build(),
            response_size: with_metadata!(meter.u64_histogram(response_size.name), response_size)
                .build(),
            active_requests: track_in_flight
                .then(|| with_metadata!(meter.i64_up_down_counter(active.name), active).build()),
            labels: requests.labels,
            in_flight_labels: active.labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmeter_core::catalog::{COMPATIBLE, SEMANTIC};
    use opentelemetry::metrics::MeterProvider;
    use opentelemetry_sdk::metrics::SdkMeterProvider;

    #[test]
    fn test_in_flight_is_optional() {
        let provider = SdkMeterProvider::builder().build();
        let meter = provider.meter("test");

        let instruments = HttpInstruments::new(&meter, &COMPATIBLE, false).unwrap();
        assert!(instruments.active_requests.is_none());

        let instruments = HttpInstruments::new(&meter, &SEMANTIC, true).unwrap();
        assert!(instruments.active_requests.is_some());
        assert!(!instruments.in_flight_labels.contains(&Label::StatusCode));
        assert!(instruments.labels.contains(&Label::StatusCode));
    }
}
