//! Metric catalog
//!
//! Static definitions of the instruments recorded for every request, the
//! label vocabulary they are partitioned by and the histogram bucket classes
//! bound to them by instrument-name pattern. One catalog variant exists per
//! [`NamingMode`]; a middleware instance picks one at construction and keeps
//! it for its whole lifetime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * KB;

/// Request latency boundaries in seconds, 5ms up to 10s.
pub const DURATION_SECONDS_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Request latency boundaries in milliseconds, 5ms up to 10s.
pub const DURATION_MILLISECONDS_BUCKETS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Boundaries in seconds for long running operations, 0.5s up to 5min.
pub const LONG_DURATION_SECONDS_BUCKETS: &[f64] = &[
    0.5, 1.0, 1.5, 2.5, 5.0, 10.0, 15.0, 25.0, 40.0, 60.0, 90.0, 120.0, 150.0, 200.0, 250.0, 300.0,
];

/// Payload size boundaries in bytes, 1KB up to 10MB.
pub const BYTE_BUCKETS: &[f64] = &[
    1.0 * KB,
    2.0 * KB,
    5.0 * KB,
    10.0 * KB,
    100.0 * KB,
    500.0 * KB,
    1.0 * MB,
    2.5 * MB,
    5.0 * MB,
    10.0 * MB,
];

/// Selects the catalog variant: exported names, units and label keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingMode {
    /// Drop-in names of the classic Prometheus middleware
    /// (`requests_total`, `request_duration_seconds`, ...) with the
    /// `code`, `method`, `host` and `url` labels.
    Compatible,
    /// OpenTelemetry instrument names with exporter-derived unit suffixes,
    /// request duration recorded in milliseconds.
    Milliseconds,
    /// OpenTelemetry HTTP server semantic conventions.
    #[default]
    Semantic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentId {
    Requests,
    RequestDuration,
    RequestSize,
    ResponseSize,
    ActiveRequests,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    Counter,
    UpDownCounter,
    Histogram,
}

/// The unit family of an instrument. Bucket views may only be bound to
/// histograms of the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitClass {
    Dimensionless,
    Time,
    Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Method,
    StatusCode,
    Route,
    Host,
    Scheme,
}

/// Unit the request duration is converted to before it is recorded.
///
/// Both scales start from whole elapsed milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationScale {
    Seconds,
    Milliseconds,
}

impl DurationScale {
    pub fn convert(self, elapsed: Duration) -> f64 {
        match self {
            DurationScale::Seconds => elapsed.as_millis() as f64 / 1000.0,
            DurationScale::Milliseconds => elapsed.as_millis() as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentDef {
    pub id: InstrumentId,
    pub name: &'static str,
    pub description: &'static str,
    pub unit: Option<&'static str>,
    pub kind: InstrumentKind,
    pub unit_class: UnitClass,
    pub labels: &'static [Label],
}

impl InstrumentDef {
    /// Checks the name and unit against the OpenTelemetry instrument rules.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut chars = self.name.chars();
        let valid_name = self.name.len() <= 255
            && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'));
        if !valid_name {
            return Err(CatalogError::InvalidName(self.name.to_string()));
        }

        if let Some(unit) = self.unit {
            if unit.len() > 63 || !unit.is_ascii() {
                return Err(CatalogError::InvalidUnit {
                    name: self.name.to_string(),
                    unit: unit.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Explicit histogram boundaries for every instrument whose name matches
/// `pattern` (glob: `*` any run of characters, `?` exactly one).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketView {
    pub pattern: &'static str,
    pub unit_class: UnitClass,
    pub boundaries: &'static [f64],
}

impl BucketView {
    pub fn matches(&self, instrument_name: &str) -> bool {
        glob_match(self.pattern, instrument_name)
    }
}

#[derive(Debug, PartialEq)]
pub struct Catalog {
    mode: NamingMode,
    instruments: &'static [InstrumentDef],
    views: &'static [BucketView],
    duration_scale: DurationScale,
}

const LEGACY_LABELS: &[Label] = &[Label::StatusCode, Label::Method, Label::Host, Label::Route];
const LEGACY_IN_FLIGHT_LABELS: &[Label] = &[Label::Method, Label::Host];

const SEMANTIC_LABELS: &[Label] = &[
    Label::Method,
    Label::StatusCode,
    Label::Route,
    Label::Host,
    Label::Scheme,
];
const SEMANTIC_IN_FLIGHT_LABELS: &[Label] = &[Label::Method, Label::Host, Label::Scheme];

const REQUESTS_DESCRIPTION: &str =
    "How many HTTP requests processed, partitioned by status code and HTTP method.";
const IN_FLIGHT_DESCRIPTION: &str = "Number of HTTP requests currently being served.";
const REQUEST_SIZE_DESCRIPTION: &str = "The HTTP request sizes in bytes.";
const RESPONSE_SIZE_DESCRIPTION: &str = "The HTTP response sizes in bytes.";

const UNIT_SECONDS: &str = "s";
const UNIT_MILLISECONDS: &str = "ms";
const UNIT_BYTES: &str = "By";

// The counter carries no unit on purpose: a dimensionless unit would make
// the exporter append `_ratio`.
const LEGACY_REQUESTS: InstrumentDef = InstrumentDef {
    id: InstrumentId::Requests,
    name: "requests",
    description: REQUESTS_DESCRIPTION,
    unit: None,
    kind: InstrumentKind::Counter,
    unit_class: UnitClass::Dimensionless,
    labels: LEGACY_LABELS,
};

const LEGACY_IN_FLIGHT: InstrumentDef = InstrumentDef {
    id: InstrumentId::ActiveRequests,
    name: "requests_in_flight",
    description: IN_FLIGHT_DESCRIPTION,
    unit: None,
    kind: InstrumentKind::UpDownCounter,
    unit_class: UnitClass::Dimensionless,
    labels: LEGACY_IN_FLIGHT_LABELS,
};

pub static COMPATIBLE: Catalog = Catalog {
    mode: NamingMode::Compatible,
    instruments: &[
        LEGACY_REQUESTS,
        InstrumentDef {
            id: InstrumentId::RequestDuration,
            name: "request_duration_seconds",
            description: "The HTTP request latencies in seconds.",
            unit: Some(UNIT_SECONDS),
            kind: InstrumentKind::Histogram,
            unit_class: UnitClass::Time,
            labels: LEGACY_LABELS,
        },
        InstrumentDef {
            id: InstrumentId::RequestSize,
            name: "request_size_bytes",
            description: REQUEST_SIZE_DESCRIPTION,
            unit: Some(UNIT_BYTES),
            kind: InstrumentKind::Histogram,
            unit_class: UnitClass::Bytes,
            labels: LEGACY_LABELS,
        },
        InstrumentDef {
            id: InstrumentId::ResponseSize,
            name: "response_size_bytes",
            description: RESPONSE_SIZE_DESCRIPTION,
            unit: Some(UNIT_BYTES),
            kind: InstrumentKind::Histogram,
            unit_class: UnitClass::Bytes,
            labels: LEGACY_LABELS,
        },
        LEGACY_IN_FLIGHT,
    ],
    views: &[
        BucketView {
            pattern: "*_duration_seconds",
            unit_class: UnitClass::Time,
            boundaries: DURATION_SECONDS_BUCKETS,
        },
        BucketView {
            pattern: "*_size_bytes",
            unit_class: UnitClass::Bytes,
            boundaries: BYTE_BUCKETS,
        },
    ],
    duration_scale: DurationScale::Seconds,
};

pub static MILLISECONDS: Catalog = Catalog {
    mode: NamingMode::Milliseconds,
    instruments: &[
        LEGACY_REQUESTS,
        InstrumentDef {
            id: InstrumentId::RequestDuration,
            name: "request_duration",
            description: "The HTTP request latencies in milliseconds.",
            unit: Some(UNIT_MILLISECONDS),
            kind: InstrumentKind::Histogram,
            unit_class: UnitClass::Time,
            labels: LEGACY_LABELS,
        },
        InstrumentDef {
            id: InstrumentId::RequestSize,
            name: "request_size",
            description: REQUEST_SIZE_DESCRIPTION,
            unit: Some(UNIT_BYTES),
            kind: InstrumentKind::Histogram,
            unit_class: UnitClass::Bytes,
            labels: LEGACY_LABELS,
        },
        InstrumentDef {
            id: InstrumentId::ResponseSize,
            name: "response_size",
            description: RESPONSE_SIZE_DESCRIPTION,
            unit: Some(UNIT_BYTES),
            kind: InstrumentKind::Histogram,
            unit_class: UnitClass::Bytes,
            labels: LEGACY_LABELS,
        },
        LEGACY_IN_FLIGHT,
    ],
    views: &[
        BucketView {
            pattern: "*_duration",
            unit_class: UnitClass::Time,
            boundaries: DURATION_MILLISECONDS_BUCKETS,
        },
        BucketView {
            pattern: "*_size",
            unit_class: UnitClass::Bytes,
            boundaries: BYTE_BUCKETS,
        },
    ],
    duration_scale: DurationScale::Milliseconds,
};

pub static SEMANTIC: Catalog = Catalog {
    mode: NamingMode::Semantic,
    instruments: &[
        InstrumentDef {
            id: InstrumentId::Requests,
            name: "requests",
            description: "Number of HTTP server requests.",
            unit: None,
            kind: InstrumentKind::Counter,
            unit_class: UnitClass::Dimensionless,
            labels: SEMANTIC_LABELS,
        },
        InstrumentDef {
            id: InstrumentId::RequestDuration,
            name: "http.server.request.duration",
            description: "Duration of HTTP server requests.",
            unit: Some(UNIT_SECONDS),
            kind: InstrumentKind::Histogram,
            unit_class: UnitClass::Time,
            labels: SEMANTIC_LABELS,
        },
        InstrumentDef {
            id: InstrumentId::RequestSize,
            name: "http.server.request.body.size",
            description: "Size of HTTP server request bodies.",
            unit: Some(UNIT_BYTES),
            kind: InstrumentKind::Histogram,
            unit_class: UnitClass::Bytes,
            labels: SEMANTIC_LABELS,
        },
        InstrumentDef {
            id: InstrumentId::ResponseSize,
            name: "http.server.response.body.size",
            description: "Size of HTTP server response bodies.",
            unit: Some(UNIT_BYTES),
            kind: InstrumentKind::Histogram,
            unit_class: UnitClass::Bytes,
            labels: SEMANTIC_LABELS,
        },
        InstrumentDef {
            id: InstrumentId::ActiveRequests,
            name: "http.server.active_requests",
            description: "Number of active HTTP server requests.",
            unit: None,
            kind: InstrumentKind::UpDownCounter,
            unit_class: UnitClass::Dimensionless,
            labels: SEMANTIC_IN_FLIGHT_LABELS,
        },
    ],
    // Order matters: the first matching view wins and `*exec.cost` would
    // also match long running operations.
    views: &[
        BucketView {
            pattern: "*long_exec.cost",
            unit_class: UnitClass::Time,
            boundaries: LONG_DURATION_SECONDS_BUCKETS,
        },
        BucketView {
            pattern: "*exec.cost",
            unit_class: UnitClass::Time,
            boundaries: DURATION_SECONDS_BUCKETS,
        },
        BucketView {
            pattern: "*.duration",
            unit_class: UnitClass::Time,
            boundaries: DURATION_SECONDS_BUCKETS,
        },
        BucketView {
            pattern: "*.body.size",
            unit_class: UnitClass::Bytes,
            boundaries: BYTE_BUCKETS,
        },
    ],
    duration_scale: DurationScale::Seconds,
};

impl Catalog {
    pub fn for_mode(mode: NamingMode) -> &'static Catalog {
        match mode {
            NamingMode::Compatible => &COMPATIBLE,
            NamingMode::Milliseconds => &MILLISECONDS,
            NamingMode::Semantic => &SEMANTIC,
        }
    }

    pub fn mode(&self) -> NamingMode {
        self.mode
    }

    pub fn instruments(&self) -> &'static [InstrumentDef] {
        self.instruments
    }

    pub fn instrument(&self, id: InstrumentId) -> Result<&'static InstrumentDef, CatalogError> {
        self.instruments
            .iter()
            .find(|def| def.id == id)
            .ok_or(CatalogError::MissingInstrument { mode: self.mode, id })
    }

    pub fn bucket_views(&self) -> &'static [BucketView] {
        self.views
    }

    /// Returns the view that decides the boundaries of `instrument_name`.
    pub fn bucket_view_for(&self, instrument_name: &str) -> Option<&'static BucketView> {
        self.views.iter().find(|view| view.matches(instrument_name))
    }

    pub fn duration_scale(&self) -> DurationScale {
        self.duration_scale
    }

    /// Attribute key recorded for `label` in this mode.
    pub fn label_key(&self, label: Label) -> &'static str {
        match self.mode {
            NamingMode::Compatible | NamingMode::Milliseconds => match label {
                Label::Method => "method",
                Label::StatusCode => "code",
                Label::Route => "url",
                Label::Host => "host",
                Label::Scheme => "scheme",
            },
            NamingMode::Semantic => match label {
                Label::Method => "http.request.method",
                Label::StatusCode => "http.response.status_code",
                Label::Route => "http.route",
                Label::Host => "server.address",
                Label::Scheme => "url.scheme",
            },
        }
    }

    /// Whether the exporter appends unit suffixes to metric names.
    pub fn unit_suffixes(&self) -> bool {
        self.mode != NamingMode::Compatible
    }

    /// Whether the exporter may add scope labels and the `target_info` series.
    pub fn exporter_metadata(&self) -> bool {
        self.mode != NamingMode::Compatible
    }

    /// Name of the metric family the Prometheus exporter derives from `def`.
    pub fn exported_name(&self, namespace: &str, def: &InstrumentDef) -> String {
        let mut name = sanitize_name(def.name);

        if self.unit_suffixes() {
            if let Some(suffix) = def.unit.and_then(unit_suffix) {
                if !name.ends_with(suffix) {
                    name.push('_');
                    name.push_str(suffix);
                }
            }
        }

        if def.kind == InstrumentKind::Counter && !name.ends_with("_total") {
            name.push_str("_total");
        }

        if namespace.is_empty() {
            name
        } else {
            format!("{namespace}_{name}")
        }
    }
}

fn unit_suffix(unit: &str) -> Option<&'static str> {
    match unit {
        "s" => Some("seconds"),
        "ms" => Some("milliseconds"),
        "By" => Some("bytes"),
        "1" => Some("ratio"),
        _ => None,
    }
}

/// Replaces every character not allowed in a Prometheus name with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .enumerate()
        .map(|(i, c)| {
            if c.is_ascii_alphabetic() || c == '_' || c == ':' || (i > 0 && c.is_ascii_digit()) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Minimal glob matcher for instrument-name patterns.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, n));
            p += 1;
        } else if let Some((star, mark)) = backtrack {
            p = star + 1;
            n = mark + 1;
            backtrack = Some((star, mark + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
