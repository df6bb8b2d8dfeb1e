//! Process-wide monitoring instruments.
//!
//! [`MetricsRegistry`] wraps a `prometheus-client` registry together with a
//! name → handle map, so asking for an instrument that already exists hands
//! back the existing handle instead of registering a duplicate.
//! [`AppMetrics`] is the typed view the interaction controller records into.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::{Family, MetricConstructor};
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

use crate::classifier::SentimentLabel;

pub const REQUESTS_TOTAL: &str = "ml_model_requests_total";
pub const CONFIDENCE: &str = "ml_model_confidence";
pub const ACCURACY_FEEDBACK: &str = "ml_model_accuracy_feedback";

/// Bucket boundaries shared by the confidence and feedback histograms.
pub const CONFIDENCE_BUCKETS: &[f64] = &[0.5, 0.6, 0.7, 0.75, 0.8, 0.85, 0.9, 0.95, 1.0];

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Instrument '{name}' is registered as a {found}, requested as a {expected}")]
    KindMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Failed to encode metrics: {0}")]
    Encode(#[from] std::fmt::Error),
}

/// Label set of the confidence histogram.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PredictionLabels {
    pub label: String,
}

/// Builds histograms with a fixed set of buckets for a [`Family`].
#[derive(Clone, Debug)]
pub struct HistogramConstructor {
    buckets: Arc<[f64]>,
}

impl HistogramConstructor {
    pub fn new(buckets: &[f64]) -> Self {
        Self {
            buckets: Arc::from(buckets),
        }
    }
}

impl MetricConstructor<Histogram> for HistogramConstructor {
    fn new_metric(&self) -> Histogram {
        Histogram::new(self.buckets.iter().copied())
    }
}

pub type LabeledHistogram = Family<PredictionLabels, Histogram, HistogramConstructor>;

#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentKind {
    Counter,
    Histogram { buckets: Vec<f64> },
    LabeledHistogram { buckets: Vec<f64> },
}

impl InstrumentKind {
    fn name(&self) -> &'static str {
        match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::Histogram { .. } => "histogram",
            InstrumentKind::LabeledHistogram { .. } => "labeled histogram",
        }
    }
}

/// Name, help text and kind of an instrument to look up or create.
#[derive(Debug, Clone)]
pub struct InstrumentSpec {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: InstrumentKind,
}

/// A shared handle to a registered instrument. Clones observe into the same series.
#[derive(Debug, Clone)]
pub enum Instrument {
    Counter(Counter),
    Histogram(Histogram),
    LabeledHistogram(LabeledHistogram),
}

impl Instrument {
    fn kind_name(&self) -> &'static str {
        match self {
            Instrument::Counter(_) => "counter",
            Instrument::Histogram(_) => "histogram",
            Instrument::LabeledHistogram(_) => "labeled histogram",
        }
    }

    fn matches(&self, kind: &InstrumentKind) -> bool {
        matches!(
            (self, kind),
            (Instrument::Counter(_), InstrumentKind::Counter)
                | (Instrument::Histogram(_), InstrumentKind::Histogram { .. })
                | (Instrument::LabeledHistogram(_), InstrumentKind::LabeledHistogram { .. })
        )
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of named instruments, safe to share across sessions.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    registry: Mutex<Registry>,
    instruments: Mutex<HashMap<&'static str, Instrument>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instrument called `spec.name`, registering it on first use.
    ///
    /// A name that is already registered is not an error: the existing handle
    /// is returned. Asking for the same name with a different kind is.
    pub fn get_or_create(&self, spec: &InstrumentSpec) -> Result<Instrument, MetricsError> {
        let mut instruments = lock(&self.instruments);

        if let Some(existing) = instruments.get(spec.name) {
            if !existing.matches(&spec.kind) {
                return Err(MetricsError::KindMismatch {
                    name: spec.name.to_string(),
                    expected: spec.kind.name(),
                    found: existing.kind_name(),
                });
            }
            log::debug!("Instrument {} already registered, reusing it", spec.name);
            return Ok(existing.clone());
        }

        let instrument = match &spec.kind {
            InstrumentKind::Counter => Instrument::Counter(Counter::default()),
            InstrumentKind::Histogram { buckets } => {
                Instrument::Histogram(Histogram::new(buckets.iter().copied()))
            }
            InstrumentKind::LabeledHistogram { buckets } => Instrument::LabeledHistogram(
                Family::new_with_constructor(HistogramConstructor::new(buckets)),
            ),
        };

        let mut registry = lock(&self.registry);
        match &instrument {
            // The text encoder appends `_total` to counters itself
            Instrument::Counter(counter) => registry.register(
                spec.name.strip_suffix("_total").unwrap_or(spec.name),
                spec.help,
                counter.clone(),
            ),
            Instrument::Histogram(histogram) => {
                registry.register(spec.name, spec.help, histogram.clone())
            }
            Instrument::LabeledHistogram(family) => {
                registry.register(spec.name, spec.help, family.clone())
            }
        }
        log::info!("Initialized {} instrument {}", spec.kind.name(), spec.name);

        instruments.insert(spec.name, instrument.clone());
        Ok(instrument)
    }

    /// Number of distinct instruments registered.
    pub fn len(&self) -> usize {
        lock(&self.instruments).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders every instrument in OpenMetrics text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let registry = lock(&self.registry);
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &registry)?;
        Ok(buffer)
    }
}

/// Typed handles to the instruments the application records into.
#[derive(Debug, Clone)]
pub struct AppMetrics {
    pub requests_total: Counter,
    pub confidence: LabeledHistogram,
    pub accuracy_feedback: Histogram,
}

impl AppMetrics {
    pub fn specs() -> [InstrumentSpec; 3] {
        [
            InstrumentSpec {
                name: REQUESTS_TOTAL,
                help: "Total number of prediction requests",
                kind: InstrumentKind::Counter,
            },
            InstrumentSpec {
                name: ACCURACY_FEEDBACK,
                help: "Distribution of user accuracy feedback (1.0=Correct, 0.0=Incorrect)",
                kind: InstrumentKind::Histogram {
                    buckets: CONFIDENCE_BUCKETS.to_vec(),
                },
            },
            InstrumentSpec {
                name: CONFIDENCE,
                help: "Classifier reported confidence on results",
                kind: InstrumentKind::LabeledHistogram {
                    buckets: CONFIDENCE_BUCKETS.to_vec(),
                },
            },
        ]
    }

    /// Looks up or creates every application instrument. Safe to call any number of times.
    pub fn init(registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        let [requests_spec, feedback_spec, confidence_spec] = Self::specs();

        let requests_total = match registry.get_or_create(&requests_spec)? {
            Instrument::Counter(counter) => counter,
            other => return Err(mismatch(&requests_spec, &other)),
        };
        let accuracy_feedback = match registry.get_or_create(&feedback_spec)? {
            Instrument::Histogram(histogram) => histogram,
            other => return Err(mismatch(&feedback_spec, &other)),
        };
        let confidence = match registry.get_or_create(&confidence_spec)? {
            Instrument::LabeledHistogram(family) => family,
            other => return Err(mismatch(&confidence_spec, &other)),
        };

        Ok(Self {
            requests_total,
            confidence,
            accuracy_feedback,
        })
    }

    pub fn record_request(&self) {
        self.requests_total.inc();
    }

    pub fn record_confidence(&self, label: SentimentLabel, confidence: f32) {
        self.confidence
            .get_or_create(&PredictionLabels {
                label: label.as_str().to_string(),
            })
            .observe(f64::from(confidence));
    }

    pub fn record_feedback(&self, correct: bool) {
        self.accuracy_feedback
            .observe(if correct { 1.0 } else { 0.0 });
    }
}

fn mismatch(spec: &InstrumentSpec, found: &Instrument) -> MetricsError {
    MetricsError::KindMismatch {
        name: spec.name.to_string(),
        expected: spec.kind.name(),
        found: found.kind_name(),
    }
}
