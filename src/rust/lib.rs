//! Interactive sentiment analysis demo with feedback collection and Prometheus monitoring.
//!
//! A user submits text through a small web page; a pre-trained ONNX sentiment
//! model labels it; the user says whether the label was right. Every request,
//! confidence and feedback verdict is recorded into process-wide instruments
//! served on a separate `/metrics` endpoint.
//!
//! # Wiring
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use sentiment_monitor::{
//!     AppMetrics, AppState, BuiltinModel, InteractionController, MetricsExporter,
//!     MetricsRegistry, SentimentClassifier,
//! };
//!
//! let registry = Arc::new(MetricsRegistry::new());
//! let metrics = AppMetrics::init(&registry)?;
//! MetricsExporter::new(Arc::clone(&registry))
//!     .ensure_started("127.0.0.1:8001".parse()?)
//!     .await?;
//!
//! let classifier = SentimentClassifier::builder()
//!     .with_model(BuiltinModel::DistilBertSst2)?
//!     .build()?;
//! let controller = InteractionController::new(Arc::new(classifier), metrics);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8501").await?;
//! sentiment_monitor::server::serve(listener, AppState::new(controller), std::future::pending()).await?;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod controller;
pub mod exporter;
pub mod metrics;
pub mod model_manager;
pub mod models;
mod runtime;
pub mod server;
pub mod session;
pub mod ui;

pub use classifier::{Classify, ClassifierError, ClassifierInfo, Prediction, SentimentClassifier, SentimentClassifierBuilder, SentimentLabel};
pub use config::AppConfig;
pub use controller::{Effect, Event, InteractionController, Outcome, Transition};
pub use exporter::{ExporterStatus, MetricsExporter};
pub use metrics::{AppMetrics, Instrument, InstrumentKind, InstrumentSpec, MetricsError, MetricsRegistry};
pub use model_manager::{FileDigests, ModelManager, ModelError};
pub use models::{BuiltinModel, ModelCharacteristics, ModelInfo};
pub use runtime::RuntimeConfig;
pub use server::{AppState, ServerError};
pub use session::{AccuracyEntry, FeedbackChoice, FeedbackState, InteractionState, SessionState, SessionStore};

pub fn init_logger() {
    env_logger::init();
}
