mod error;
mod inference;
mod model;
mod prediction;
pub mod builder;
mod utils;

pub use error::ClassifierError;
pub use model::SentimentClassifier;
pub use builder::SentimentClassifierBuilder;
pub use prediction::{Prediction, SentimentLabel};

/// The synchronous classifier boundary used by the interaction controller.
///
/// Each call is an independent inference: no retries, no caching.
/// Implementations must return a confidence in `[0, 1]`.
pub trait Classify: Send + Sync {
    fn classify(&self, text: &str) -> Result<Prediction, ClassifierError>;
}

/// Information about the loaded model
#[derive(Debug, Clone)]
pub struct ClassifierInfo {
    /// Path to the ONNX model file
    pub model_path: String,
    /// Path to the tokenizer file
    pub tokenizer_path: String,
    /// Labels in model output order
    pub labels: Vec<SentimentLabel>,
    /// Inputs are truncated to this many tokens
    pub max_sequence_length: usize,
}
