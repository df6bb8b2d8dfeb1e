use ort::Error as OrtError;
use std::fmt;

/// Failure to load the sentiment model or to classify a single text.
///
/// `BuildError` only happens at startup. The others are per request and end
/// up as the inline error on the page.
#[derive(Debug)]
pub enum ClassifierError {
    /// Bad builder input, or model files that could not be loaded
    BuildError(String),
    TokenizerError(String),
    /// The ONNX session failed while running
    ModelError(String),
    /// Logits did not line up with the label set
    PredictionError(String),
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildError(msg) => write!(f, "Failed to build classifier: {}", msg),
            Self::TokenizerError(msg) => write!(f, "Failed to tokenize input: {}", msg),
            Self::ModelError(msg) => write!(f, "Inference failed: {}", msg),
            Self::PredictionError(msg) => write!(f, "Unusable model output: {}", msg),
        }
    }
}

impl std::error::Error for ClassifierError {}

// Only session construction lets ort errors through without context
impl From<OrtError> for ClassifierError {
    fn from(err: OrtError) -> Self {
        ClassifierError::BuildError(err.to_string())
    }
}

impl From<tokenizers::Error> for ClassifierError {
    fn from(err: tokenizers::Error) -> Self {
        ClassifierError::TokenizerError(err.to_string())
    }
}
