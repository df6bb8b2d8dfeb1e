use std::sync::Arc;
use ort::session::Session;
use tokenizers::Tokenizer;

use super::error::ClassifierError;
use super::inference::SequenceClassification;
use super::prediction::{Prediction, SentimentLabel};
use super::utils::{argmax, softmax};
use super::{Classify, ClassifierInfo};
use crate::ModelCharacteristics;

/// A thread-safe sentiment classifier backed by an ONNX sequence-classification model.
///
/// This type is `Send + Sync`: the tokenizer and session are shared behind `Arc`,
/// so one instance can serve every session of the web server.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use sentiment_monitor::{SentimentClassifier, BuiltinModel, Classify};
///
/// let classifier = SentimentClassifier::builder()
///     .with_model(BuiltinModel::DistilBertSst2)?
///     .build()?;
///
/// let prediction = classifier.classify("I love this!")?;
/// println!("{} ({:.2})", prediction.label, prediction.confidence);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SentimentClassifier {
    pub model_path: String,
    pub tokenizer_path: String,
    pub tokenizer: Arc<Tokenizer>,
    pub session: Arc<Session>,
    pub model_characteristics: ModelCharacteristics,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<SentimentClassifier>();
    }
};

impl SequenceClassification for SentimentClassifier {
    fn tokenizer(&self) -> Option<&Tokenizer> {
        Some(&self.tokenizer)
    }

    fn session(&self) -> Option<&Session> {
        Some(&self.session)
    }
}

impl SentimentClassifier {
    /// Creates a new SentimentClassifierBuilder for fluent construction
    pub fn builder() -> super::builder::SentimentClassifierBuilder {
        super::builder::SentimentClassifierBuilder::new()
    }

    /// Returns information about the loaded model
    pub fn info(&self) -> ClassifierInfo {
        ClassifierInfo {
            model_path: self.model_path.clone(),
            tokenizer_path: self.tokenizer_path.clone(),
            labels: self.model_characteristics.labels.clone(),
            max_sequence_length: self.model_characteristics.max_sequence_length,
        }
    }

    /// Number of tokens the model sees for `text` after truncation.
    pub fn token_count(&self, text: &str) -> Result<usize, ClassifierError> {
        self.count_tokens(text)
    }

    /// Turns raw logits into the top label and its softmax probability.
    pub(crate) fn decode(
        labels: &[SentimentLabel],
        logits: &ndarray::Array1<f32>,
    ) -> Result<Prediction, ClassifierError> {
        if logits.len() != labels.len() {
            return Err(ClassifierError::PredictionError(format!(
                "Model returned {} logits but {} labels are configured",
                logits.len(),
                labels.len()
            )));
        }
        let probabilities = softmax(logits);
        let (index, confidence) = argmax(&probabilities)
            .ok_or_else(|| ClassifierError::PredictionError("Model returned no usable scores".into()))?;
        Ok(Prediction::new(labels[index], confidence))
    }
}

impl Classify for SentimentClassifier {
    fn classify(&self, text: &str) -> Result<Prediction, ClassifierError> {
        let logits = self.logits(text)?;
        Self::decode(&self.model_characteristics.labels, &logits)
    }
}
