use std::path::Path;
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};
use ort::session::Session;
use log::{info, error};

use super::error::ClassifierError;
use super::model::SentimentClassifier;
use super::prediction::SentimentLabel;
use crate::{BuiltinModel, ModelCharacteristics, ModelManager, runtime::{RuntimeConfig, create_session_builder}};

/// Default truncation length for custom models
pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 512;

/// A builder for constructing a SentimentClassifier with a fluent interface.
#[derive(Default, Debug)]
pub struct SentimentClassifierBuilder {
    model_path: Option<String>,
    tokenizer_path: Option<String>,
    tokenizer: Option<Tokenizer>,
    session: Option<Session>,
    model_characteristics: Option<ModelCharacteristics>,
    runtime_config: RuntimeConfig,
    manager: Option<ModelManager>,
}

impl SentimentClassifierBuilder {
    /// Creates a new empty builder with default runtime configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime configuration for ONNX model execution.
    /// Must be called before `with_model` / `with_custom_model` to take effect.
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Uses `manager` instead of the default cache location to find built-in models.
    pub fn with_model_manager(mut self, manager: ModelManager) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Loads a built-in model from the model cache.
    ///
    /// # Errors
    /// * `BuildError` if a model was already set, the model is not downloaded,
    ///   or the model/tokenizer failed to load
    /// * `ModelError` if the model structure is invalid
    pub fn with_model(mut self, model: BuiltinModel) -> Result<Self, ClassifierError> {
        if self.model_path.is_some() || self.tokenizer_path.is_some() {
            return Err(ClassifierError::BuildError("Model and tokenizer paths already set".to_string()));
        }

        let manager = match self.manager.take() {
            Some(manager) => manager,
            None => ModelManager::new_default()
                .map_err(|e| ClassifierError::BuildError(format!("Failed to create model manager: {}", e)))?,
        };

        let (model_path, tokenizer_path) = manager.require_downloaded(model).map_err(|e| {
            ClassifierError::BuildError(format!(
                "{}. Please download it first using ModelManager::download_model()",
                e
            ))
        })?;
        let characteristics = model.characteristics();

        self.load(&model_path, &tokenizer_path, characteristics)
    }

    /// Loads a custom ONNX sequence-classification model.
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `tokenizer_path` - Path to the tokenizer.json file
    /// * `labels` - Model label per output logit, in index order (e.g. `["NEGATIVE", "POSITIVE"]`)
    /// * `max_sequence_length` - Truncation length, defaults to 512 tokens
    pub fn with_custom_model(
        self,
        model_path: &str,
        tokenizer_path: &str,
        labels: &[&str],
        max_sequence_length: Option<usize>,
    ) -> Result<Self, ClassifierError> {
        if model_path.is_empty() || tokenizer_path.is_empty() {
            return Err(ClassifierError::BuildError("Model and tokenizer paths cannot be empty".to_string()));
        }
        if self.model_path.is_some() || self.tokenizer_path.is_some() {
            return Err(ClassifierError::BuildError("Model and tokenizer paths already set".to_string()));
        }
        if labels.is_empty() {
            return Err(ClassifierError::BuildError("At least one label is required".to_string()));
        }
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::BuildError(format!("Model file not found: {}", model_path)));
        }
        if !Path::new(tokenizer_path).exists() {
            return Err(ClassifierError::BuildError(format!("Tokenizer file not found: {}", tokenizer_path)));
        }

        let characteristics = ModelCharacteristics {
            max_sequence_length: max_sequence_length.unwrap_or(DEFAULT_MAX_SEQUENCE_LENGTH),
            labels: labels.iter().map(|l| SentimentLabel::from_model_label(l)).collect(),
            model_size_mb: 0, // Not critical for functionality
        };

        self.load(Path::new(model_path), Path::new(tokenizer_path), characteristics)
    }

    fn load(
        mut self,
        model_path: &Path,
        tokenizer_path: &Path,
        characteristics: ModelCharacteristics,
    ) -> Result<Self, ClassifierError> {
        if characteristics.max_sequence_length == 0 {
            return Err(ClassifierError::BuildError("Max sequence length must be positive".into()));
        }

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| {
                error!("Failed to load tokenizer: {}", e);
                ClassifierError::BuildError(format!("Failed to load tokenizer: {}", e))
            })?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: characteristics.max_sequence_length,
                ..Default::default()
            }))
            .map_err(|e| ClassifierError::BuildError(format!("Failed to configure truncation: {}", e)))?;
        tokenizer.with_padding(None);
        info!("Tokenizer loaded successfully");

        let session = create_session_builder(&self.runtime_config)?
            .commit_from_file(model_path)?;

        Self::validate_model(&session)?;
        info!("Model structure validated successfully");

        self.model_path = Some(model_path.to_string_lossy().to_string());
        self.tokenizer_path = Some(tokenizer_path.to_string_lossy().to_string());
        self.tokenizer = Some(tokenizer);
        self.session = Some(session);
        self.model_characteristics = Some(characteristics);
        Ok(self)
    }

    /// Builds the classifier.
    ///
    /// # Errors
    /// * `BuildError` if no model has been loaded
    pub fn build(self) -> Result<SentimentClassifier, ClassifierError> {
        let (Some(model_path), Some(tokenizer_path)) = (self.model_path, self.tokenizer_path) else {
            return Err(ClassifierError::BuildError("Model and tokenizer paths must be set".to_string()));
        };
        let model_characteristics = self.model_characteristics
            .ok_or_else(|| ClassifierError::BuildError("Model characteristics not set".to_string()))?;
        let tokenizer = self.tokenizer
            .ok_or_else(|| ClassifierError::BuildError("No tokenizer loaded".into()))?;
        let session = self.session
            .ok_or_else(|| ClassifierError::BuildError("No ONNX model loaded".into()))?;

        Ok(SentimentClassifier {
            model_path,
            tokenizer_path,
            tokenizer: Arc::new(tokenizer),
            session: Arc::new(session),
            model_characteristics,
        })
    }

    /// Checks the model has input_ids/attention_mask inputs and a logits output
    fn validate_model(session: &Session) -> Result<(), ClassifierError> {
        let inputs = &session.inputs;
        if inputs.len() < 2 {
            return Err(ClassifierError::ModelError(
                format!("Model must have at least 2 inputs (input_ids and attention_mask), found {}", inputs.len())
            ));
        }

        if session.outputs.is_empty() {
            return Err(ClassifierError::ModelError(
                "Model must have at least 1 output for logits".to_string()
            ));
        }

        Ok(())
    }
}
