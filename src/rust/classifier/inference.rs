use tokenizers::Tokenizer;
use ort::session::Session;
use ndarray::{Array1, Array2};
use ort::value::Tensor;
use std::collections::HashMap;

use super::error::ClassifierError;

/// Runs a sequence-classification ONNX model over tokenized text.
///
/// The model is expected to:
/// - Accept `input_ids` and `attention_mask` (both shape [1, sequence_length])
/// - Output logits of shape [1, num_labels]
///
/// Truncation to the model's maximum length is configured on the tokenizer
/// itself, so arbitrarily long input is accepted.
pub(crate) trait SequenceClassification {
    /// Returns the initialized tokenizer if available
    fn tokenizer(&self) -> Option<&Tokenizer>;

    /// Returns the initialized ONNX session if available
    fn session(&self) -> Option<&Session>;

    /// Counts the tokens the model will see for `text`, special tokens included.
    ///
    /// # Errors
    /// - `TokenizerError` if the tokenizer is not initialized or cannot encode the text
    fn count_tokens(&self, text: &str) -> Result<usize, ClassifierError> {
        self.encode(text).map(|(ids, _)| ids.len())
    }

    /// Tokenizes `text` into ids and attention mask.
    fn encode(&self, text: &str) -> Result<(Vec<i64>, Vec<i64>), ClassifierError> {
        let tokenizer = self.tokenizer()
            .ok_or_else(|| ClassifierError::TokenizerError("Tokenizer not initialized".into()))?;

        let encoding = tokenizer.encode(text, true)?;

        let ids = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
        let mask = encoding.get_attention_mask().iter().map(|&m| i64::from(m)).collect();
        Ok((ids, mask))
    }

    /// Runs the model and returns the raw logits for a single input.
    ///
    /// # Errors
    /// - `ModelError` if the session is not initialized
    /// - `ModelError` if tensor creation, execution or output extraction fails
    fn logits(&self, text: &str) -> Result<Array1<f32>, ClassifierError> {
        let (ids, mask) = self.encode(text)?;
        let session = self.session()
            .ok_or_else(|| ClassifierError::ModelError("Session not initialized".into()))?;

        let len = ids.len();
        let input_array = Array2::from_shape_vec((1, len), ids)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create input array: {}", e)))?;
        let input_dyn = input_array.into_dyn();
        let input_ids = input_dyn.as_standard_layout();

        let mask_array = Array2::from_shape_vec((1, len), mask)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create mask array: {}", e)))?;
        let mask_dyn = mask_array.into_dyn();
        let attention_mask = mask_dyn.as_standard_layout();

        let mut input_tensors = HashMap::new();
        input_tensors.insert("input_ids", Tensor::from_array(&input_ids)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create input tensor: {}", e)))?);
        input_tensors.insert("attention_mask", Tensor::from_array(&attention_mask)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create mask tensor: {}", e)))?);

        let outputs = session.run(input_tensors)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0].try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::ModelError(format!("Failed to extract output tensor: {}", e)))?;

        // [1, num_labels] -> [num_labels]
        Ok(Array1::from_iter(output_tensor.iter().cloned()))
    }
}
