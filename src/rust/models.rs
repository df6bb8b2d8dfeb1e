use crate::classifier::SentimentLabel;

/// Pre-trained sentiment models the application knows how to fetch and load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinModel {
    /// DistilBERT base uncased, fine-tuned on SST-2 (binary positive/negative).
    DistilBertSst2,
}

/// Static properties of a model that the classifier needs at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCharacteristics {
    /// Inputs longer than this are truncated by the tokenizer
    pub max_sequence_length: usize,
    /// Output logit index -> label
    pub labels: Vec<SentimentLabel>,
    pub model_size_mb: usize,
}

/// Where to download a model from and how to check what was downloaded.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub model_url: String,
    pub tokenizer_url: String,
    /// SHA-256 of the ONNX file. `None` falls back to the digest recorded at download.
    pub model_hash: Option<String>,
    /// SHA-256 of tokenizer.json. `None` falls back to the digest recorded at download.
    pub tokenizer_hash: Option<String>,
}

impl BuiltinModel {
    pub fn get_model_info(&self) -> ModelInfo {
        match self {
            BuiltinModel::DistilBertSst2 => ModelInfo {
                name: "distilbert-sst2".to_string(),
                model_url: "https://huggingface.co/Xenova/distilbert-base-uncased-finetuned-sst-2-english/resolve/main/onnx/model.onnx".to_string(),
                tokenizer_url: "https://huggingface.co/Xenova/distilbert-base-uncased-finetuned-sst-2-english/resolve/main/tokenizer.json".to_string(),
                model_hash: None,
                tokenizer_hash: None,
            },
        }
    }

    pub fn characteristics(&self) -> ModelCharacteristics {
        match self {
            BuiltinModel::DistilBertSst2 => ModelCharacteristics {
                max_sequence_length: 512,
                labels: vec![SentimentLabel::Negative, SentimentLabel::Positive],
                model_size_mb: 268,
            },
        }
    }
}
