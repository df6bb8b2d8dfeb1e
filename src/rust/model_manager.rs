//! Local cache of the builtin model files.
//!
//! Every download is hashed with SHA-256. When a model has no pinned hashes
//! the digests of the first good download are recorded next to the files
//! (`sha256.json`) and every later start checks the files against them.

use std::path::{Path, PathBuf};
use std::fs;
use std::io;
use std::sync::Arc;
use std::env;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use sha2::{Sha256, Digest};

use crate::models::BuiltinModel;

/// Environment variable that overrides the model cache root.
pub const CACHE_ENV_VAR: &str = "SENTIMENT_MONITOR_CACHE";

const DIGESTS_FILE: &str = "sha256.json";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model not downloaded: {0}")]
    NotDownloaded(String),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("Download of {url} failed with HTTP status {status}")]
    HttpStatus {
        url: String,
        status: u16,
    },
    #[error("Truncated {file_type} download: expected {expected} bytes, got {actual}")]
    Truncated {
        file_type: String,
        expected: u64,
        actual: u64,
    },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Digest record error: {0}")]
    DigestRecord(#[from] serde_json::Error),
    #[error("Model verification failed")]
    VerificationFailed,
    #[error("Hash mismatch: expected {expected}, got {actual} for {file_type} file")]
    HashMismatch {
        file_type: String,
        expected: String,
        actual: String,
    },
}

/// SHA-256 digests of a downloaded model, as written to `sha256.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigests {
    pub model: String,
    pub tokenizer: String,
}

/// Downloads, caches and verifies model and tokenizer files.
#[derive(Clone, Debug)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
    pinned_model_hash: Option<String>,
    pinned_tokenizer_hash: Option<String>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl ModelManager {
    /// Creates a new ModelManager with the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        if let Ok(path) = env::var(CACHE_ENV_VAR) {
            return PathBuf::from(path).join("models");
        }

        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("sentiment-monitor").join("models");
        }

        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("sentiment-monitor").join("models");
        }

        env::temp_dir().join("sentiment-monitor").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
            pinned_model_hash: None,
            pinned_tokenizer_hash: None,
        })
    }

    /// Pins the expected SHA-256 of the model and/or tokenizer file.
    ///
    /// A pinned hash takes precedence over the one in [`crate::ModelInfo`] and
    /// over digests recorded by an earlier download.
    pub fn with_expected_hashes(mut self, model_hash: Option<String>, tokenizer_hash: Option<String>) -> Self {
        self.pinned_model_hash = model_hash.map(|h| h.trim().to_ascii_lowercase());
        self.pinned_tokenizer_hash = tokenizer_hash.map(|h| h.trim().to_ascii_lowercase());
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn get_model_path(&self, model: BuiltinModel) -> PathBuf {
        let info = model.get_model_info();
        self.models_dir.join(info.name).join("model.onnx")
    }

    pub fn get_tokenizer_path(&self, model: BuiltinModel) -> PathBuf {
        let info = model.get_model_info();
        self.models_dir.join(info.name).join("tokenizer.json")
    }

    fn get_digests_path(&self, model: BuiltinModel) -> PathBuf {
        let info = model.get_model_info();
        self.models_dir.join(info.name).join(DIGESTS_FILE)
    }

    pub fn is_model_downloaded(&self, model: BuiltinModel) -> bool {
        let model_path = self.get_model_path(model);
        let tokenizer_path = self.get_tokenizer_path(model);
        log::debug!("Model path: {:?} (exists: {})", model_path, model_path.exists());
        log::debug!("Tokenizer path: {:?} (exists: {})", tokenizer_path, tokenizer_path.exists());
        model_path.exists() && tokenizer_path.exists()
    }

    /// Returns the model and tokenizer paths, or `NotDownloaded` if either is missing.
    pub fn require_downloaded(&self, model: BuiltinModel) -> Result<(PathBuf, PathBuf), ModelError> {
        if !self.is_model_downloaded(model) {
            return Err(ModelError::NotDownloaded(model.get_model_info().name));
        }
        Ok((self.get_model_path(model), self.get_tokenizer_path(model)))
    }

    /// Digests written by the last successful download, if any.
    ///
    /// An unreadable record counts as missing.
    pub fn recorded_digests(&self, model: BuiltinModel) -> Option<FileDigests> {
        let path = self.get_digests_path(model);
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(digests) => Some(digests),
            Err(e) => {
                log::warn!("Ignoring malformed digest record {:?}: {}", path, e);
                None
            }
        }
    }

    /// Writes the digest record for `model`.
    pub fn record_digests(&self, model: BuiltinModel, digests: &FileDigests) -> Result<(), ModelError> {
        let path = self.get_digests_path(model);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(digests)?)?;
        log::debug!("Recorded digests at {:?}", path);
        Ok(())
    }

    /// Hashes the files are checked against: pinned first, then recorded ones.
    fn expected_digests(&self, model: BuiltinModel) -> (Option<String>, Option<String>) {
        let info = model.get_model_info();
        let recorded = self.recorded_digests(model);
        let model_hash = self
            .pinned_model_hash
            .clone()
            .or(info.model_hash)
            .or_else(|| recorded.as_ref().map(|d| d.model.clone()));
        let tokenizer_hash = self
            .pinned_tokenizer_hash
            .clone()
            .or(info.tokenizer_hash)
            .or_else(|| recorded.map(|d| d.tokenizer));
        (model_hash, tokenizer_hash)
    }

    pub async fn download_model(&self, model: BuiltinModel) -> Result<(), ModelError> {
        let info = model.get_model_info();
        let _lock = self.download_lock.lock().await;

        let model_dir = self.models_dir.join(&info.name);
        log::info!("Creating model directory at {:?}", model_dir);
        fs::create_dir_all(&model_dir)?;

        let (model_hash, tokenizer_hash) = self.expected_digests(model);

        let model_path = self.get_model_path(model);
        let model_result = self
            .fetch_unless_valid(&info.model_url, &model_path, model_hash.as_deref(), "model")
            .await;

        let tokenizer_path = self.get_tokenizer_path(model);
        let tokenizer_result = self
            .fetch_unless_valid(&info.tokenizer_url, &tokenizer_path, tokenizer_hash.as_deref(), "tokenizer")
            .await;

        let digests = match (model_result, tokenizer_result) {
            (Ok(model), Ok(tokenizer)) => FileDigests { model, tokenizer },
            (Err(e), _) => {
                log::error!("Failed to setup model file: {}", e);
                let _ = self.remove_download(model);
                return Err(e);
            }
            (_, Err(e)) => {
                log::error!("Failed to setup tokenizer file: {}", e);
                let _ = self.remove_download(model);
                return Err(e);
            }
        };

        self.record_digests(model, &digests)?;
        log::info!("Model and tokenizer ready to use");
        Ok(())
    }

    /// Keeps `path` if it matches `expected_hash`, otherwise downloads it.
    /// Returns the SHA-256 of the file now on disk.
    async fn fetch_unless_valid(
        &self,
        url: &str,
        path: &Path,
        expected_hash: Option<&str>,
        file_type: &str,
    ) -> Result<String, ModelError> {
        match (path.exists(), expected_hash) {
            (true, Some(expected)) => {
                if self.verify_file(path, Some(expected))? {
                    log::info!("Existing {} file verified successfully", file_type);
                    return Ok(expected.to_string());
                }
                log::warn!("{} file verification failed, redownloading", file_type);
            }
            (true, None) => log::warn!("No digest to check {} file against, redownloading", file_type),
            (false, _) => log::info!("{} file does not exist, downloading...", file_type),
        }
        self.download_and_verify_file(url, path, expected_hash, file_type).await
    }

    /// Checks a file against `expected_hash`. Files with nothing to check
    /// against only have to be non-empty.
    fn verify_file(&self, path: &Path, expected_hash: Option<&str>) -> Result<bool, ModelError> {
        let bytes = fs::read(path)?;
        if bytes.is_empty() {
            log::warn!("File {:?} is empty", path);
            return Ok(false);
        }
        let Some(expected) = expected_hash else {
            return Ok(true);
        };
        let hash = sha256_hex(&bytes);
        log::debug!("Calculated hash: {}", hash);
        log::debug!("Expected hash:   {}", expected);
        Ok(hash == expected)
    }

    /// Checks both files against the pinned or recorded digests.
    ///
    /// Files without any digest to compare to are reported as unverified.
    pub fn verify_model(&self, model: BuiltinModel) -> Result<bool, ModelError> {
        let model_path = self.get_model_path(model);
        let tokenizer_path = self.get_tokenizer_path(model);

        if !model_path.exists() || !tokenizer_path.exists() {
            log::info!("One or both model files do not exist");
            return Ok(false);
        }

        let (Some(model_hash), Some(tokenizer_hash)) = self.expected_digests(model) else {
            log::warn!("No digests recorded for {:?}, treating files as unverified", model);
            return Ok(false);
        };

        let model_ok = self.verify_file(&model_path, Some(&model_hash))?;
        let tokenizer_ok = self.verify_file(&tokenizer_path, Some(&tokenizer_hash))?;

        log::info!("Model hash verification: {}, tokenizer hash verification: {}", model_ok, tokenizer_ok);

        Ok(model_ok && tokenizer_ok)
    }

    async fn download_and_verify_file(
        &self,
        url: &str,
        path: &Path,
        expected_hash: Option<&str>,
        file_type: &str,
    ) -> Result<String, ModelError> {
        log::info!("Downloading {} file from {} to {:?}", file_type, url, path);
        let response = reqwest::get(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let content_length = response.content_length();
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        check_length(file_type, content_length, bytes.len())?;
        let hash = check_hash(file_type, &bytes, expected_hash)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, &bytes)?;

        if !self.verify_file(path, Some(&hash))? {
            return Err(ModelError::VerificationFailed);
        }

        log::info!("{} file downloaded and verified successfully (sha256 {})", file_type, hash);
        Ok(hash)
    }

    pub fn remove_download(&self, model: BuiltinModel) -> Result<(), ModelError> {
        for path in [
            self.get_model_path(model),
            self.get_tokenizer_path(model),
            self.get_digests_path(model),
        ] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Ensures that a model is downloaded and verified.
    /// If the model doesn't exist, it will be downloaded.
    /// If verification fails, it will be re-downloaded.
    pub async fn ensure_model_downloaded(&self, model: BuiltinModel) -> Result<(), ModelError> {
        log::info!("Checking if model {:?} is downloaded...", model);
        if !self.is_model_downloaded(model) {
            log::info!("Model not found, downloading...");
            self.download_model(model).await?;
        } else if !self.verify_model(model)? {
            log::info!("Model verification failed, re-downloading...");
            self.remove_download(model)?;
            self.download_model(model).await?;
        } else {
            log::info!("Model verification successful");
        }
        Ok(())
    }
}

/// Rejects a body shorter or longer than the advertised `Content-Length`.
fn check_length(file_type: &str, advertised: Option<u64>, received: usize) -> Result<(), ModelError> {
    let received = received as u64;
    match advertised {
        Some(expected) if expected != received => Err(ModelError::Truncated {
            file_type: file_type.to_string(),
            expected,
            actual: received,
        }),
        _ => Ok(()),
    }
}

/// Hashes a downloaded body and compares it with `expected_hash` when one is known.
fn check_hash(file_type: &str, bytes: &[u8], expected_hash: Option<&str>) -> Result<String, ModelError> {
    let hash = sha256_hex(bytes);
    if let Some(expected) = expected_hash {
        if hash != expected {
            log::error!("{} hash mismatch: expected {}, got {}", file_type, expected, hash);
            return Err(ModelError::HashMismatch {
                file_type: file_type.to_string(),
                expected: expected.to_string(),
                actual: hash,
            });
        }
    }
    Ok(hash)
}
