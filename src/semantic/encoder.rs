//! Text encoders.
//!
//! The rest of the crate only sees [`VectorEncoder`]. Two backends exist:
//! - [`FastEmbedEncoder`]: local ONNX model through fastembed, loaded once
//! - [`ApiEncoder`]: remote encoder service speaking `/dimensions/` + `/encode/`
//!
//! Encoders never retry; a failed call surfaces as [`EncodeError`].

use fastembed::{InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{mpsc, Mutex};
use std::time::Duration;

/// Default download timeout for model files (5 minutes)
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for a single request to a remote encoder.
const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Encoder initialization failed: {0}")]
    InitFailed(String),

    #[error("Encoder initialization timed out after {0:?}")]
    InitTimeout(Duration),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Encoder request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Malformed encoder output: {0}")]
    Malformed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Maps text to a fixed-length vector.
pub trait VectorEncoder: Send + Sync {
    /// Output length, fixed for the lifetime of the encoder.
    fn dimension(&self) -> usize;

    /// Opaque identity of the model producing the vectors.
    ///
    /// Two encoders with equal fingerprints must produce comparable vectors.
    fn fingerprint(&self) -> String;

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodeError>;
}

/// SHA256 hex digest of an encoder descriptor.
pub fn fingerprint_of(descriptor: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(descriptor.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Run `load` on a worker thread and give up after `timeout`.
///
/// An expired load keeps running in the background until it finishes on its
/// own; its result is dropped.
fn load_with_timeout<T, F>(timeout: Duration, load: F) -> Result<T, EncodeError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EncodeError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(load());
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(EncodeError::InitTimeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(EncodeError::InitFailed(
            "model loader exited without a result".to_string(),
        )),
    }
}

fn check_dimension(embedding: Vec<f32>, expected: usize) -> Result<Vec<f32>, EncodeError> {
    if embedding.len() != expected {
        return Err(EncodeError::Malformed(format!(
            "expected {expected} values, got {}",
            embedding.len()
        )));
    }
    Ok(embedding)
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct FastEmbedEncoder {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl FastEmbedEncoder {
    /// Load the named model, downloading it into `cache_dir/models` if needed.
    ///
    /// # Arguments
    /// * `model_name` - Name of the model (e.g., "all-MiniLM-L6-v2")
    /// * `cache_dir` - Directory to cache downloaded models
    /// * `download_timeout` - Limit for download and load (default 5 minutes)
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
    ) -> Result<Self, EncodeError> {
        let model_enum = Self::parse_model_name(model_name)?;
        let timeout = download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT);

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EncodeError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let (model, dimensions) = load_with_timeout(timeout, move || {
            let options = InitOptions::new(model_enum)
                .with_cache_dir(models_dir)
                .with_show_download_progress(true);

            let mut model = TextEmbedding::try_new(options)
                .map_err(|e| EncodeError::InitFailed(e.to_string()))?;
            let dimensions = Self::probe_dimensions(&mut model)?;
            Ok((model, dimensions))
        })?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EncodeError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2)
            }
            "all-minilm-l6-v2-q" | "allminiml6v2q" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q)
            }
            "bge-small-en-v1.5" | "bgesmallenv15" => {
                Ok(fastembed::EmbeddingModel::BGESmallENV15)
            }
            "bge-base-en-v1.5" | "bgebaseenv15" => {
                Ok(fastembed::EmbeddingModel::BGEBaseENV15)
            }
            "bge-large-en-v1.5" | "bgelargeenv15" => {
                Ok(fastembed::EmbeddingModel::BGELargeENV15)
            }
            _ => Err(EncodeError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5",
                name
            ))),
        }
    }

    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EncodeError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EncodeError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EncodeError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl VectorEncoder for FastEmbedEncoder {
    fn dimension(&self) -> usize {
        self.dimensions
    }

    fn fingerprint(&self) -> String {
        fingerprint_of(&format!("fastembed:{}", self.model_name.to_lowercase()))
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodeError> {
        let mut model = self.model.lock().map_err(|e| {
            EncodeError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EncodeError::EmbeddingFailed(e.to_string()))?;

        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EncodeError::EmbeddingFailed("No embedding returned".to_string()))?;

        check_dimension(embedding, self.dimensions)
    }
}

#[derive(Debug, Serialize)]
struct EncodeRequest<'a> {
    sentence: &'a str,
}

#[derive(Debug, Deserialize)]
struct EncodeResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct DimensionsResponse {
    dimensions: usize,
}

/// Remote encoder reached over HTTP.
///
/// The dimension is requested once at construction.
pub struct ApiEncoder {
    client: reqwest::blocking::Client,
    base: url::Url,
    encode_url: url::Url,
    dimensions: usize,
}

impl ApiEncoder {
    pub fn new(base: &str) -> Result<Self, EncodeError> {
        let base = url::Url::parse(base)
            .map_err(|e| EncodeError::InitFailed(format!("Invalid encoder URL '{base}': {e}")))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| EncodeError::InitFailed(format!("Invalid encoder URL: {e}")))
        };
        let dimensions_url = join("/dimensions/")?;
        let encode_url = join("/encode/")?;

        let client = reqwest::blocking::Client::builder()
            .timeout(API_REQUEST_TIMEOUT)
            .build()?;

        let response: DimensionsResponse = client
            .get(dimensions_url)
            .send()?
            .error_for_status()?
            .json()?;
        if response.dimensions == 0 {
            return Err(EncodeError::Malformed(
                "encoder reported zero dimensions".to_string(),
            ));
        }

        Ok(Self {
            client,
            base,
            encode_url,
            dimensions: response.dimensions,
        })
    }

    pub fn base_url(&self) -> &url::Url {
        &self.base
    }
}

impl VectorEncoder for ApiEncoder {
    fn dimension(&self) -> usize {
        self.dimensions
    }

    fn fingerprint(&self) -> String {
        fingerprint_of(&format!("api:{}:{}", self.base, self.dimensions))
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodeError> {
        let response: EncodeResponse = self
            .client
            .post(self.encode_url.clone())
            .json(&EncodeRequest { sentence: text })
            .send()?
            .error_for_status()?
            .json()?;

        check_dimension(response.embedding, self.dimensions)
    }
}
