//! # Embeddings
//!
//! [`EmbeddingBackend`] is the narrow contract with the embedding service: given texts,
//! return one vector per text in the same order. [`OpenAiEmbeddingBackend`] speaks the
//! OpenAI-compatible `/embeddings` endpoint through `async-openai`.
//!
//! [`EmbeddingClient`] sits on top and owns the batching policy:
//!
//! - inputs are split into batches of at most `batch_size` texts,
//! - up to `concurrency` batches are in flight at once, and results are reassembled in
//!   input order (`futures::StreamExt::buffered`, not `buffer_unordered`),
//! - every batch runs under a timeout,
//! - the first failing batch aborts the whole call; nothing partial is returned,
//! - the output must have one vector per input and a single, non-zero dimension.
//!
//! Embeddings are never cached between calls.

use std::sync::Arc;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, error, info};

use crate::config::StudyRagConfig;
use crate::error::{RagError, Result};

/// Default number of texts per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// An embedding service.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed one batch. Must return exactly one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "embedding-backend"
    }
}

/// OpenAI-compatible embedding backend.
pub struct OpenAiEmbeddingBackend {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbeddingBackend {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        debug!(api_base, model, "embedding client created");
        Self {
            client: Client::with_config(openai_config),
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &StudyRagConfig) -> Self {
        Self::new(&config.api_base, &config.api_key, &config.embedding_model)
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddingBackend {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()
            .map_err(|e| RagError::EmbeddingBackend(format!("invalid request: {e}")))?;

        let response = self.client.embeddings().create(request).await.map_err(|e| {
            error!(model = %self.model, error = %e, "embedding request failed");
            RagError::EmbeddingBackend(e.to_string())
        })?;

        // The service reports each vector's input position; do not trust wire order.
        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Batching, ordering and validation around an [`EmbeddingBackend`].
#[derive(Clone)]
pub struct EmbeddingClient {
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
    concurrency: usize,
    timeout: Duration,
}

impl EmbeddingClient {
    /// Sequential client with the default batch size and a two-minute batch timeout.
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            backend,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: 1,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn from_config(backend: Arc<dyn EmbeddingBackend>, config: &StudyRagConfig) -> Self {
        Self::new(backend)
            .with_batch_size(config.embedding_batch_size)
            .with_concurrency(config.embedding_concurrency)
            .with_timeout(Duration::from_secs(config.request_timeout_secs))
    }

    /// Values below one are raised to one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Values below one are raised to one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed `texts`, returning vectors aligned with the input.
    ///
    /// # Errors
    /// [`RagError::EmbeddingBackend`] if any batch fails or times out, if a batch returns
    /// the wrong number of vectors, or if vector dimensions disagree.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<&[String]> = texts.chunks(self.batch_size).collect();
        info!(
            backend = self.backend.name(),
            texts = texts.len(),
            batches = batches.len(),
            concurrency = self.concurrency,
            "embedding texts"
        );

        let per_batch: Vec<Vec<Vec<f32>>> = stream::iter(batches.into_iter().enumerate())
            .map(|(batch, inputs)| self.embed_one_batch(batch, inputs))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let vectors: Vec<Vec<f32>> = per_batch.into_iter().flatten().collect();
        check_dimensions(&vectors)?;
        Ok(vectors)
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::EmbeddingBackend("no vector returned".into()))
    }

    async fn embed_one_batch(&self, batch: usize, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(batch, size = inputs.len(), "dispatching embedding batch");

        let vectors = tokio::time::timeout(self.timeout, self.backend.embed_batch(inputs))
            .await
            .map_err(|_| {
                error!(batch, timeout = ?self.timeout, "embedding batch timed out");
                RagError::EmbeddingBackend(format!(
                    "batch {batch} timed out after {:?}",
                    self.timeout
                ))
            })??;

        if vectors.len() != inputs.len() {
            return Err(RagError::EmbeddingBackend(format!(
                "batch {batch} returned {} vectors for {} inputs",
                vectors.len(),
                inputs.len()
            )));
        }
        Ok(vectors)
    }
}

fn check_dimensions(vectors: &[Vec<f32>]) -> Result<()> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    let dimension = first.len();
    if dimension == 0 {
        return Err(RagError::EmbeddingBackend("received zero-length vector".into()));
    }
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
        return Err(RagError::EmbeddingBackend(format!(
            "vector {i} has dimension {}, expected {dimension}",
            v.len()
        )));
    }
    Ok(())
}
