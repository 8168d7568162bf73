use crate::error::{ReportError, Result};
use crate::index::Embedder;
use crate::llm::types::*;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::time::sleep;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
const MAX_BATCH: usize = 100;
const MAX_ATTEMPTS: usize = 3;

fn unavailable(reason: impl Into<String>) -> ReportError {
    ReportError::EmbeddingUnavailable {
        backend: "gemini".to_string(),
        reason: reason.into(),
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Embeds `texts` in request batches, retrying rate limits and server errors.
    pub async fn batch_embed(
        &self,
        model: &str,
        texts: &[&str],
        task_type: TaskType,
    ) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH) {
            let payload = BatchEmbedContentsRequest {
                requests: chunk
                    .iter()
                    .map(|text| EmbedContentRequest {
                        model: format!("models/{}", model),
                        content: Content {
                            parts: vec![Part {
                                text: text.to_string(),
                            }],
                        },
                        task_type: Some(task_type),
                    })
                    .collect(),
            };

            let body = self.post_batch(model, &payload).await?;
            if body.embeddings.len() != chunk.len() {
                return Err(unavailable(format!(
                    "requested {} embeddings, received {}",
                    chunk.len(),
                    body.embeddings.len()
                )));
            }
            vectors.extend(body.embeddings.into_iter().map(|e| e.values));
        }
        Ok(vectors)
    }

    async fn post_batch(
        &self,
        model: &str,
        payload: &BatchEmbedContentsRequest,
    ) -> Result<BatchEmbedContentsResponse> {
        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            self.base_url, model, self.api_key
        );

        let mut attempt = 1;
        loop {
            let res = self.client.post(&url).json(payload).send().await?;
            let status = res.status();

            if status.is_success() {
                return Ok(res.json().await?);
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            let err_text = res.text().await?;
            if !retryable || attempt >= MAX_ATTEMPTS {
                return Err(unavailable(format!(
                    "Gemini API error (status {}): {}",
                    status, err_text
                )));
            }

            warn!(
                "Embedding request failed with {} (attempt {}/{}), retrying",
                status, attempt, MAX_ATTEMPTS
            );
            sleep(Duration::from_secs(2 * attempt as u64)).await;
            attempt += 1;
        }
    }
}

/// [`Embedder`] backed by the Gemini embedding API.
///
/// The trait is synchronous, so requests run on a private current-thread
/// runtime. Do not call it from inside another tokio runtime.
pub struct GeminiEmbedder {
    client: GeminiClient,
    model: String,
    runtime: Runtime,
}

impl GeminiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_client(GeminiClient::new(api_key.into()), DEFAULT_EMBEDDING_MODEL)
    }

    pub fn with_client(client: GeminiClient, model: impl Into<String>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            client,
            model: model.into(),
            runtime,
        })
    }

    fn run(&self, texts: &[&str], task_type: TaskType) -> Result<Vec<Vec<f32>>> {
        debug!("Embedding {} texts with {}", texts.len(), self.model);
        self.runtime
            .block_on(self.client.batch_embed(&self.model, texts, task_type))
            .map_err(|e| match e {
                ReportError::EmbeddingUnavailable { .. } => e,
                other => unavailable(other.to_string()),
            })
    }
}

impl Embedder for GeminiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.run(texts, TaskType::RetrievalDocument)
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.run(&[query], TaskType::RetrievalQuery)?
            .into_iter()
            .next()
            .ok_or_else(|| unavailable("no vector returned for the query"))
    }
}
