use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::EmbeddingConfig,
    error::{Error, Result},
};

/// Turns text into embedding vectors.
///
/// The retrieval core only needs `embed_query`; `embed_batch` is used when
/// building the embedding index from the corpus.
pub trait QueryEmbedder: Send + Sync {
    fn embed_query(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<f32>>> + Send;

    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;
}

#[derive(Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: EmbeddingInput<'a>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl RemoteEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                Error::Config(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    async fn request(
        &self,
        input: EmbeddingInput<'_>,
    ) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url);
        let body = EmbeddingRequest {
            model: &self.config.model,
            input,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::EmbeddingUnavailable(format!(
                "{url} returned {status}: {detail}"
            )));
        }

        let mut parsed: EmbeddingResponse =
            response.json().await.map_err(unavailable)?;
        parsed.data.sort_by_key(|d| d.index);
        debug!(
            model = %self.config.model,
            vectors = parsed.data.len(),
            "embedded"
        );
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

impl QueryEmbedder for RemoteEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.request(EmbeddingInput::Single(text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::EmbeddingUnavailable(
                    "embedding response contained no vectors".to_string(),
                )
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.request(EmbeddingInput::Batch(texts)).await?;
        if vectors.len() != texts.len() {
            return Err(Error::EmbeddingUnavailable(format!(
                "requested {} embeddings, received {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

impl std::fmt::Debug for RemoteEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEmbedder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn unavailable(e: reqwest::Error) -> Error {
    Error::EmbeddingUnavailable(e.to_string())
}
