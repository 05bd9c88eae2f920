use crate::EMBED_BATCH;
use crate::EMBED_TIMEOUT;
use crate::embed::EmbedError;
use crate::embed::Embedder;
use serde::Deserialize;
use serde::Serialize;

pub const EMBED_MODEL: &str = "text-embedding-3-small";
const EMBED_URL: &str = "https://api.openai.com/v1/embeddings";

/// OpenAI embeddings endpoint client.
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    key: String,
    model: String,
    url: String,
}

impl OpenAiEmbedder {
    pub fn new(key: &str) -> Result<Self, EmbedError> {
        let http = reqwest::Client::builder()
            .timeout(EMBED_TIMEOUT)
            .build()
            .map_err(|e| EmbedError::Network(e.to_string()))?;
        Ok(Self {
            http,
            key: key.to_string(),
            model: EMBED_MODEL.to_string(),
            url: EMBED_URL.to_string(),
        })
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait::async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        if inputs.len() > EMBED_BATCH {
            return Err(EmbedError::Rejected(format!(
                "batch of {} exceeds the {EMBED_BATCH}-input ceiling",
                inputs.len()
            )));
        }
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbedError::Network(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(EmbedError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(EmbedError::Network(format!("embedder returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Rejected(format!("{status}: {body}")));
        }
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Malformed(e.to_string()))?;
        if parsed.data.len() != inputs.len() {
            return Err(EmbedError::Malformed(format!(
                "expected {} vectors, got {}",
                inputs.len(),
                parsed.data.len()
            )));
        }
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}
