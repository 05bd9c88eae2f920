use crate::VECTOR_TIMEOUT;
use crate::vector::Condition;
use crate::vector::Hit;
use crate::vector::PointPayload;
use crate::vector::SearchFilter;
use crate::vector::VectorError;
use crate::vector::VectorStore;
use serde_json::json;

pub const COLLECTION: &str = "chessmate_positions";

/// Qdrant over its HTTP API. Point ids are the position's 64-bit FEN hash;
/// identical FENs collapse onto one point.
pub struct QdrantStore {
    http: reqwest::Client,
    base: String,
}

impl QdrantStore {
    pub fn new(base: &str) -> Result<Self, VectorError> {
        let http = reqwest::Client::builder()
            .timeout(VECTOR_TIMEOUT)
            .build()
            .map_err(|e| VectorError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    /// idempotent collection bootstrap, run once at worker startup
    pub async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorError> {
        let url = format!("{}/collections/{}", self.base, COLLECTION);
        let body = json!({
            "vectors": { "size": dimension, "distance": "Cosine" }
        });
        let response = self
            .http
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(connectivity)?;
        // conflict just means another worker got there first
        if response.status().is_success() || response.status() == reqwest::StatusCode::CONFLICT {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    fn point_id(id: &str) -> u64 {
        u64::from_str_radix(id, 16).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl VectorStore for QdrantStore {
    async fn upsert_point(
        &self,
        id: &str,
        vector: &[f32],
        payload: &PointPayload,
    ) -> Result<(), VectorError> {
        let url = format!("{}/collections/{}/points?wait=true", self.base, COLLECTION);
        let body = json!({
            "points": [{
                "id": Self::point_id(id),
                "vector": vector,
                "payload": payload,
            }]
        });
        let response = self
            .http
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(connectivity)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<Hit>, VectorError> {
        let url = format!(
            "{}/collections/{}/points/search",
            self.base, COLLECTION
        );
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if !filter.is_empty() {
            body["filter"] = render_filter(filter);
        }
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(connectivity)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| VectorError::Rejected(format!("malformed search response: {e}")))?;
        Ok(parsed
            .result
            .into_iter()
            .map(|point| Hit {
                id: format!("{:016x}", point.id),
                // cosine similarity lands in [-1, 1]
                score: ((point.score + 1.0) / 2.0).clamp(0.0, 1.0),
                payload: point.payload,
            })
            .collect())
    }
}

fn render_filter(filter: &SearchFilter) -> serde_json::Value {
    let must = filter
        .must
        .iter()
        .map(|condition| match condition {
            Condition::Match { key, value } => json!({ "key": key, "match": { "value": value } }),
            Condition::Range { key, gte, lte } => {
                let mut range = serde_json::Map::new();
                if let Some(gte) = gte {
                    range.insert("gte".into(), json!(gte));
                }
                if let Some(lte) = lte {
                    range.insert("lte".into(), json!(lte));
                }
                json!({ "key": key, "range": range })
            }
        })
        .collect::<Vec<_>>();
    json!({ "must": must })
}

fn connectivity(e: reqwest::Error) -> VectorError {
    VectorError::Unavailable(e.to_string())
}

async fn status_error(response: reqwest::Response) -> VectorError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        VectorError::Unavailable(format!("{status}: {body}"))
    } else {
        VectorError::Rejected(format!("{status}: {body}"))
    }
}

#[derive(serde::Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(serde::Deserialize)]
struct ScoredPoint {
    id: u64,
    score: f32,
    payload: PointPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_render_to_qdrant_json() {
        let filter = SearchFilter::default()
            .matches("opening_slug", "kings_indian_defense")
            .at_least("white_elo", 2500.0);
        let rendered = render_filter(&filter);
        assert_eq!(
            rendered["must"][0]["match"]["value"],
            serde_json::json!("kings_indian_defense")
        );
        assert_eq!(rendered["must"][1]["range"]["gte"], serde_json::json!(2500.0));
    }

    #[test]
    fn point_ids_parse_from_hex() {
        assert_eq!(QdrantStore::point_id("00000000000000ff"), 255);
        assert_eq!(QdrantStore::point_id("not-hex"), 0);
    }
}
