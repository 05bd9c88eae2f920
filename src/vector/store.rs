use crate::Elo;
use crate::Ply;
use serde::Deserialize;
use serde::Serialize;

/// Payload attached to every vector point, derived from the position's
/// owning game. These are the only keys filters may reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    pub game_id: i64,
    pub white_name: String,
    pub black_name: String,
    pub white_elo: Option<Elo>,
    pub black_elo: Option<Elo>,
    pub opening_slug: Option<String>,
    pub eco_code: Option<String>,
    pub ply: Ply,
    pub result: String,
}

/// One k-NN result. Scores are normalized to [0, 1].
#[derive(Debug, Clone)]
pub struct Hit {
    pub id: String,
    pub score: f32,
    pub payload: PointPayload,
}

/// Equality or numeric-range predicate over a payload key.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Match { key: String, value: serde_json::Value },
    Range { key: String, gte: Option<f64>, lte: Option<f64> },
}

/// Conjunction of payload predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub must: Vec<Condition>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    pub fn matches(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.must.push(Condition::Match {
            key: key.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn at_least(mut self, key: &str, gte: f64) -> Self {
        self.must.push(Condition::Range {
            key: key.to_string(),
            gte: Some(gte),
            lte: None,
        });
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
    #[error("vector store rejected request: {0}")]
    Rejected(String),
}

/// Abstract vector store capability; the pipeline depends on this so tests
/// can substitute a deterministic in-memory double.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// idempotent: the same id may be written any number of times
    async fn upsert_point(
        &self,
        id: &str,
        vector: &[f32],
        payload: &PointPayload,
    ) -> Result<(), VectorError>;
    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<Hit>, VectorError>;
}
