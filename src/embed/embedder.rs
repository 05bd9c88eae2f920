use crate::EMBED_DIMENSION;
use std::hash::Hasher;

/// Failures from the external embedding service. Every kind re-enters the
/// queue as pending; the attempt ceiling is what terminates a job.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedder network failure: {0}")]
    Network(String),
    #[error("embedder rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    #[error("embedder returned malformed response: {0}")]
    Malformed(String),
    #[error("embedder rejected request: {0}")]
    Rejected(String),
}

/// Abstract embedding capability. Accepts up to 16 inputs per call and
/// returns one fixed-dimension vector per input, in input order.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    fn dimension(&self) -> usize {
        EMBED_DIMENSION
    }
}

/// Stable vector id: 64-bit FNV-1a over the canonical FEN, as lower hex.
/// Two positions with identical FEN share one vector point.
pub fn vector_id(fen: &str) -> String {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(fen.as_bytes());
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_ids_are_deterministic() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        assert_eq!(vector_id(fen), vector_id(fen));
        assert_eq!(vector_id(fen).len(), 16);
    }

    #[test]
    fn different_fens_diverge() {
        let a = vector_id("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
        let b = vector_id("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1");
        assert_ne!(a, b);
    }
}
