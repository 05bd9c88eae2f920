/// Error covers every failure the pipeline can surface to a caller.
/// Per-game parse failures (NoMoves, IllegalMove) are recoverable during
/// ingest: the controller logs and skips, the run continues.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    BadInput(String),
    #[error("PGN stream is not valid UTF-8")]
    BadEncoding,
    #[error("game has no moves")]
    NoMoves,
    #[error("illegal SAN `{san}` at ply {ply}")]
    IllegalMove { ply: usize, san: String },
    #[error("game already stored with identical PGN")]
    DuplicateGame,
    #[error("embedding queue saturated with {pending} pending jobs")]
    QueueSaturated { pending: i64 },
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("{0} unavailable")]
    Unavailable(String),
    #[error(transparent)]
    Storage(#[from] tokio_postgres::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<crate::embed::EmbedError> for Error {
    fn from(e: crate::embed::EmbedError) -> Self {
        Error::Transient(e.to_string())
    }
}

impl From<crate::vector::VectorError> for Error {
    fn from(e: crate::vector::VectorError) -> Self {
        match e {
            crate::vector::VectorError::Unavailable(_) => {
                Error::Unavailable("vector store".to_string())
            }
            crate::vector::VectorError::Rejected(reason) => Error::Transient(reason),
        }
    }
}

impl From<crate::agent::AgentError> for Error {
    fn from(e: crate::agent::AgentError) -> Self {
        Error::Transient(e.to_string())
    }
}

impl Error {
    /// true when the ingest run may continue with the next game
    pub fn skippable(&self) -> bool {
        matches!(
            self,
            Error::NoMoves | Error::IllegalMove { .. } | Error::DuplicateGame
        )
    }

    /// CLI exit code: 1 for user errors, 2 for infrastructure failures
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::BadInput(_)
            | Error::BadEncoding
            | Error::NoMoves
            | Error::IllegalMove { .. }
            | Error::DuplicateGame
            | Error::QueueSaturated { .. } => 1,
            Error::Transient(_) | Error::Unavailable(_) | Error::Storage(_) | Error::Io(_) => 2,
        }
    }
}
