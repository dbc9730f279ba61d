use crate::model::{BoardId, IndicatorId, RelationId};

/// Every failure the scorecard client can surface.
///
/// Transport and validation failures come from the remote API; the relation
/// variants come from client-side checks run before a request is issued.
#[derive(Debug, thiserror::Error)]
pub enum ScorecardError {
    /// Network or protocol failure talking to the API.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered 401. The session token has already been cleared.
    #[error("unauthorized: session token rejected")]
    Unauthorized,

    /// The API answered with any other non-success status.
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("indicator {0} not found")]
    UnknownIndicator(IndicatorId),

    #[error("board {0} not found")]
    UnknownBoard(BoardId),

    #[error("relation {0} not found")]
    UnknownRelation(RelationId),

    /// A parent/child link refused before reaching the server.
    #[error("cannot link {parent} -> {child}: {reason}")]
    InvalidRelation {
        parent: IndicatorId,
        child: IndicatorId,
        reason: String,
    },

    #[error("cannot move position {from} to {to} in a list of {len}")]
    InvalidMove { from: usize, to: usize, len: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScorecardError {
    /// Shorthand used by fakes and tests to build a server-side rejection.
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        ScorecardError::Rejected {
            status,
            body: body.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScorecardError>;
