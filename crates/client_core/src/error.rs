use std::fmt;

use shared::domain::ReviewerId;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistedEntity {
    Wine,
    Review,
}

impl fmt::Display for PersistedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistedEntity::Wine => f.write_str("wine"),
            PersistedEntity::Review => f.write_str("review"),
        }
    }
}

/// Step failures of the review submission. Each one halts the sequence.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("a submission for reviewer {0} is already in flight")]
    InFlight(ReviewerId),
    #[error("image upload failed for key '{key}': {source}")]
    Upload { key: String, source: anyhow::Error },
    #[error("could not resolve a public url for key '{key}': {source}")]
    UrlResolution { key: String, source: anyhow::Error },
    #[error("failed to persist {entity}: {source}")]
    Persistence {
        entity: PersistedEntity,
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("identity provider unavailable: {0}")]
    Provider(#[source] anyhow::Error),
}
