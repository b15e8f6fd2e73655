use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{Reviewer, Wine, WineId},
    protocol::{NewReview, NewWine, ReviewRecord},
};

pub mod error;
pub mod form;
mod gate;
pub mod hosted;
pub mod resolver;
mod session;
pub mod submission;

pub use error::{PersistedEntity, SessionError, SubmissionError};
pub use form::{FormError, FormField, PendingSubmission, ReviewFields, ReviewForm, WineChoice};
pub use gate::{SubmissionGate, SubmissionPermit};
pub use hosted::{HostedBackend, HostedConfig};
pub use resolver::{ResolvedWine, WineResolver, MAX_SUGGESTIONS};
pub use session::Session;
pub use submission::{image_key, SubmissionCoordinator, SubmissionOptions};

/// Auth side of the hosted backend.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` means the token is missing, expired or revoked.
    async fn current_user(&self, access_token: &str) -> Result<Option<Reviewer>>;
    async fn sign_out(&self, access_token: &str) -> Result<()>;
}

/// Relational side of the hosted backend: the `wines` and `reviews` tables.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Case-insensitive substring match on the wine name, in backend order.
    async fn search_wines(&self, query: &str, limit: usize) -> Result<Vec<Wine>>;
    async fn wine_by_id(&self, wine_id: WineId) -> Result<Option<Wine>>;
    async fn insert_wine(&self, wine: &NewWine) -> Result<Wine>;
    async fn insert_review(&self, review: &NewReview) -> Result<()>;
    async fn recent_reviews(&self, limit: usize) -> Result<Vec<ReviewRecord>>;
}

/// Bucketed object storage for review images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, key: &str, image: &ImageUpload) -> Result<()>;
    fn public_url(&self, key: &str) -> Result<String>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn content_type_or_default(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or("application/octet-stream")
    }
}

#[cfg(test)]
#[path = "tests/fakes.rs"]
mod fakes;
