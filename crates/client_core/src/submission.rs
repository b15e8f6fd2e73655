use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{
    domain::Rating,
    protocol::{NewReview, SubmissionReceipt},
};
use tracing::{error, info, warn};

use crate::{
    error::{PersistedEntity, SubmissionError},
    form::{PendingSubmission, WineChoice},
    gate::SubmissionGate,
    resolver::WineResolver,
    session::Session,
    ObjectStore, RecordStore,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmissionOptions {
    /// Delete the uploaded image when a later step fails. Off by default, in
    /// which case the image stays in the bucket unreferenced.
    pub remove_orphaned_images: bool,
}

/// Object key for a review image: `<wine name>-<unix millis>`.
pub fn image_key(wine_name: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", wine_name.trim(), at.timestamp_millis())
}

/// Runs upload, url lookup, wine resolution and review insert in that order,
/// stopping at the first failure.
pub struct SubmissionCoordinator {
    resolver: WineResolver,
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    gate: SubmissionGate,
    options: SubmissionOptions,
}

impl SubmissionCoordinator {
    pub fn new(records: Arc<dyn RecordStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            resolver: WineResolver::new(Arc::clone(&records)),
            records,
            objects,
            gate: SubmissionGate::new(),
            options: SubmissionOptions::default(),
        }
    }

    pub fn with_gate(mut self, gate: SubmissionGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_options(mut self, options: SubmissionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn resolver(&self) -> &WineResolver {
        &self.resolver
    }

    pub async fn submit(
        &self,
        session: &Session,
        submission: PendingSubmission,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let reviewer = session.reviewer().id;
        let Some(_permit) = self.gate.try_acquire(reviewer) else {
            warn!(%reviewer, "submission: rejected, another one is in flight");
            return Err(SubmissionError::InFlight(reviewer));
        };

        let PendingSubmission {
            wine,
            rating,
            review,
            image,
        } = submission;

        let key = image_key(wine.name(), Utc::now());
        info!(%reviewer, key = %key, bytes = image.bytes.len(), "submission: uploading image");
        if let Err(source) = self.objects.upload(&key, &image).await {
            error!(key = %key, error = %source, "submission: image upload failed");
            return Err(SubmissionError::Upload { key, source });
        }

        let outcome = self
            .finish_uploaded(session, &key, &wine, rating, review)
            .await;
        if outcome.is_err() {
            self.discard_orphaned_image(&key).await;
        }
        outcome
    }

    async fn finish_uploaded(
        &self,
        session: &Session,
        key: &str,
        wine: &WineChoice,
        rating: Rating,
        review: String,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let image_url = self.objects.public_url(key).map_err(|source| {
            error!(key, error = %source, "submission: public url lookup failed");
            SubmissionError::UrlResolution {
                key: key.to_string(),
                source,
            }
        })?;

        let resolved = self.resolver.resolve(wine).await?;

        let new_review = NewReview {
            wine_id: resolved.wine.id,
            reviewer_id: session.reviewer().id,
            rating,
            review,
            image_url: image_url.clone(),
        };
        if let Err(source) = self.records.insert_review(&new_review).await {
            error!(
                wine_id = %resolved.wine.id,
                error = %source,
                "submission: review insert failed"
            );
            if resolved.created {
                warn!(wine_id = %resolved.wine.id, "submission: new wine kept without a review");
            }
            return Err(SubmissionError::Persistence {
                entity: PersistedEntity::Review,
                source,
            });
        }

        info!(
            reviewer = %session.reviewer().id,
            wine_id = %resolved.wine.id,
            wine_created = resolved.created,
            key,
            "submission: review stored"
        );
        Ok(SubmissionReceipt {
            wine_id: resolved.wine.id,
            wine_created: resolved.created,
            image_key: key.to_string(),
            image_url,
        })
    }

    async fn discard_orphaned_image(&self, key: &str) {
        if !self.options.remove_orphaned_images {
            warn!(key, "submission: halted after upload, image left orphaned");
            return;
        }
        match self.objects.remove(key).await {
            Ok(()) => info!(key, "submission: removed orphaned image"),
            Err(error) => warn!(key, %error, "submission: orphaned image cleanup failed"),
        }
    }
}

#[cfg(test)]
#[path = "tests/submission_tests.rs"]
mod tests;
