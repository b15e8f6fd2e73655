use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Rating, ReviewId, ReviewerId, WineId};

/// Insert payload for the `wines` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWine {
    pub wine_name: String,
    pub year: i32,
    pub grape: String,
}

/// Insert payload for the `reviews` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub wine_id: WineId,
    pub reviewer_id: ReviewerId,
    pub rating: Rating,
    pub review: String,
    pub image_url: String,
}

/// A review row read back from the store.
///
/// `rating` is the stored number as-is; only writes go through [`Rating`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: ReviewId,
    pub wine_id: WineId,
    pub reviewer_id: ReviewerId,
    pub rating: f64,
    pub review: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub wine_id: WineId,
    pub wine_created: bool,
    pub image_key: String,
    pub image_url: String,
}
