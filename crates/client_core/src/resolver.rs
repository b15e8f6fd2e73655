use std::sync::Arc;

use anyhow::Result;
use shared::domain::{Wine, WineId};
use tracing::{debug, error, info};

use crate::{
    error::{PersistedEntity, SubmissionError},
    form::WineChoice,
    RecordStore,
};

/// Queries of this many characters or fewer never reach the backend.
pub const MAX_UNSEARCHED_QUERY_CHARS: usize = 2;
pub const MAX_SUGGESTIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWine {
    pub wine: Wine,
    pub created: bool,
}

/// Turns a selection or a new-wine entry into a persisted wine id.
#[derive(Clone)]
pub struct WineResolver {
    records: Arc<dyn RecordStore>,
}

impl WineResolver {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    pub fn is_searchable(query: &str) -> bool {
        query.chars().count() > MAX_UNSEARCHED_QUERY_CHARS
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Wine>> {
        if !Self::is_searchable(query) {
            return Ok(Vec::new());
        }

        let wines = self.records.search_wines(query, MAX_SUGGESTIONS).await?;
        let returned = wines.len();
        // The backend treats `*` in a filter as a wildcard, so rows are
        // rechecked against the literal query.
        let needle = query.to_lowercase();
        let wines: Vec<Wine> = wines
            .into_iter()
            .filter(|wine| wine.name.to_lowercase().contains(&needle))
            .take(MAX_SUGGESTIONS)
            .collect();
        debug!(query, returned, matches = wines.len(), "resolver: wine search");
        Ok(wines)
    }

    pub async fn lookup(&self, wine_id: WineId) -> Result<Option<Wine>> {
        self.records.wine_by_id(wine_id).await
    }

    pub async fn resolve(&self, choice: &WineChoice) -> Result<ResolvedWine, SubmissionError> {
        match choice {
            WineChoice::Existing(wine) => Ok(ResolvedWine {
                wine: wine.clone(),
                created: false,
            }),
            WineChoice::New(new_wine) => {
                let wine = self.records.insert_wine(new_wine).await.map_err(|source| {
                    error!(
                        wine_name = %new_wine.wine_name,
                        error = %source,
                        "resolver: wine insert rejected"
                    );
                    SubmissionError::Persistence {
                        entity: PersistedEntity::Wine,
                        source,
                    }
                })?;
                info!(wine_id = %wine.id, wine_name = %wine.name, "resolver: created wine");
                Ok(ResolvedWine {
                    wine,
                    created: true,
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
