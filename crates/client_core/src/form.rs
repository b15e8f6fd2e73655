//! In-progress review input, mutated by one call per user event.

use std::fmt;

use shared::{
    domain::{Rating, RatingError, Wine},
    protocol::NewWine,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{resolver::WineResolver, ImageUpload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    WineName,
    Year,
    Grape,
    Rating,
    Review,
}

impl FormField {
    /// Name, year and grape describe the wine itself and follow the selection.
    pub fn describes_wine(self) -> bool {
        matches!(self, FormField::WineName | FormField::Year | FormField::Grape)
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FormField::WineName => "wine name",
            FormField::Year => "year",
            FormField::Grape => "grape",
            FormField::Rating => "rating",
            FormField::Review => "review",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("{0} is read-only while an existing wine is selected")]
    FieldLocked(FormField),
    #[error("{0} is required")]
    MissingField(FormField),
    #[error("an image is required")]
    MissingImage,
    #[error("choose an existing wine or mark the wine as new")]
    NoWineChosen,
    #[error("year '{0}' is not a whole number")]
    InvalidYear(String),
    #[error(transparent)]
    InvalidRating(#[from] RatingError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewFields {
    pub wine_name: String,
    pub year: String,
    pub grape: String,
    pub rating: String,
    pub review: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WineChoice {
    Existing(Wine),
    New(NewWine),
}

impl WineChoice {
    pub fn name(&self) -> &str {
        match self {
            WineChoice::Existing(wine) => &wine.name,
            WineChoice::New(wine) => &wine.wine_name,
        }
    }
}

/// Validated input, ready for the submission coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSubmission {
    pub wine: WineChoice,
    pub rating: Rating,
    pub review: String,
    pub image: ImageUpload,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewForm {
    search_text: String,
    suggestions: Vec<Wine>,
    selected: Option<Wine>,
    new_wine: bool,
    fields: ReviewFields,
    image: Option<ImageUpload>,
}

impl ReviewForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn suggestions(&self) -> &[Wine] {
        &self.suggestions
    }

    pub fn selected_wine(&self) -> Option<&Wine> {
        self.selected.as_ref()
    }

    pub fn is_new_wine(&self) -> bool {
        self.new_wine
    }

    pub fn fields(&self) -> &ReviewFields {
        &self.fields
    }

    pub fn image(&self) -> Option<&ImageUpload> {
        self.image.as_ref()
    }

    /// Records the search box text. Returns the query to look up, or `None`
    /// when the text is too short and the suggestions were cleared instead.
    pub fn set_search_text(&mut self, text: impl Into<String>) -> Option<String> {
        self.search_text = text.into();
        if WineResolver::is_searchable(&self.search_text) {
            Some(self.search_text.clone())
        } else {
            self.suggestions.clear();
            None
        }
    }

    /// Stores lookup results unless the search text moved on in the meantime.
    pub fn apply_suggestions(&mut self, query: &str, wines: Vec<Wine>) -> bool {
        if query != self.search_text {
            debug!(query, current = %self.search_text, "form: dropping stale suggestions");
            return false;
        }
        self.suggestions = wines;
        true
    }

    /// Search box event: updates the text and, when long enough, runs the lookup.
    /// A failed lookup leaves the previous suggestions in place.
    pub async fn search(
        &mut self,
        resolver: &WineResolver,
        text: impl Into<String>,
    ) -> anyhow::Result<()> {
        let Some(query) = self.set_search_text(text) else {
            return Ok(());
        };
        match resolver.search(&query).await {
            Ok(wines) => {
                self.apply_suggestions(&query, wines);
                Ok(())
            }
            Err(error) => {
                warn!(%error, query = %query, "form: wine search failed");
                Err(error)
            }
        }
    }

    pub fn select_wine(&mut self, wine: Wine) {
        self.fields = ReviewFields {
            wine_name: wine.name.clone(),
            year: wine.year.to_string(),
            grape: wine.grape.clone(),
            ..ReviewFields::default()
        };
        self.search_text = wine.name.clone();
        self.suggestions.clear();
        self.new_wine = false;
        self.selected = Some(wine);
    }

    pub fn select_suggestion(&mut self, index: usize) -> Option<&Wine> {
        let wine = self.suggestions.get(index)?.clone();
        self.select_wine(wine);
        self.selected.as_ref()
    }

    /// Either direction drops the selection and blanks every field.
    pub fn set_new_wine(&mut self, new_wine: bool) {
        self.selected = None;
        self.fields = ReviewFields::default();
        self.search_text.clear();
        self.suggestions.clear();
        self.new_wine = new_wine;
    }

    pub fn toggle_new_wine(&mut self) {
        self.set_new_wine(!self.new_wine);
    }

    pub fn wine_fields_locked(&self) -> bool {
        self.selected.is_some() && !self.new_wine
    }

    pub fn is_editable(&self, field: FormField) -> bool {
        !(field.describes_wine() && self.wine_fields_locked())
    }

    pub fn set_field(&mut self, field: FormField, value: impl Into<String>) -> Result<(), FormError> {
        if !self.is_editable(field) {
            return Err(FormError::FieldLocked(field));
        }
        let value = value.into();
        match field {
            FormField::WineName => self.fields.wine_name = value,
            FormField::Year => self.fields.year = value,
            FormField::Grape => self.fields.grape = value,
            FormField::Rating => self.fields.rating = value,
            FormField::Review => self.fields.review = value,
        }
        Ok(())
    }

    pub fn set_image(&mut self, image: ImageUpload) {
        self.image = Some(image);
    }

    pub fn clear_image(&mut self) {
        self.image = None;
    }

    /// Reads the current state as a submission without consuming it.
    pub fn validate(&self) -> Result<PendingSubmission, FormError> {
        let wine = self.wine_choice()?;

        let rating = required(&self.fields.rating, FormField::Rating)?.parse::<Rating>()?;
        let review = required(&self.fields.review, FormField::Review)?.to_string();

        let image = match &self.image {
            Some(image) if !image.bytes.is_empty() => image.clone(),
            _ => return Err(FormError::MissingImage),
        };

        Ok(PendingSubmission {
            wine,
            rating,
            review,
            image,
        })
    }

    /// Validates and, on success, hands the input over and resets the form.
    pub fn take_submission(&mut self) -> Result<PendingSubmission, FormError> {
        let submission = self.validate()?;
        *self = Self::default();
        Ok(submission)
    }

    fn wine_choice(&self) -> Result<WineChoice, FormError> {
        if self.new_wine {
            let wine_name = required(&self.fields.wine_name, FormField::WineName)?;
            let year = required(&self.fields.year, FormField::Year)?;
            let year = year
                .parse::<i32>()
                .map_err(|_| FormError::InvalidYear(year.to_string()))?;
            let grape = required(&self.fields.grape, FormField::Grape)?;
            return Ok(WineChoice::New(NewWine {
                wine_name: wine_name.to_string(),
                year,
                grape: grape.to_string(),
            }));
        }

        self.selected
            .clone()
            .map(WineChoice::Existing)
            .ok_or(FormError::NoWineChosen)
    }
}

fn required(value: &str, field: FormField) -> Result<&str, FormError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FormError::MissingField(field));
    }
    Ok(trimmed)
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
