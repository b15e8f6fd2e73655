use std::sync::Arc;

use super::*;
use crate::fakes::{image, wine, TestRecordStore};

fn barolo() -> Wine {
    wine(42, "Barolo", 2015, "Nebbiolo")
}

fn resolver_with(store: Arc<TestRecordStore>) -> WineResolver {
    WineResolver::new(store)
}

#[test]
fn short_search_text_clears_suggestions_without_a_query() {
    let mut form = ReviewForm::new();
    assert_eq!(form.set_search_text("Bar"), Some("Bar".to_string()));
    assert!(form.apply_suggestions("Bar", vec![barolo()]));
    assert_eq!(form.suggestions().len(), 1);

    assert_eq!(form.set_search_text("Ba"), None);
    assert!(form.suggestions().is_empty());
}

#[test]
fn stale_suggestions_are_dropped() {
    let mut form = ReviewForm::new();
    form.set_search_text("Bar");
    form.set_search_text("Barb");

    assert!(!form.apply_suggestions("Bar", vec![barolo()]));
    assert!(form.suggestions().is_empty());
}

#[tokio::test]
async fn search_fills_suggestions_from_the_resolver() {
    let store = Arc::new(TestRecordStore::with_wines(vec![
        barolo(),
        wine(7, "Barbera d'Alba", 2019, "Barbera"),
        wine(8, "Chianti", 2020, "Sangiovese"),
    ]));
    let resolver = resolver_with(Arc::clone(&store));
    let mut form = ReviewForm::new();

    form.search(&resolver, "bar").await.expect("search");
    let names: Vec<&str> = form.suggestions().iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["Barolo", "Barbera d'Alba"]);

    form.search(&resolver, "b").await.expect("short search");
    assert!(form.suggestions().is_empty());
    assert_eq!(store.searches(), 1);
}

#[tokio::test]
async fn failed_search_keeps_previous_suggestions() {
    let store = Arc::new(TestRecordStore::with_wines(vec![barolo()]));
    let mut form = ReviewForm::new();
    form.search(&resolver_with(store), "Bar").await.expect("search");

    let failing = Arc::new(TestRecordStore {
        fail_search: Some("backend unavailable".to_string()),
        ..TestRecordStore::default()
    });
    let result = form.search(&resolver_with(failing), "Baro").await;

    assert!(result.is_err());
    assert_eq!(form.suggestions(), &[barolo()]);
}

#[test]
fn selecting_a_suggestion_fills_and_locks_wine_fields() {
    let mut form = ReviewForm::new();
    form.set_search_text("Bar");
    form.apply_suggestions("Bar", vec![barolo()]);

    let selected = form.select_suggestion(0).cloned();
    assert_eq!(selected, Some(barolo()));
    assert_eq!(form.fields().wine_name, "Barolo");
    assert_eq!(form.fields().year, "2015");
    assert_eq!(form.fields().grape, "Nebbiolo");
    assert!(form.suggestions().is_empty());
    assert!(form.wine_fields_locked());

    assert_eq!(
        form.set_field(FormField::Grape, "Merlot"),
        Err(FormError::FieldLocked(FormField::Grape))
    );
    assert_eq!(form.fields().grape, "Nebbiolo");
    assert!(form.set_field(FormField::Rating, "4.5").is_ok());
}

#[test]
fn out_of_range_suggestion_index_selects_nothing() {
    let mut form = ReviewForm::new();
    assert!(form.select_suggestion(3).is_none());
    assert!(form.selected_wine().is_none());
}

#[test]
fn toggling_new_wine_clears_the_form_both_ways() {
    let mut form = ReviewForm::new();
    form.select_wine(barolo());
    form.set_field(FormField::Review, "tar and roses").expect("review");

    form.toggle_new_wine();
    assert!(form.is_new_wine());
    assert!(form.selected_wine().is_none());
    assert_eq!(form.fields(), &ReviewFields::default());
    assert!(form.search_text().is_empty());
    assert!(!form.wine_fields_locked());

    form.set_field(FormField::WineName, "Chianti").expect("editable");
    form.toggle_new_wine();
    assert!(!form.is_new_wine());
    assert_eq!(form.fields(), &ReviewFields::default());
}

#[test]
fn validate_builds_an_existing_wine_submission() {
    let mut form = ReviewForm::new();
    form.select_wine(barolo());
    form.set_field(FormField::Rating, "4.5").expect("rating");
    form.set_field(FormField::Review, "Great").expect("review");
    form.set_image(image(b"jpeg"));

    let submission = form.validate().expect("valid");
    assert_eq!(submission.wine, WineChoice::Existing(barolo()));
    assert_eq!(submission.rating.value(), 4.5);
    assert_eq!(submission.review, "Great");
    assert_eq!(submission.image.bytes, b"jpeg".to_vec());
}

#[test]
fn validate_builds_a_new_wine_submission() {
    let mut form = ReviewForm::new();
    form.set_new_wine(true);
    form.set_field(FormField::WineName, " Chianti ").expect("name");
    form.set_field(FormField::Year, "2020").expect("year");
    form.set_field(FormField::Grape, "Sangiovese").expect("grape");
    form.set_field(FormField::Rating, "3.0").expect("rating");
    form.set_field(FormField::Review, "Bright cherry").expect("review");
    form.set_image(image(b"png"));

    let submission = form.validate().expect("valid");
    assert_eq!(
        submission.wine,
        WineChoice::New(NewWine {
            wine_name: "Chianti".to_string(),
            year: 2020,
            grape: "Sangiovese".to_string(),
        })
    );
}

#[test]
fn validate_reports_the_first_problem() {
    let mut form = ReviewForm::new();
    assert_eq!(form.validate(), Err(FormError::NoWineChosen));

    form.set_new_wine(true);
    assert_eq!(
        form.validate(),
        Err(FormError::MissingField(FormField::WineName))
    );

    form.set_field(FormField::WineName, "Chianti").expect("name");
    form.set_field(FormField::Year, "twenty").expect("year");
    form.set_field(FormField::Grape, "Sangiovese").expect("grape");
    assert_eq!(
        form.validate(),
        Err(FormError::InvalidYear("twenty".to_string()))
    );

    form.set_field(FormField::Year, "2020").expect("year");
    form.set_field(FormField::Rating, "7").expect("rating");
    assert!(matches!(
        form.validate(),
        Err(FormError::InvalidRating(RatingError::OutOfRange(_)))
    ));

    form.set_field(FormField::Rating, "4").expect("rating");
    assert_eq!(
        form.validate(),
        Err(FormError::MissingField(FormField::Review))
    );

    form.set_field(FormField::Review, "ok").expect("review");
    assert_eq!(form.validate(), Err(FormError::MissingImage));

    form.set_image(image(b""));
    assert_eq!(form.validate(), Err(FormError::MissingImage));
}

#[test]
fn take_submission_resets_only_on_success() {
    let mut form = ReviewForm::new();
    form.select_wine(barolo());
    form.set_field(FormField::Rating, "4").expect("rating");

    assert!(form.take_submission().is_err());
    assert!(form.selected_wine().is_some());

    form.set_field(FormField::Review, "Structured").expect("review");
    form.set_image(image(b"jpeg"));
    let submission = form.take_submission().expect("submission");

    assert_eq!(submission.wine.name(), "Barolo");
    assert!(form.selected_wine().is_none());
    assert!(form.image().is_none());
    assert_eq!(form.fields(), &ReviewFields::default());
}
