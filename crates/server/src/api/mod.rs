use std::sync::Arc;

use client_core::{
    FormError, FormField, HostedBackend, IdentityProvider, ImageUpload, ObjectStore, RecordStore,
    ReviewForm, Session, SessionError, SubmissionCoordinator, SubmissionError, SubmissionGate,
    SubmissionOptions, WineResolver,
};
use shared::{
    domain::{Wine, WineId},
    error::{ApiError, ErrorCode},
    protocol::{ReviewRecord, SubmissionReceipt},
};
use tracing::{info, warn};

/// Hands out backend handles, scoped to a session where the backend
/// enforces per-user access.
pub trait BackendConnector: Send + Sync {
    fn identity(&self) -> Arc<dyn IdentityProvider>;
    fn records(&self, session: Option<&Session>) -> Arc<dyn RecordStore>;
    fn objects(&self, session: &Session) -> Arc<dyn ObjectStore>;
}

impl BackendConnector for HostedBackend {
    fn identity(&self) -> Arc<dyn IdentityProvider> {
        Arc::new(self.clone())
    }

    fn records(&self, session: Option<&Session>) -> Arc<dyn RecordStore> {
        match session {
            Some(session) => Arc::new(self.with_access_token(session.access_token())),
            None => Arc::new(self.clone()),
        }
    }

    fn objects(&self, session: &Session) -> Arc<dyn ObjectStore> {
        Arc::new(self.with_access_token(session.access_token()))
    }
}

#[derive(Clone)]
pub struct ApiContext {
    pub backend: Arc<dyn BackendConnector>,
    pub gate: SubmissionGate,
    pub options: SubmissionOptions,
}

impl ApiContext {
    pub fn new(backend: Arc<dyn BackendConnector>, options: SubmissionOptions) -> Self {
        Self {
            backend,
            gate: SubmissionGate::new(),
            options,
        }
    }

    fn resolver(&self, session: &Session) -> WineResolver {
        WineResolver::new(self.backend.records(Some(session)))
    }
}

/// Raw values of a submitted review form, before validation.
#[derive(Debug, Clone, Default)]
pub struct ReviewUpload {
    pub wine_id: Option<WineId>,
    pub new_wine: bool,
    pub wine_name: String,
    pub year: String,
    pub grape: String,
    pub rating: String,
    pub review: String,
    pub image: Option<ImageUpload>,
}

pub async fn authenticate(
    ctx: &ApiContext,
    access_token: Option<&str>,
) -> Result<Session, ApiError> {
    let identity = ctx.backend.identity();
    Session::acquire(identity.as_ref(), access_token.unwrap_or_default())
        .await
        .map_err(session_error)
}

pub async fn search_wines(
    ctx: &ApiContext,
    session: &Session,
    query: &str,
) -> Result<Vec<Wine>, ApiError> {
    ctx.resolver(session)
        .search(query)
        .await
        .map_err(|e| upstream("wine search", e))
}

pub async fn wine_by_id(
    ctx: &ApiContext,
    session: &Session,
    wine_id: WineId,
) -> Result<Wine, ApiError> {
    ctx.resolver(session)
        .lookup(wine_id)
        .await
        .map_err(|e| upstream("wine lookup", e))?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("wine {wine_id} not found")))
}

pub async fn submit_review(
    ctx: &ApiContext,
    session: &Session,
    upload: ReviewUpload,
) -> Result<SubmissionReceipt, ApiError> {
    let mut form = ReviewForm::new();
    if upload.new_wine {
        form.set_new_wine(true);
        form.set_field(FormField::WineName, upload.wine_name)
            .map_err(form_error)?;
        form.set_field(FormField::Year, upload.year).map_err(form_error)?;
        form.set_field(FormField::Grape, upload.grape).map_err(form_error)?;
    } else if let Some(wine_id) = upload.wine_id {
        let wine = wine_by_id(ctx, session, wine_id).await?;
        form.select_wine(wine);
    }
    form.set_field(FormField::Rating, upload.rating)
        .map_err(form_error)?;
    form.set_field(FormField::Review, upload.review)
        .map_err(form_error)?;
    if let Some(image) = upload.image {
        form.set_image(image);
    }

    let submission = form.take_submission().map_err(form_error)?;
    let coordinator = SubmissionCoordinator::new(
        ctx.backend.records(Some(session)),
        ctx.backend.objects(session),
    )
    .with_gate(ctx.gate.clone())
    .with_options(ctx.options);

    coordinator
        .submit(session, submission)
        .await
        .map_err(submission_error)
}

pub async fn recent_reviews(ctx: &ApiContext, limit: usize) -> Result<Vec<ReviewRecord>, ApiError> {
    ctx.backend
        .records(None)
        .recent_reviews(limit)
        .await
        .map_err(|e| upstream("review listing", e))
}

pub async fn sign_out(ctx: &ApiContext, session: Session) -> Result<(), ApiError> {
    let identity = ctx.backend.identity();
    session
        .sign_out(identity.as_ref())
        .await
        .map_err(|e| upstream("sign out", e))
}

fn session_error(err: SessionError) -> ApiError {
    match err {
        SessionError::Unauthenticated => ApiError::new(ErrorCode::Unauthorized, err.to_string()),
        SessionError::Provider(_) => ApiError::new(ErrorCode::Upstream, err.to_string()),
    }
}

fn form_error(err: FormError) -> ApiError {
    info!(error = %err, "api: review form rejected");
    ApiError::new(ErrorCode::Validation, err.to_string())
}

fn submission_error(err: SubmissionError) -> ApiError {
    match err {
        SubmissionError::InFlight(_) => ApiError::new(ErrorCode::RateLimited, err.to_string()),
        SubmissionError::Upload { .. }
        | SubmissionError::UrlResolution { .. }
        | SubmissionError::Persistence { .. } => {
            ApiError::new(ErrorCode::Upstream, err.to_string())
        }
    }
}

fn upstream(operation: &str, err: anyhow::Error) -> ApiError {
    warn!(operation, error = %err, "api: backend call failed");
    ApiError::new(ErrorCode::Upstream, format!("{operation} failed: {err}"))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
