//! REST client for the hosted backend: PostgREST tables, bucket storage and auth.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    Client, RequestBuilder, Response, StatusCode,
};
use serde_json::json;
use shared::{
    domain::{Reviewer, Wine, WineId},
    protocol::{NewReview, NewWine, ReviewRecord},
};
use tracing::{debug, info};
use url::Url;

use crate::{IdentityProvider, ImageUpload, ObjectStore, RecordStore};

pub const DEFAULT_IMAGE_BUCKET: &str = "wine-images";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

#[derive(Debug, Clone)]
pub struct HostedConfig {
    pub base_url: String,
    pub anon_key: String,
    pub image_bucket: String,
    pub request_timeout: Duration,
}

impl HostedConfig {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            anon_key: anon_key.into(),
            image_bucket: DEFAULT_IMAGE_BUCKET.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// One handle on the hosted backend. Table and storage calls carry the
/// session token when one is attached, the anon key otherwise.
#[derive(Debug, Clone)]
pub struct HostedBackend {
    http: Client,
    base_url: Url,
    anon_key: String,
    bucket: String,
    access_token: Option<String>,
}

impl HostedBackend {
    pub fn new(config: &HostedConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid backend url '{}'", config.base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("backend url '{}' cannot carry a path", config.base_url));
        }
        if config.anon_key.trim().is_empty() {
            return Err(anyhow!("backend anon key is empty"));
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            base_url,
            anon_key: config.anon_key.clone(),
            bucket: config.image_bucket.clone(),
            access_token: None,
        })
    }

    /// Same backend, acting as the reviewer that owns `access_token`.
    pub fn with_access_token(&self, access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..self.clone()
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn authorize(&self, request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        let bearer = token
            .or(self.access_token.as_deref())
            .unwrap_or(&self.anon_key);
        request.header("apikey", &self.anon_key).bearer_auth(bearer)
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("backend url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.endpoint(["rest", "v1", table])
    }

    fn object_url(&self, key: &str) -> Result<Url> {
        self.endpoint(["storage", "v1", "object", self.bucket.as_str(), key])
    }
}

async fn checked(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!("{operation} failed with {status}: {body}"))
}

/// Escapes LIKE metacharacters so user text only ever matches literally.
pub(crate) fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl RecordStore for HostedBackend {
    async fn search_wines(&self, query: &str, limit: usize) -> Result<Vec<Wine>> {
        let pattern = format!("ilike.*{}*", escape_like(query));
        let response = self
            .authorize(self.http.get(self.table_url("wines")?), None)
            .query(&[
                ("select", "*".to_string()),
                ("wine_name", pattern),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;
        let wines: Vec<Wine> = checked(response, "wine search").await?.json().await?;
        debug!(query, matches = wines.len(), "hosted: wine search");
        Ok(wines)
    }

    async fn wine_by_id(&self, wine_id: WineId) -> Result<Option<Wine>> {
        let response = self
            .authorize(self.http.get(self.table_url("wines")?), None)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{wine_id}"))])
            .send()
            .await?;
        let wines: Vec<Wine> = checked(response, "wine lookup").await?.json().await?;
        Ok(wines.into_iter().next())
    }

    async fn insert_wine(&self, wine: &NewWine) -> Result<Wine> {
        let response = self
            .authorize(self.http.post(self.table_url("wines")?), None)
            .header("Prefer", "return=representation")
            .header(ACCEPT, SINGLE_OBJECT)
            .json(wine)
            .send()
            .await?;
        let created: Wine = checked(response, "wine insert").await?.json().await?;
        info!(wine_id = %created.id, wine_name = %created.name, "hosted: wine inserted");
        Ok(created)
    }

    async fn insert_review(&self, review: &NewReview) -> Result<()> {
        let response = self
            .authorize(self.http.post(self.table_url("reviews")?), None)
            .header("Prefer", "return=minimal")
            .json(review)
            .send()
            .await?;
        checked(response, "review insert").await?;
        info!(wine_id = %review.wine_id, reviewer = %review.reviewer_id, "hosted: review inserted");
        Ok(())
    }

    async fn recent_reviews(&self, limit: usize) -> Result<Vec<ReviewRecord>> {
        let response = self
            .authorize(self.http.get(self.table_url("reviews")?), None)
            .query(&[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;
        Ok(checked(response, "review listing").await?.json().await?)
    }
}

#[async_trait]
impl ObjectStore for HostedBackend {
    async fn upload(&self, key: &str, image: &ImageUpload) -> Result<()> {
        let response = self
            .authorize(self.http.post(self.object_url(key)?), None)
            .header(CONTENT_TYPE, image.content_type_or_default())
            .body(image.bytes.clone())
            .send()
            .await?;
        checked(response, "image upload").await?;
        info!(bucket = %self.bucket, key, bytes = image.bytes.len(), "hosted: image uploaded");
        Ok(())
    }

    fn public_url(&self, key: &str) -> Result<String> {
        let url = self.endpoint([
            "storage",
            "v1",
            "object",
            "public",
            self.bucket.as_str(),
            key,
        ])?;
        Ok(url.to_string())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let url = self.endpoint(["storage", "v1", "object", self.bucket.as_str()])?;
        let response = self
            .authorize(self.http.delete(url), None)
            .json(&json!({ "prefixes": [key] }))
            .send()
            .await?;
        checked(response, "image removal").await?;
        info!(bucket = %self.bucket, key, "hosted: image removed");
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for HostedBackend {
    async fn current_user(&self, access_token: &str) -> Result<Option<Reviewer>> {
        let response = self
            .authorize(self.http.get(self.endpoint(["auth", "v1", "user"])?), Some(access_token))
            .send()
            .await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            debug!(status = %response.status(), "hosted: access token rejected");
            return Ok(None);
        }
        let reviewer: Reviewer = checked(response, "user lookup").await?.json().await?;
        Ok(Some(reviewer))
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let response = self
            .authorize(
                self.http.post(self.endpoint(["auth", "v1", "logout"])?),
                Some(access_token),
            )
            .send()
            .await?;
        checked(response, "sign out").await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/hosted_tests.rs"]
mod tests;
