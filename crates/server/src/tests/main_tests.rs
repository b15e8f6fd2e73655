use std::sync::atomic::Ordering;

use super::*;
use crate::fakes::{wine, InMemoryBackend, TOKEN};
use axum::{
    body::{self, Body},
    http::{HeaderValue, Request},
};
use client_core::SubmissionOptions;
use tower::ServiceExt;

const BOUNDARY: &str = "wine-review-boundary";

fn test_app() -> (Router, ApiContext, InMemoryBackend) {
    let backend = InMemoryBackend::with_wines(vec![
        wine(42, "Barolo", 2015, "Nebbiolo"),
        wine(7, "Barbaresco", 2016, "Nebbiolo"),
    ]);
    let api = ApiContext::new(Arc::new(backend.clone()), SubmissionOptions::default());
    let app = build_router(Arc::new(AppState {
        api: api.clone(),
        recent_reviews_limit: 20,
    }));
    (app, api, backend)
}

struct ImagePart<'a> {
    filename: &'a str,
    content_type: &'a str,
    bytes: &'a [u8],
}

fn multipart_body(fields: &[(&str, &str)], image: Option<ImagePart<'_>>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(image) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                image.filename, image.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(image.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn jpeg() -> Option<ImagePart<'static>> {
    Some(ImagePart {
        filename: "label.jpg",
        content_type: "image/jpeg",
        bytes: b"\xff\xd8\xff\xe0jpeg",
    })
}

fn submit_request(token: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::post("/review").header(
        "content-type",
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).expect("request")
}

fn authorized_get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .expect("request")
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn assert_redirects_home(response: &Response) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get("location"),
        Some(&HeaderValue::from_static("/"))
    );
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (app, _, _) = test_app();
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn review_routes_redirect_when_signed_out() {
    let (app, _, backend) = test_app();

    let search = Request::get("/review/wines?q=Barolo")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(search).await.expect("response");
    assert_redirects_home(&response);

    let forged = Request::get("/review/wines/42")
        .header("authorization", "Bearer forged")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(forged).await.expect("response");
    assert_redirects_home(&response);

    let submit = submit_request(None, multipart_body(&[("wine_id", "42")], jpeg()));
    let response = app.oneshot(submit).await.expect("response");
    assert_redirects_home(&response);
    assert!(backend.objects().is_empty());
}

#[tokio::test]
async fn wine_search_and_lookup_routes() {
    let (app, _, _) = test_app();

    let response = app
        .clone()
        .oneshot(authorized_get("/review/wines?q=barb"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let wines: Vec<Wine> = json_body(response).await;
    assert_eq!(wines.len(), 1);
    assert_eq!(wines[0].name, "Barbaresco");

    let response = app
        .clone()
        .oneshot(authorized_get("/review/wines?q=ba"))
        .await
        .expect("response");
    let wines: Vec<Wine> = json_body(response).await;
    assert!(wines.is_empty());

    let response = app
        .clone()
        .oneshot(authorized_get("/review/wines/42"))
        .await
        .expect("response");
    let barolo: Wine = json_body(response).await;
    assert_eq!(barolo.year, 2015);

    let response = app
        .oneshot(authorized_get("/review/wines/404"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn multipart_submit_stores_review_and_lists_it() {
    let (app, _, backend) = test_app();

    let body = multipart_body(
        &[("wine_id", "42"), ("rating", "4.5"), ("review", "Great")],
        jpeg(),
    );
    let response = app
        .clone()
        .oneshot(submit_request(Some(TOKEN), body))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let receipt: SubmissionReceipt = json_body(response).await;
    assert_eq!(receipt.wine_id, WineId(42));
    assert_eq!(backend.objects(), vec![receipt.image_key.clone()]);

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let reviews: Vec<ReviewRecord> = json_body(response).await;
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].review, "Great");
    assert_eq!(reviews[0].image_url, receipt.image_url);
}

#[tokio::test]
async fn multipart_submit_can_create_a_wine() {
    let (app, _, backend) = test_app();

    let body = multipart_body(
        &[
            ("new_wine", "on"),
            ("wine_name", "Chianti Classico"),
            ("year", "2019"),
            ("grape", "Sangiovese"),
            ("rating", "3.5"),
            ("review", "Cherry and leather"),
        ],
        jpeg(),
    );
    let response = app
        .oneshot(submit_request(Some(TOKEN), body))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let receipt: SubmissionReceipt = json_body(response).await;
    assert!(receipt.wine_created);
    assert!(backend
        .wines()
        .iter()
        .any(|w| w.id == receipt.wine_id && w.name == "Chianti Classico"));
}

#[tokio::test]
async fn invalid_forms_are_bad_requests() {
    let (app, _, backend) = test_app();

    let cases = [
        multipart_body(&[("wine_id", "42"), ("rating", "4"), ("review", "x")], None),
        multipart_body(&[("wine_id", "42"), ("rating", "4.55"), ("review", "x")], jpeg()),
        multipart_body(&[("wine_id", "forty-two"), ("rating", "4"), ("review", "x")], jpeg()),
        multipart_body(
            &[("wine_id", "42"), ("rating", "4"), ("review", "x")],
            Some(ImagePart {
                filename: "notes.txt",
                content_type: "text/plain",
                bytes: b"not an image",
            }),
        ),
    ];
    for body in cases {
        let response = app
            .clone()
            .oneshot(submit_request(Some(TOKEN), body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ApiError = json_body(response).await;
        assert_eq!(error.code, ErrorCode::Validation);
    }
    assert!(backend.objects().is_empty());
    assert!(backend.reviews().is_empty());
}

#[tokio::test]
async fn concurrent_submit_is_rejected_with_429() {
    let (app, api, backend) = test_app();
    let _held = api
        .gate
        .try_acquire(backend.reviewer().id)
        .expect("permit");

    let body = multipart_body(
        &[("wine_id", "42"), ("rating", "4.5"), ("review", "Great")],
        jpeg(),
    );
    let response = app
        .oneshot(submit_request(Some(TOKEN), body))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::RateLimited);
}

#[tokio::test]
async fn upload_failure_is_a_bad_gateway() {
    let (app, _, backend) = test_app();
    backend.fail_uploads.store(true, Ordering::SeqCst);

    let body = multipart_body(
        &[("wine_id", "42"), ("rating", "4.5"), ("review", "Great")],
        jpeg(),
    );
    let response = app
        .oneshot(submit_request(Some(TOKEN), body))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::Upstream);
    assert!(backend.reviews().is_empty());
}

#[tokio::test]
async fn logout_signs_out_and_redirects_home() {
    let (app, _, backend) = test_app();

    let request = Request::post("/logout")
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");

    assert_redirects_home(&response);
    assert_eq!(backend.signed_out(), vec![TOKEN.to_string()]);
}

#[test]
fn bearer_token_requires_the_bearer_scheme() {
    let mut headers = HeaderMap::new();
    assert_eq!(bearer_token(&headers), None);

    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
    assert_eq!(bearer_token(&headers), None);

    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc "));
    assert_eq!(bearer_token(&headers), Some("abc"));
}
