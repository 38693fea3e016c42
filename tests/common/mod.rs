//! Local stand-in for the upstream water-resources API
#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::{Form, Query, State};
use axum::http::{Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use wris_backend::api::{router, AppState};
use wris_backend::ingestion::fetch::UpstreamClient;
use wris_backend::ingestion::FetchSettings;

/// What the mock answers for one page
#[derive(Debug, Clone)]
pub enum MockPage {
    Json(Value),
    Raw(&'static str),
    Status(u16),
    /// Drop the connection without answering
    Disconnect,
}

/// One request the mock received
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: HashMap<String, String>,
    pub payload: Value,
}

#[derive(Default)]
struct Inner {
    pages: Mutex<HashMap<String, Vec<MockPage>>>,
    calls: Mutex<Vec<Call>>,
}

#[derive(Clone, Default)]
pub struct MockUpstream {
    inner: Arc<Inner>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages served for an entity (districtName / tributaryName query value);
    /// requests past the last page get an empty list
    pub fn with_pages(self, entity: &str, pages: Vec<MockPage>) -> Self {
        self.inner
            .pages
            .lock()
            .unwrap()
            .insert(entity.to_string(), pages);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Calls against dataset endpoints only
    pub fn page_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.path.starts_with("/Dataset/"))
            .collect()
    }

    /// Serve on an ephemeral port and return the base URL
    pub async fn spawn(self) -> String {
        let app = Router::new()
            .route("/Dataset/:dataset", post(dataset_page))
            .route("/Dataset/Basin/:dataset", post(dataset_page))
            .fallback(lookup)
            .with_state(self);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }
}

async fn dataset_page(
    State(mock): State<MockUpstream>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    Form(body): Form<HashMap<String, String>>,
) -> Response {
    let entity = query
        .get("districtName")
        .or_else(|| query.get("tributaryName"))
        .cloned()
        .unwrap_or_default();
    let page: usize = body.get("page").and_then(|p| p.parse().ok()).unwrap_or(0);

    mock.inner.calls.lock().unwrap().push(Call {
        method: Method::POST,
        path: uri.path().to_string(),
        query,
        body,
        payload: Value::Null,
    });

    let served = mock
        .inner
        .pages
        .lock()
        .unwrap()
        .get(&entity)
        .and_then(|pages| pages.get(page).cloned());

    match served {
        Some(MockPage::Json(value)) => Json(value).into_response(),
        Some(MockPage::Raw(text)) => (StatusCode::OK, text).into_response(),
        Some(MockPage::Status(code)) => StatusCode::from_u16(code).unwrap().into_response(),
        // unwinding the connection task closes the socket mid-request
        Some(MockPage::Disconnect) => panic!("mock upstream dropping connection for {}", entity),
        None => Json(json!([])).into_response(),
    }
}

/// Catalog endpoints: echo the path and payload back inside `data`
async fn lookup(State(mock): State<MockUpstream>, method: Method, uri: Uri, body: Bytes) -> Response {
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    mock.inner.calls.lock().unwrap().push(Call {
        method: method.clone(),
        path: uri.path().to_string(),
        query: HashMap::new(),
        body: HashMap::new(),
        payload: payload.clone(),
    });

    if method == Method::GET {
        return (StatusCode::OK, "<html>session</html>").into_response();
    }

    Json(json!({
        "statusCode": 200,
        "data": [{ "path": uri.path(), "payload": payload }]
    }))
    .into_response()
}

pub fn settings() -> FetchSettings {
    FetchSettings {
        page_size: 2,
        max_pages: 0,
        pacing_delay: Duration::ZERO,
    }
}

pub fn client(base_url: &str) -> UpstreamClient {
    UpstreamClient::new(base_url, Duration::from_secs(5), Duration::from_secs(5)).unwrap()
}

pub fn app(base_url: &str) -> Router {
    router(AppState {
        client: client(base_url),
        settings: settings(),
    })
}

/// A base URL with nothing listening behind it
pub fn dead_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Upstream date object for the given day at noon
pub fn date(year: i64, month: i64, day: i64) -> Value {
    json!({
        "year": year, "monthValue": month, "dayOfMonth": day,
        "hour": 12, "minute": 0, "second": 0,
        "month": "JANUARY", "dayOfWeek": "MONDAY"
    })
}

pub async fn post_form(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}
