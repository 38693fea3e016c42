//! HTTP routes: health, catalog lookups and the data download

use crate::config::Config;
use crate::error::{AppError, INTERNAL_ERROR_MESSAGE};
use crate::ingestion::catalog::{fetch_lookup, Lookup};
use crate::ingestion::download::{self, DownloadForm, DownloadOutput};
use crate::ingestion::fetch::{FetchError, UpstreamClient};
use crate::ingestion::FetchSettings;
use axum::{
    extract::{FromRequest, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub client: UpstreamClient,
    pub settings: FetchSettings,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Ok(AppState {
            client: UpstreamClient::new(
                &config.base_url,
                config.request_timeout,
                config.lookup_timeout,
            )?,
            settings: config.fetch_settings(),
        })
    }
}

#[derive(Serialize, Deserialize)]
pub struct ApiResponse {
    pub message: String,
    pub status: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/api/health", get(health_check))
        .route("/get-datasets", post(get_datasets))
        .route("/get-states", post(get_states))
        .route("/get-districts", post(get_districts))
        .route("/get-rivers", post(get_rivers))
        .route("/get-tributaries", post(get_tributaries))
        .route("/get-agencies", post(get_agencies))
        .route("/download-data", post(download_data))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Request body decoded from JSON or a urlencoded form, by content type
pub struct FormOrJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for FormOrJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(FormOrJson(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(FormOrJson(value))
        }
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": INTERNAL_ERROR_MESSAGE })),
    )
        .into_response()
}

async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        message: "Water data API is running!".to_string(),
        status: "ok".to_string(),
    })
}

/// Treat null and blank strings as absent
fn required(value: Option<Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        other => other,
    }
}

fn require(value: Option<Value>, message: &str) -> Result<Value, AppError> {
    required(value).ok_or_else(|| AppError::BadRequest(message.to_string()))
}

async fn lookup(state: &AppState, lookup: Lookup) -> Result<Json<Vec<Value>>, AppError> {
    let items = fetch_lookup(&state.client, &lookup).await?;
    Ok(Json(items))
}

async fn get_datasets(State(state): State<AppState>) -> Result<Json<Vec<Value>>, AppError> {
    lookup(&state, Lookup::Datasets).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRequest {
    dataset_code: Option<Value>,
}

async fn get_states(
    State(state): State<AppState>,
    FormOrJson(req): FormOrJson<DatasetRequest>,
) -> Result<Json<Vec<Value>>, AppError> {
    let dataset_code = require(req.dataset_code, "datasetCode is required")?;
    lookup(&state, Lookup::States { dataset_code }).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictsRequest {
    state_code: Option<Value>,
    dataset_code: Option<Value>,
}

async fn get_districts(
    State(state): State<AppState>,
    FormOrJson(req): FormOrJson<DistrictsRequest>,
) -> Result<Json<Vec<Value>>, AppError> {
    let (state_code, dataset_code) = match (required(req.state_code), required(req.dataset_code)) {
        (Some(s), Some(d)) => (s, d),
        _ => {
            return Err(AppError::BadRequest(
                "stateCode and datasetCode are required".to_string(),
            ))
        }
    };
    lookup(
        &state,
        Lookup::Districts {
            state_code,
            dataset_code,
        },
    )
    .await
}

async fn get_rivers(
    State(state): State<AppState>,
    FormOrJson(req): FormOrJson<DatasetRequest>,
) -> Result<Json<Vec<Value>>, AppError> {
    let dataset_code = require(req.dataset_code, "datasetCode is required")?;
    lookup(&state, Lookup::Rivers { dataset_code }).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TributariesRequest {
    basin_code: Option<Value>,
    dataset_code: Option<Value>,
}

async fn get_tributaries(
    State(state): State<AppState>,
    FormOrJson(req): FormOrJson<TributariesRequest>,
) -> Result<Json<Vec<Value>>, AppError> {
    let (basin_code, dataset_code) = match (required(req.basin_code), required(req.dataset_code)) {
        (Some(b), Some(d)) => (b, d),
        _ => {
            return Err(AppError::BadRequest(
                "basinCode and datasetCode are required".to_string(),
            ))
        }
    };
    lookup(
        &state,
        Lookup::Tributaries {
            basin_code,
            dataset_code,
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
pub struct AgenciesRequest {
    district_id: Option<Value>,
    datasetcode: Option<Value>,
    tributaryid: Option<Value>,
}

async fn get_agencies(
    State(state): State<AppState>,
    FormOrJson(req): FormOrJson<AgenciesRequest>,
) -> Result<Json<Vec<Value>>, AppError> {
    let query = Lookup::Agencies {
        district_id: required(req.district_id).unwrap_or(json!(0)),
        dataset_code: required(req.datasetcode).unwrap_or(json!("")),
        tributary_id: required(req.tributaryid).unwrap_or(json!(0)),
    };
    lookup(&state, query).await
}

async fn download_data(
    State(state): State<AppState>,
    FormOrJson(form): FormOrJson<DownloadForm>,
) -> Result<Json<DownloadOutput>, AppError> {
    let plan = form.into_plan()?;
    let output = download::run(&state.client, &state.settings, &plan).await?;
    Ok(Json(output))
}
