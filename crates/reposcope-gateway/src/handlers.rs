use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::server::AppState;

const QUERY_REQUIRED: &str = "Query text is required";

#[derive(serde::Deserialize)]
pub(crate) struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(serde::Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(serde::Serialize)]
struct SearchResponse {
    results: Vec<(String, f32)>,
}

#[derive(serde::Serialize)]
struct AskResponse {
    response: String,
}

#[derive(serde::Serialize)]
struct IndexResponse {
    message: &'static str,
    files_indexed: usize,
    files_failed: usize,
    chunks_indexed: usize,
}

fn error(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Extract a non-empty `query` field, or the 400 response to send instead.
fn require_query(payload: Result<Json<QueryRequest>, JsonRejection>) -> Result<String, Response> {
    match payload {
        Ok(Json(QueryRequest { query: Some(q) })) if !q.is_empty() => Ok(q),
        Ok(_) => Err(error(StatusCode::BAD_REQUEST, QUERY_REQUIRED)),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Err(rejection.into_response())
        }
        Err(rejection) => {
            tracing::debug!("rejected query body: {rejection}");
            Err(error(StatusCode::BAD_REQUEST, QUERY_REQUIRED))
        }
    }
}

pub(crate) async fn root_handler() -> impl IntoResponse {
    Json(MessageResponse {
        message: "Repository Analyzer API is running",
    })
}

pub(crate) async fn search_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let query = match require_query(payload) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    match state.service.search(query).await {
        Ok(hits) => Json(SearchResponse {
            results: hits.into_iter().map(|h| (h.text, h.distance)).collect(),
        })
        .into_response(),
        Err(e) => {
            tracing::error!("search failed: {e:#}");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Search failed: {e:#}"),
            )
        }
    }
}

pub(crate) async fn ask_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let query = match require_query(payload) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    match state.service.ask(query).await {
        Ok(response) => Json(AskResponse { response }).into_response(),
        Err(e) => {
            tracing::error!("assistant query failed: {e:#}");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Assistant query failed: {e:#}"),
            )
        }
    }
}

pub(crate) async fn index_handler(State(state): State<AppState>) -> Response {
    match state.service.index_repository().await {
        Ok(summary) => Json(IndexResponse {
            message: "Repository successfully indexed",
            files_indexed: summary.files_indexed,
            files_failed: summary.files_failed,
            chunks_indexed: summary.chunks_indexed,
        })
        .into_response(),
        Err(e) => {
            tracing::error!("indexing failed: {e:#}");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Indexing failed: {e:#}"),
            )
        }
    }
}
