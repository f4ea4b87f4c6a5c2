//! HTTP façade over the runner

use std::any::Any;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use coderun::{ENGINE_FAULT, ExecutionRequest, ExecutionResponse, Runner};
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

const SERVICE_MESSAGE: &str = "AI Code Editor - Code Execution Server";

#[derive(Clone)]
struct AppState {
    runner: Runner,
}

#[derive(Debug, Serialize)]
struct LanguageInfo<'a> {
    id: &'a str,
    name: &'a str,
    compiled: bool,
}

/// Build the router with tracing, CORS and panic recovery
pub fn router(runner: Runner) -> Router {
    let cors = runner.config().server.cors;

    let mut router = Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/languages", get(languages))
        .route("/api/execute", post(execute))
        .with_state(AppState { runner })
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http());

    if cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

async fn root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": SERVICE_MESSAGE,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "execute": "POST /api/execute",
            "health": "GET /api/health",
            "languages": "GET /api/languages",
        },
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn languages(State(state): State<AppState>) -> Json<Value> {
    let config = state.runner.config();
    let languages: Vec<LanguageInfo<'_>> = config
        .language_ids()
        .into_iter()
        .filter_map(|id| {
            let language = state.runner.resolve(id).ok()?;
            Some(LanguageInfo {
                id,
                name: &language.name,
                compiled: language.is_compiled(),
            })
        })
        .collect();

    Json(json!({ "languages": languages }))
}

async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            debug!(error = %rejection, "malformed request body");
            return bad_request(rejection.body_text());
        }
    };

    match state.runner.execute(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            debug!(error = %e, language = %request.language, "request rejected");
            bad_request(e.to_string())
        }
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(detail, "handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ExecutionResponse::failure("", ENGINE_FAULT)),
    )
        .into_response()
}
