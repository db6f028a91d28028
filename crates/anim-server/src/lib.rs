use std::path::PathBuf;
use std::sync::Arc;

use anim_ai::{ConfigGenerator, EXAMPLE_PROMPTS, EditError, GenerationError};
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use http::{HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Exact browser origin allowed by CORS; `None` allows any origin.
    pub allowed_origin: Option<String>,
    /// Directory served for requests outside the API routes.
    pub static_dir: Option<PathBuf>,
}

#[derive(Clone)]
struct AppState {
    generator: Arc<ConfigGenerator>,
}

pub fn app(generator: Arc<ConfigGenerator>, config: ServerConfig) -> Router {
    let state = AppState { generator };
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/generate-animation", post(generate_animation))
        .route("/edit-animation", post(edit_animation))
        .with_state(state)
        .layer(cors_layer(&config));
    if let Some(static_dir) = config.static_dir {
        router = router.fallback_service(ServeDir::new(static_dir));
    }
    router
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    match config
        .allowed_origin
        .as_deref()
        .map(|origin| origin.parse::<HeaderValue>())
    {
        Some(Ok(origin)) => layer.allow_origin(AllowOrigin::exact(origin)),
        Some(Err(_)) => {
            tracing::warn!("allowed origin is not a valid header value, allowing any origin");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditRequest {
    #[serde(default)]
    current_config: Option<Value>,
    #[serde(default)]
    edit_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    config: Value,
}

#[derive(Debug, Serialize)]
struct GenerationFailureResponse {
    error: &'static str,
    message: &'static str,
    suggestions: [&'static str; 3],
    details: String,
}

#[derive(Debug, Serialize)]
struct EditResponse {
    config: Value,
    changes: String,
}

#[derive(Debug, Serialize)]
struct EditFailureResponse {
    error: &'static str,
    details: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

async fn generate_animation(State(state): State<AppState>, body: Bytes) -> Response {
    let request: GenerateRequest = match parse_json(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    let prompt = request.prompt.unwrap_or_default();
    tracing::info!(prompt = %prompt, "generating animation config");

    match state.generator.generate(&prompt).await {
        Ok(success) => {
            tracing::info!(attempts = success.attempts, "generation succeeded");
            Json(GenerateResponse {
                config: success.config,
            })
            .into_response()
        }
        Err(GenerationError::EmptyPrompt) => {
            ApiError::bad_request("Prompt is required").into_response()
        }
        Err(GenerationError::ExhaustedRetries { last_error, .. }) => {
            tracing::error!(error = %last_error, "all generation attempts failed");
            (
                StatusCode::BAD_REQUEST,
                Json(GenerationFailureResponse {
                    error: "Could not generate valid animation config",
                    message: "Your prompt might be unclear. Try being more specific.",
                    suggestions: EXAMPLE_PROMPTS,
                    details: last_error.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn edit_animation(State(state): State<AppState>, body: Bytes) -> Response {
    let request: EditRequest = match parse_json(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    let current_config = request.current_config.filter(|config| !config.is_null());
    let edit_prompt = request.edit_prompt.filter(|prompt| !prompt.is_empty());
    let (Some(current_config), Some(edit_prompt)) = (current_config, edit_prompt) else {
        return ApiError::bad_request("currentConfig and editPrompt are required").into_response();
    };
    tracing::info!(edit_prompt = %edit_prompt, "editing animation config");

    match state.generator.apply_edit(&current_config, &edit_prompt).await {
        Ok(success) => {
            tracing::info!(changes = %success.changes, "edit succeeded");
            Json(EditResponse {
                config: success.config,
                changes: success.changes,
            })
            .into_response()
        }
        Err(EditError::MissingInput) => {
            ApiError::bad_request("currentConfig and editPrompt are required").into_response()
        }
        Err(error) => {
            tracing::error!(error = %error, "edit failed");
            (
                StatusCode::BAD_REQUEST,
                Json(EditFailureResponse {
                    error: "Failed to apply edit",
                    details: error.to_string(),
                }),
            )
                .into_response()
        }
    }
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is required"));
    }

    serde_json::from_slice(body)
        .map_err(|error| ApiError::bad_request(format!("invalid JSON body: {error}")))
}
