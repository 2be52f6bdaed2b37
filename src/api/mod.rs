//! HTTP surface.
//!
//! Every handler answers with a JSON envelope carrying `success` and
//! `message`; non-2xx statuses are reserved for malformed requests and total
//! failures.

mod accounts;
mod gallery;
mod generation;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{HeaderValue, Method, header::AUTHORIZATION, request::Parts},
    routing::{delete, get, post},
};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::auth::TokenSigner;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::gallery::GalleryReader;
use crate::generation::{ImageGeneratorClient, Orchestrator, PromptComposer};
use crate::persist::ArtifactPersister;
use crate::providers::{
    GeminiImageProvider, ImageProvider, OpenAiTextProvider, TextCompletionProvider,
};
use crate::storage::{DocumentStore, JsonFileDocumentStore, LocalFileStorage, ObjectStore};

const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Everything a handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub documents: Arc<dyn DocumentStore>,
    pub orchestrator: Orchestrator,
    pub composer: PromptComposer,
    pub persister: ArtifactPersister,
    pub gallery: GalleryReader,
    pub tokens: TokenSigner,
}

impl AppState {
    /// Production wiring: Gemini, OpenAI and the file-backed stores.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("building http client")?;
        let image_provider = Arc::new(GeminiImageProvider::new(
            http.clone(),
            &config.gemini.base_url,
            &config.gemini.model,
            config.gemini.api_key.clone(),
        ));
        let text_provider = Arc::new(OpenAiTextProvider::new(
            http,
            &config.openai.base_url,
            &config.openai.model,
            config.openai.api_key.clone(),
        ));
        Self::with_providers(config, image_provider, text_provider)
    }

    /// Same wiring with caller-supplied providers.
    pub fn with_providers(
        config: AppConfig,
        image_provider: Arc<dyn ImageProvider>,
        text_provider: Arc<dyn TextCompletionProvider>,
    ) -> anyhow::Result<Self> {
        let objects: Arc<dyn ObjectStore> = Arc::new(LocalFileStorage::new(
            objects_dir(&config),
            config.public_base_url.clone(),
            config.bucket.clone(),
        ));
        let documents: Arc<dyn DocumentStore> =
            Arc::new(JsonFileDocumentStore::new(config.storage_dir.join("documents")));

        let secret = match config.jwt_secret.clone() {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set, tokens will not survive a restart");
                uuid::Uuid::new_v4().simple().to_string()
            }
        };
        let tokens = TokenSigner::new(secret.as_bytes())
            .map_err(|err| anyhow!("invalid JWT secret: {err}"))?;

        let client = ImageGeneratorClient::new(image_provider, config.retry.clone());
        Ok(Self {
            orchestrator: Orchestrator::new(Arc::new(client)),
            composer: PromptComposer::new(text_provider),
            persister: ArtifactPersister::new(objects, documents.clone()),
            gallery: GalleryReader::new(documents.clone()),
            documents,
            tokens,
            config: Arc::new(config),
        })
    }
}

fn objects_dir(config: &AppConfig) -> PathBuf {
    config.storage_dir.join("objects")
}

#[derive(Serialize)]
struct HealthResponse {
    success: bool,
    message: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "ok",
    })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/signup", post(accounts::signup))
        .route("/login", post(accounts::login))
        .route("/delete/{email}", delete(accounts::delete_account))
        .route("/generate", post(generation::generate))
        .route("/generate-auto", post(generation::generate_auto))
        .route("/selection", post(gallery::save_selection))
        .route("/gallery/{email}", get(gallery::list_gallery))
        .route("/image/{image_id}", delete(gallery::delete_image));
    if state.config.enable_debug_routes {
        router = router.route("/debug/firestore/{email}", get(gallery::debug_dump));
    }
    router
        .nest_service("/storage", ServeDir::new(objects_dir(&state.config)))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Owner identity for requests that may come without an account.
fn owner_identity(email: Option<&str>) -> String {
    match email.map(str::trim) {
        Some(email) if !email.is_empty() => email.to_lowercase(),
        _ => crate::storage::ANONYMOUS_OWNER.to_string(),
    }
}

/// Subject of the `Authorization: Bearer` token, when one is sent. A token
/// that fails verification rejects the request; no header is fine.
#[derive(Debug, Default)]
pub struct BearerSubject(pub Option<String>);

impl BearerSubject {
    /// The token subject wins over an email named in the body.
    fn owner(&self, email: Option<&str>) -> String {
        match &self.0 {
            Some(subject) => owner_identity(Some(subject.as_str())),
            None => owner_identity(email),
        }
    }
}

impl FromRequestParts<AppState> for BearerSubject {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Self(None));
        };
        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("expected 'Bearer <token>'".to_string()))?;
        let claims = state
            .tokens
            .verify(token)
            .map_err(|err| AppError::Unauthorized(err.to_string()))?;
        Ok(Self(Some(claims.sub)))
    }
}
