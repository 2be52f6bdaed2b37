use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use profile_photo_studio::config::{AppConfig, ProviderConfig, ThrottleConfig};
use profile_photo_studio::providers::{
    Candidate, GenerationOptions, ImageProvider, Part, ProviderError, ProviderResponse,
    TextCompletionProvider,
};
use profile_photo_studio::retry::RetryPolicy;
use profile_photo_studio::{AppState, build_router};

// PNG signature only; enough for sniffing and storage.
const PNG_PAYLOAD: &str = "iVBORw0KGgo=";
const PHOTO: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRgABAQ==";

/// Returns the same small PNG for every call after the first `fail_first`.
#[derive(Default)]
struct FakeImageProvider {
    calls: AtomicUsize,
    fail_first: usize,
}

#[async_trait]
impl ImageProvider for FakeImageProvider {
    async fn generate(
        &self,
        _prompt: &str,
        reference_images: &[String],
        _options: &GenerationOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!reference_images.is_empty());
        if call < self.fail_first {
            return Err(ProviderError::Api("quota exceeded".into()));
        }
        Ok(ProviderResponse {
            candidates: vec![Candidate {
                finish_reason: Some("STOP".into()),
                parts: vec![Part::InlineImage {
                    mime_type: "image/png".into(),
                    data: PNG_PAYLOAD.into(),
                }],
            }],
            message: None,
        })
    }
}

struct FakeTextProvider;

#[async_trait]
impl TextCompletionProvider for FakeTextProvider {
    async fn complete(&self, _system: &str, user: &str) -> Result<Option<String>, ProviderError> {
        assert!(user.contains("Barcelona"));
        Ok(Some("  Speaking on a conference stage in Barcelona,\n warm spotlight.  ".into()))
    }
}

struct TestServer {
    base: String,
    http: reqwest::Client,
    images: Arc<FakeImageProvider>,
    _dir: TempDir,
}

fn test_config(dir: &TempDir, addr: SocketAddr) -> AppConfig {
    let provider = ProviderConfig {
        api_key: None,
        base_url: "http://127.0.0.1:9".into(),
        model: "test".into(),
    };
    AppConfig {
        port: addr.port(),
        gemini: provider.clone(),
        openai: provider,
        jwt_secret: Some("test-secret".into()),
        storage_dir: dir.path().to_path_buf(),
        public_base_url: format!("http://{addr}"),
        bucket: "photos".into(),
        allowed_origins: Vec::new(),
        retry: RetryPolicy::immediate(),
        throttle: ThrottleConfig {
            inter_image_delay: Duration::ZERO,
            ..ThrottleConfig::default()
        },
        http_timeout: Duration::from_secs(5),
        enable_debug_routes: true,
    }
}

async fn spawn_server() -> TestServer {
    spawn_server_with(FakeImageProvider::default()).await
}

async fn spawn_server_with(provider: FakeImageProvider) -> TestServer {
    let dir = tempfile::tempdir().expect("tempdir");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let images = Arc::new(provider);
    let state = AppState::with_providers(
        test_config(&dir, addr),
        images.clone(),
        Arc::new(FakeTextProvider),
    )
    .unwrap();
    let router = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    TestServer {
        base: format!("http://{addr}"),
        http: reqwest::Client::new(),
        images,
        _dir: dir,
    }
}

impl TestServer {
    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .http
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }

    async fn post_as(&self, token: &str, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .http
            .post(format!("{}{path}", self.base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self.http.get(format!("{}{path}", self.base)).send().await.unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (u16, Value) {
        let response = self
            .http
            .delete(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }
}

fn urls(body: &Value) -> Vec<String> {
    body["imageUrls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|url| url.as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn style_generation_returns_hosted_urls() {
    let server = spawn_server().await;
    let (status, body) = server
        .post(
            "/generate",
            json!({
                "email": "jane@example.com",
                "style": "professional_indoor",
                "photos": [PHOTO],
                "numberOfImages": 2
            }),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["style"], "professional_indoor");
    let urls = urls(&body);
    assert_eq!(urls.len(), 2);
    assert!(urls.iter().all(|url| url.starts_with("http://")));
    assert_eq!(server.images.calls.load(Ordering::SeqCst), 2);

    let stored = server.http.get(&urls[0]).send().await.unwrap();
    assert_eq!(stored.status().as_u16(), 200);

    let (_, gallery) = server.get("/gallery/jane@example.com").await;
    assert_eq!(gallery["images"].as_array().unwrap().len(), 2);
    assert_eq!(gallery["omittedCount"], 0);
}

#[tokio::test]
async fn auto_generation_returns_both_prompts() {
    let server = spawn_server().await;
    let (status, body) = server
        .post(
            "/generate-auto",
            json!({
                "email": "sam@example.com",
                "postText": "Thrilled to have spoken at the Barcelona tech summit!",
                "photos": [PHOTO]
            }),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["success"], true);
    assert!(body["prompt"].as_str().unwrap().contains("Barcelona"));
    assert!(!body["optimizedPrompt"].as_str().unwrap().is_empty());
    assert_eq!(urls(&body).len(), 2);
}

#[tokio::test]
async fn wrong_password_is_a_business_failure() {
    let server = spawn_server().await;
    let (status, body) = server
        .post(
            "/signup",
            json!({"email": "lee@example.com", "nom": "Lee", "prenom": "Ada", "password": "correct-horse"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    let (status, body) = server
        .post("/login", json!({"email": "lee@example.com", "password": "wrong-pass"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], false);
    assert!(body.get("token").is_none());

    let (_, body) = server
        .post("/login", json!({"email": "LEE@example.com", "password": "correct-horse"}))
        .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["token"].as_str().unwrap().split('.').count(), 3);
}

#[tokio::test]
async fn deleting_an_account_empties_the_gallery() {
    let server = spawn_server().await;
    server
        .post(
            "/signup",
            json!({"email": "kim@example.com", "password": "secret-pw"}),
        )
        .await;
    let (status, generated) = server
        .post(
            "/generate",
            json!({"email": "kim@example.com", "style": "studio", "photos": [PHOTO]}),
        )
        .await;
    assert_eq!(status, 200);
    let image_url = urls(&generated).remove(0);
    let (_, body) = server
        .post(
            "/selection",
            json!({"email": "kim@example.com", "imageUrl": "https://cdn.example.com/a.png", "flowType": "style"}),
        )
        .await;
    assert_eq!(body["success"], true);

    let (status, body) = server.delete("/delete/kim@example.com").await;
    assert_eq!(status, 200);
    assert_eq!(body["deletedImages"], 1);
    assert_eq!(body["deletedSelections"], 1);

    let (_, gallery) = server.get("/gallery/kim@example.com").await;
    assert!(gallery["images"].as_array().unwrap().is_empty());
    let stored = server.http.get(&image_url).send().await.unwrap();
    assert_eq!(stored.status().as_u16(), 404);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let server = spawn_server().await;
    let (status, body) = server
        .post("/generate", json!({"style": "studio", "photos": []}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);

    let (status, _) = server.post("/selection", json!({"email": "a@x.io"})).await;
    assert_eq!(status, 400);

    let (status, body) = server.delete("/image/does-not-exist").await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
    assert_eq!(server.images.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn debug_route_dumps_raw_documents() {
    let server = spawn_server().await;
    server
        .post(
            "/generate",
            json!({"email": "raw@example.com", "style": "outdoor", "photos": [PHOTO]}),
        )
        .await;
    let (status, body) = server.get("/debug/firestore/raw@example.com").await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 1);
    assert_eq!(body["documents"][0]["data"]["owner"], "raw@example.com");
}

#[tokio::test]
async fn auto_generation_falls_back_to_a_single_image() {
    // both attempts of the first parallel job fail, which sinks the batch
    let server = spawn_server_with(FakeImageProvider {
        fail_first: 2,
        ..FakeImageProvider::default()
    })
    .await;
    let (status, body) = server
        .post(
            "/generate-auto",
            json!({
                "email": "sam@example.com",
                "postText": "Back from the Barcelona summit.",
                "photos": [PHOTO]
            }),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(urls(&body).len(), 1);
    assert_eq!(server.images.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn deleting_an_image_removes_record_and_object() {
    let server = spawn_server().await;
    let (_, generated) = server
        .post(
            "/generate",
            json!({"email": "ana@example.com", "style": "business_formal", "photos": [PHOTO]}),
        )
        .await;
    let image_url = urls(&generated).remove(0);
    let (_, gallery) = server.get("/gallery/ana@example.com").await;
    let id = gallery["images"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = server.delete(&format!("/image/{id}")).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    let (_, gallery) = server.get("/gallery/ana@example.com").await;
    assert!(gallery["images"].as_array().unwrap().is_empty());
    let stored = server.http.get(&image_url).send().await.unwrap();
    assert_eq!(stored.status().as_u16(), 404);

    let (status, _) = server.delete(&format!("/image/{id}")).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn more_than_ten_photos_are_rejected() {
    let server = spawn_server().await;
    let photos: Vec<&str> = vec![PHOTO; 11];
    let (status, body) = server
        .post(
            "/generate",
            json!({"email": "a@x.io", "style": "studio", "photos": photos}),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert_eq!(server.images.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_non_base64_photo_is_a_validation_error() {
    let server = spawn_server().await;
    let (status, body) = server
        .post(
            "/generate",
            json!({"email": "a@x.io", "style": "studio", "photos": ["€".repeat(100_000)]}),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert_eq!(server.images.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_signups_create_one_account() {
    let server = spawn_server().await;
    for round in 0..5 {
        let email = format!("race{round}@example.com");
        let (first, second) = tokio::join!(
            server.post("/signup", json!({"email": email, "password": "password-one"})),
            server.post("/signup", json!({"email": email, "password": "password-two"})),
        );
        let winners: Vec<&str> = [(&first.1, "password-one"), (&second.1, "password-two")]
            .into_iter()
            .filter(|(body, _)| body["success"] == true)
            .map(|(_, password)| password)
            .collect();
        assert_eq!(winners.len(), 1, "{first:?} {second:?}");

        let (_, login) = server
            .post("/login", json!({"email": email, "password": winners[0]}))
            .await;
        assert_eq!(login["success"], true);
    }
}

#[tokio::test]
async fn bearer_token_names_the_owner() {
    let server = spawn_server().await;
    server
        .post("/signup", json!({"email": "tok@example.com", "password": "secret-pw"}))
        .await;
    let (_, login) = server
        .post("/login", json!({"email": "tok@example.com", "password": "secret-pw"}))
        .await;
    let token = login["token"].as_str().unwrap().to_string();

    let (status, body) = server
        .post_as(&token, "/generate", json!({"style": "studio", "photos": [PHOTO]}))
        .await;
    assert_eq!(status, 200, "{body}");
    let (_, gallery) = server.get("/gallery/tok@example.com").await;
    assert_eq!(gallery["images"].as_array().unwrap().len(), 1);

    let (status, body) = server
        .post_as("not.a.token", "/generate", json!({"style": "studio", "photos": [PHOTO]}))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["success"], false);
}
