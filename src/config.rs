use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::{Backoff, RetryPolicy};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image-preview";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BUCKET: &str = "profile-photos";

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// Pacing for multi-image runs.
#[derive(Clone, Debug)]
pub struct ThrottleConfig {
    pub inter_image_delay: Duration,
    pub photo_budget_kb: usize,
    pub max_photos_to_send: Option<usize>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            inter_image_delay: Duration::from_millis(3_000),
            photo_budget_kb: 150,
            max_photos_to_send: Some(4),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub gemini: ProviderConfig,
    pub openai: ProviderConfig,
    pub jwt_secret: Option<String>,
    pub storage_dir: PathBuf,
    pub public_base_url: String,
    pub bucket: String,
    pub allowed_origins: Vec<String>,
    pub retry: RetryPolicy,
    pub throttle: ThrottleConfig,
    pub http_timeout: Duration,
    pub enable_debug_routes: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = env_parse("PORT", DEFAULT_PORT);
        let public_base_url = env_string("PUBLIC_BASE_URL")
            .map(|value| normalize_base_url(&value))
            .unwrap_or_else(|| format!("http://localhost:{port}"));
        let max_photos = env_parse::<usize>("MAX_PHOTOS_TO_SEND", 4);
        Self {
            port,
            gemini: ProviderConfig {
                api_key: env_string("GEMINI_API_KEY"),
                base_url: env_string("GEMINI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
                model: env_string("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            },
            openai: ProviderConfig {
                api_key: env_string("OPENAI_API_KEY"),
                base_url: env_string("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                model: env_string("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            },
            jwt_secret: env_string("JWT_SECRET"),
            storage_dir: resolve_storage_dir(),
            public_base_url,
            bucket: env_string("STORAGE_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            allowed_origins: parse_origins(env::var("ALLOWED_ORIGINS").ok().as_deref()),
            retry: RetryPolicy {
                max_attempts: env_parse("GENERATION_MAX_ATTEMPTS", 2).max(1),
                base_delay: Duration::from_millis(env_parse("GENERATION_RETRY_DELAY_MS", 5_000)),
                backoff: Backoff::Fixed,
            },
            throttle: ThrottleConfig {
                inter_image_delay: Duration::from_millis(env_parse(
                    "GENERATION_INTER_IMAGE_DELAY_MS",
                    3_000,
                )),
                photo_budget_kb: env_parse("PHOTO_BUDGET_KB", 150),
                max_photos_to_send: if max_photos == 0 { None } else { Some(max_photos) },
            },
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 120)),
            enable_debug_routes: env_bool("ENABLE_DEBUG_ROUTES", false),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_string(name)
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env_string(name)
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn resolve_storage_dir() -> PathBuf {
    if let Some(dir) = env_string("STORAGE_DIR") {
        return PathBuf::from(dir);
    }
    let mut base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("profile-photo-studio");
    base
}

pub fn parse_origins(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

/// Accepts a bare host or a full URL and returns `scheme://host[:port]`
/// without a trailing slash.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let mut base = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    for (doubled, single) in [
        ("http://http://", "http://"),
        ("https://https://", "https://"),
        ("http://https://", "https://"),
        ("https://http://", "http://"),
    ] {
        while base.starts_with(doubled) {
            base = base.replacen(doubled, single, 1);
        }
    }
    base
}
