pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gallery;
pub mod generation;
pub mod image_codec;
pub mod persist;
pub mod providers;
pub mod retry;
pub mod storage;

pub use api::{AppState, build_router};
pub use config::AppConfig;
