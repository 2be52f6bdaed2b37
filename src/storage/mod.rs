pub mod document_store;
pub mod hash;
pub mod object_store;
pub mod records;

pub use document_store::{Document, DocumentStore, JsonFileDocumentStore};
pub use hash::sha256_hex;
pub use object_store::{LocalFileStorage, ObjectStore};
pub use records::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid key '{0}'")]
    InvalidKey(String),
}

pub fn get_extension_from_mime_type(mime_type: &str) -> &str {
    match mime_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/avif" => "avif",
        _ => "bin",
    }
}

/// Turns an owner identity into a single safe path segment.
pub fn sanitize_owner(owner: &str) -> String {
    let trimmed = owner.trim();
    if trimmed.is_empty() {
        return ANONYMOUS_OWNER.to_string();
    }
    trimmed
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c.to_ascii_lowercase(),
            '@' => '_',
            _ => '-',
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}
