use serde::{Deserialize, Serialize};

pub const ANONYMOUS_OWNER: &str = "anonymous";

pub const USERS_COLLECTION: &str = "users";
pub const IMAGES_COLLECTION: &str = "generated_images";
pub const SELECTIONS_COLLECTION: &str = "selections";

/// Field every owned collection is partitioned by.
pub const OWNER_FIELD: &str = "owner";

/// Metadata for one persisted image. `url` points at object storage and is
/// never an inline payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredImageRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub photos_count: usize,
    /// Object key behind `url`; absent on records written by older clients.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage_key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRecord {
    pub owner: String,
    pub image_url: String,
    pub url_truncated: bool,
    pub prompt: String,
    pub flow_type: String,
    pub saved_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub email: String,
    #[serde(default)]
    pub nom: String,
    #[serde(default)]
    pub prenom: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    /// Accounts created before hashing was introduced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

/// Document id for an account. Emails compare case-insensitively.
pub fn account_id(email: &str) -> String {
    email.trim().to_lowercase()
}
