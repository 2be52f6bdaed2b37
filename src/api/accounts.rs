use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{AppState, gallery, owner_identity};
use crate::auth::{hash_password, verify_password};
use crate::error::{AppError, AppResult};
use crate::storage::{
    IMAGES_COLLECTION, OWNER_FIELD, SELECTIONS_COLLECTION, USERS_COLLECTION, UserAccount,
    account_id,
};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: Option<String>,
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub email: String,
    pub nom: String,
    pub prenom: String,
}

impl From<&UserAccount> for PublicUser {
    fn from(account: &UserAccount) -> Self {
        Self {
            email: account.email.clone(),
            nom: account.nom.clone(),
            prenom: account.prenom.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    success: bool,
    message: String,
    user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    success: bool,
    message: String,
    token: String,
    user: PublicUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountResponse {
    success: bool,
    message: String,
    deleted_images: usize,
    deleted_selections: usize,
}

fn required(field: Option<String>, name: &str) -> AppResult<String> {
    field
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

async fn hash_off_thread(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|err| AppError::Internal(err.into()))?
        .map_err(|err| AppError::Internal(err.into()))
}

async fn verify_off_thread(password: String, stored: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|err| AppError::Internal(err.into()))
}

async fn load_account(state: &AppState, email: &str) -> AppResult<Option<UserAccount>> {
    let Some(document) = state.documents.get(USERS_COLLECTION, &account_id(email)).await? else {
        return Ok(None);
    };
    let account = serde_json::from_value(document.data)
        .map_err(|err| AppError::Internal(anyhow::anyhow!("corrupt account {email}: {err}")))?;
    Ok(Some(account))
}

async fn save_account(state: &AppState, account: &UserAccount) -> AppResult<()> {
    let data = serde_json::to_value(account).map_err(|err| AppError::Internal(err.into()))?;
    state
        .documents
        .set(USERS_COLLECTION, &account_id(&account.email), data)
        .await?;
    Ok(())
}

pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> AppResult<Json<SignupResponse>> {
    let email = required(request.email, "email")?.to_lowercase();
    if !email.contains('@') {
        return Err(AppError::Validation("email is invalid".to_string()));
    }
    let password = request.password.unwrap_or_default();
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let account = UserAccount {
        email: email.clone(),
        nom: request.nom.unwrap_or_default().trim().to_string(),
        prenom: request.prenom.unwrap_or_default().trim().to_string(),
        password_hash: Some(hash_off_thread(password).await?),
        password: None,
        created_at: Utc::now().to_rfc3339(),
    };
    let data = serde_json::to_value(&account).map_err(|err| AppError::Internal(err.into()))?;
    if !state
        .documents
        .create(USERS_COLLECTION, &account_id(&email), data)
        .await?
    {
        return Err(AppError::Auth("an account already exists for this email".to_string()));
    }
    tracing::info!(email = %email, "account created");

    Ok(Json(SignupResponse {
        success: true,
        message: "account created".to_string(),
        user: PublicUser::from(&account),
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let email = required(request.email, "email")?.to_lowercase();
    let password = required(request.password, "password")?;

    let Some(mut account) = load_account(&state, &email).await? else {
        return Err(AppError::Auth("account not found".to_string()));
    };

    let verified = match (&account.password_hash, &account.password) {
        (Some(hash), _) => verify_off_thread(password.clone(), hash.clone()).await?,
        (None, Some(legacy)) => *legacy == password,
        (None, None) => false,
    };
    if !verified {
        tracing::info!(email = %email, "login rejected");
        return Err(AppError::Auth("invalid email or password".to_string()));
    }

    if account.password_hash.is_none() {
        match hash_off_thread(password).await {
            Ok(hash) => {
                account.password_hash = Some(hash);
                account.password = None;
                if let Err(err) = save_account(&state, &account).await {
                    tracing::warn!(email = %email, error = %err, "could not upgrade legacy password");
                }
            }
            Err(err) => tracing::warn!(email = %email, error = %err, "could not hash legacy password"),
        }
    }

    Ok(Json(LoginResponse {
        success: true,
        message: "logged in".to_string(),
        token: state.tokens.issue(&email),
        user: PublicUser::from(&account),
    }))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> AppResult<Json<DeleteAccountResponse>> {
    let owner = owner_identity(Some(&email));
    let account_deleted = state
        .documents
        .delete(USERS_COLLECTION, &account_id(&owner))
        .await?;

    let mut deleted_images = 0;
    for document in state
        .documents
        .find_eq(IMAGES_COLLECTION, OWNER_FIELD, &owner)
        .await?
    {
        if state.documents.delete(IMAGES_COLLECTION, &document.id).await? {
            state
                .persister
                .discard_object(gallery::storage_key(&document.data))
                .await;
            deleted_images += 1;
        }
    }
    let mut deleted_selections = 0;
    for document in state
        .documents
        .find_eq(SELECTIONS_COLLECTION, OWNER_FIELD, &owner)
        .await?
    {
        if state.documents.delete(SELECTIONS_COLLECTION, &document.id).await? {
            deleted_selections += 1;
        }
    }

    if !account_deleted && deleted_images == 0 && deleted_selections == 0 {
        return Err(AppError::NotFound(format!("no account for {owner}")));
    }
    tracing::info!(
        email = %owner,
        account_deleted,
        deleted_images,
        deleted_selections,
        "account deleted"
    );
    Ok(Json(DeleteAccountResponse {
        success: true,
        message: "account deleted".to_string(),
        deleted_images,
        deleted_selections,
    }))
}
