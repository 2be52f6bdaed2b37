//! Password hashing and bearer tokens.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac, digest::InvalidLength};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const HASH_COST: u32 = 10;
pub const TOKEN_TTL_SECS: i64 = 3_600;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("bad token signature")]
    Signature,
    #[error("token expired")]
    Expired,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// bcrypt hash of `password` with a random salt.
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, HASH_COST)
}

/// False for a wrong password and for anything that is not a bcrypt hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

/// Issues and checks HS256 JWTs.
#[derive(Clone)]
pub struct TokenSigner {
    key: HmacSha256,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            key: HmacSha256::new_from_slice(secret)?,
            ttl: Duration::seconds(TOKEN_TTL_SECS),
        })
    }

    fn mac(&self) -> HmacSha256 {
        self.key.clone()
    }

    pub fn issue(&self, subject: &str) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());
        let signing_input = format!("{header}.{payload}");
        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{signing_input}.{signature}")
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut pieces = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (pieces.next(), pieces.next(), pieces.next(), pieces.next())
        else {
            return Err(TokenError::Malformed);
        };
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac();
        mac.update(format!("{header}.{payload}").as_bytes());
        mac.verify_slice(&signature).map_err(|_| TokenError::Signature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let stored = hash_password("hunter2").unwrap();
        assert!(stored.starts_with("$2b$10$"));
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
        assert_ne!(stored, hash_password("hunter2").unwrap());
    }

    #[test]
    fn malformed_hashes_never_verify() {
        for stored in ["", "hunter2", "sha256$10000$salt$abc", "$2b$10$short"] {
            assert!(!verify_password("hunter2", stored));
        }
    }

    #[test]
    fn token_carries_subject_for_an_hour() {
        let signer = TokenSigner::new(b"secret").unwrap();
        let claims = signer.verify(&signer.issue("jane@example.com")).unwrap();
        assert_eq!(claims.sub, "jane@example.com");
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECS);
    }

    #[test]
    fn token_rejects_other_secrets_and_expiry() {
        let token = TokenSigner::new(b"secret").unwrap().issue("a@x.io");
        assert_eq!(TokenSigner::new(b"other").unwrap().verify(&token), Err(TokenError::Signature));
        assert_eq!(TokenSigner::new(b"secret").unwrap().verify("a.b"), Err(TokenError::Malformed));

        let signer = TokenSigner::new(b"secret").unwrap();
        let expired = signer.sign(&Claims {
            sub: "a@x.io".into(),
            iat: 0,
            exp: 1,
        });
        assert_eq!(signer.verify(&expired), Err(TokenError::Expired));
    }
}
