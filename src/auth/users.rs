use std::collections::HashMap;

use anyhow::{Context, bail};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

use super::password;
use crate::error::ApiError;

/// Publishers allowed to upload, keyed by user name.
///
/// Parsed from `user:hash` pairs separated by whitespace or `;`. PHC hash
/// strings contain commas, so a comma is not a separator. An empty set
/// leaves uploads open.
#[derive(Debug, Clone, Default)]
pub struct AuthUsers {
    hashes: HashMap<String, String>,
}

impl AuthUsers {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let mut hashes = HashMap::new();
        for pair in s
            .split(|c: char| c == ';' || c.is_whitespace())
            .filter(|p| !p.is_empty())
        {
            let Some((user, hash)) = pair.split_once(':') else {
                bail!("invalid user/hash pair: {pair}");
            };
            if user.is_empty() {
                bail!("empty user name in pair: {pair}");
            }
            password::check_hash(hash).with_context(|| format!("hash for user {user}"))?;
            hashes.insert(user.to_owned(), hash.to_owned());
        }
        if hashes.is_empty() {
            bail!("auth users list is empty");
        }
        Ok(Self { hashes })
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Authenticate an upload request. Returns the user name on success.
    ///
    /// Always succeeds (with `None`) when no users are configured.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Option<String>, ApiError> {
        if self.is_empty() {
            return Ok(None);
        }
        let (user, password_raw) = extract_basic_credentials(headers)?;
        let hash = self.hashes.get(&user).ok_or(ApiError::Unauthorized)?;
        let valid = password::verify_password(&password_raw, hash).map_err(ApiError::Internal)?;
        if !valid {
            tracing::warn!(%user, "upload credentials rejected");
            return Err(ApiError::Unauthorized);
        }
        Ok(Some(user))
    }
}

/// Extract username and password from an HTTP Basic `Authorization` header.
fn extract_basic_credentials(headers: &HeaderMap) -> Result<(String, String), ApiError> {
    let auth_value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let encoded = auth_value
        .strip_prefix("Basic ")
        .ok_or(ApiError::Unauthorized)?;

    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
        .map_err(|_| ApiError::Unauthorized)?;

    let decoded_str = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized)?;

    let (username, password_raw) = decoded_str.split_once(':').ok_or(ApiError::Unauthorized)?;

    if username.is_empty() {
        return Err(ApiError::Unauthorized);
    }

    Ok((username.to_owned(), password_raw.to_owned()))
}
