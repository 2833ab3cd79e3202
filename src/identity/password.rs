//! Local credential storage: password hashing (argon2) and static API
//! tokens, the non-OAuth half of the IdentityResolver (spec.md §4.1).

use crate::authz::Principal;
use crate::error::AuthError;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct LocalUser {
    password_hash: String,
    groups: Vec<String>,
}

/// In-memory local credential store. Backed by config-loaded entries; a
/// durable/administered variant is an open concern not carried here since
/// the spec's scope is the client-fleet core, not account management.
#[derive(Default)]
pub struct LocalCredentialStore {
    users: HashMap<String, LocalUser>,
    tokens: HashMap<String, Principal>,
}

impl LocalCredentialStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub async fn add_user(&mut self, username: &str, password: &str, groups: Vec<String>) -> Result<(), AuthError> {
        let hash = hash_password(password.to_string()).await?;
        self.users.insert(
            username.to_string(),
            LocalUser { password_hash: hash, groups },
        );
        Ok(())
    }

    pub fn add_token(&mut self, token: &str, username: &str, groups: Vec<String>) {
        self.tokens.insert(
            token.to_string(),
            Principal { username: username.to_string(), groups },
        );
    }

    pub async fn verify_password(&self, username: &str, password: &str) -> Result<Principal, AuthError> {
        let user = self.users.get(username).ok_or(AuthError::InvalidCredentials)?.clone();
        verify_password(password.to_string(), user.password_hash).await?;
        Ok(Principal {
            username: username.to_string(),
            groups: user.groups,
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidCredentials)
    }
}

/// Verify a password against a stored Argon2 hash (non-blocking).
async fn verify_password(password: String, hash: String) -> Result<(), AuthError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)
            .map_err(|_| AuthError::ConfigInvalid("corrupt stored password hash".into()))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)
    })
    .await
    .expect("spawn_blocking failed")
}

/// Hash a password using default Argon2 settings (non-blocking).
async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::ConfigInvalid(e.to_string()))
    })
    .await
    .expect("spawn_blocking failed")
}
