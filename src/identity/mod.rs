//! IdentityResolver (C1): resolves an authenticated request to a principal.
//!
//! `resolve` is polymorphic over method — password, static API token, or
//! OAuth-delegated — behind a single enum dispatch (spec.md §4.1). OAuth
//! itself is a pluggable capability (`OAuthCapability`), grounded on
//! `plus/capabilities/oauth/oauth.go`'s `CapabilityEx` interface but recast
//! as a compile-time trait object registry rather than a dynamically loaded
//! Go plugin, since nothing in this crate's stack loads `.so` capabilities
//! at runtime.

pub mod oauth;
pub mod password;

use crate::authz::Principal;
use crate::config::AuthConfig;
use crate::error::AuthError;
use oauth::OAuthCapability;
use std::collections::HashMap;

/// One configured way to authenticate a request (spec.md §4.1).
pub enum Credential {
    Password { username: String, password: String },
    Token { token: String },
    OAuthCode { provider: String, code: String },
}

/// Resolves credentials to a `Principal`, consulting local password/token
/// storage or a configured OAuth capability. OAuth group computation happens
/// once at sign-in and is not re-consulted per request (spec.md §4.1).
pub struct IdentityResolver {
    local: password::LocalCredentialStore,
    oauth_providers: HashMap<String, Box<dyn OAuthCapability>>,
}

impl IdentityResolver {
    pub fn new(auth: &AuthConfig, local: password::LocalCredentialStore) -> Result<Self, AuthError> {
        let mut oauth_providers: HashMap<String, Box<dyn OAuthCapability>> = HashMap::new();
        for block in &auth.oauth {
            let provider = oauth::build_provider(block)?;
            provider.validate_config()?;
            oauth_providers.insert(block.provider.clone(), provider);
        }
        Ok(Self { local, oauth_providers })
    }

    pub async fn resolve(&self, credential: Credential) -> Result<Principal, AuthError> {
        match credential {
            Credential::Password { username, password } => {
                self.local.verify_password(&username, &password).await
            }
            Credential::Token { token } => self.local.verify_token(&token),
            Credential::OAuthCode { provider, code } => {
                let capability = self
                    .oauth_providers
                    .get(&provider)
                    .ok_or_else(|| AuthError::UnknownProvider(provider.clone()))?;
                let (username, groups) = capability.exchange_code(&code).await?;
                capability.permitted_user(&username)?;
                Ok(Principal { username, groups })
            }
        }
    }
}
