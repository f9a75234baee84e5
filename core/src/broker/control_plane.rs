//! Control-plane boundary used by the auth-proxy plugin.
//!
//! The sandbox never holds a provider's real secret. When a tool tries to
//! refresh a sentinel credential, the plugin builds a [`TokenRequest`] from
//! the sandbox identity and exchanges it through a [`ControlPlaneClient`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::environment::SandboxIdentity;
use crate::error::Result;

use super::credential::AuthRecord;

/// An authenticated request for a live provider token.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// Endpoint to call.
    pub url: String,
    /// Provider whose token is requested.
    pub provider: String,
    bearer: String,
}

impl TokenRequest {
    /// Builds the request for `provider` on behalf of `identity`.
    pub fn for_provider(identity: &SandboxIdentity, provider: &str) -> Self {
        Self {
            url: format!(
                "{}/sandboxes/{}/credentials/{}",
                identity.control_plane_url, identity.sandbox_id, provider
            ),
            provider: provider.to_string(),
            bearer: identity.auth_token.clone(),
        }
    }

    /// Value of the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.bearer)
    }
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("url", &self.url)
            .field("provider", &self.provider)
            .field("bearer", &"[REDACTED]")
            .finish()
    }
}

/// A live provider token handed out by the control plane.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderToken {
    pub access: String,
    /// Expiry as epoch milliseconds.
    pub expires: u64,
    #[serde(rename = "accountId", default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl fmt::Debug for ProviderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderToken")
            .field("access", &"[REDACTED]")
            .field("expires", &self.expires)
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Client for the control plane's token exchange.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Exchanges the sandbox's identity for a live provider token.
    async fn exchange(&self, request: &TokenRequest) -> Result<ProviderToken>;
}

/// Resolves `record` to a live token if it carries the sentinel.
///
/// Records holding anything other than the sentinel are not ours to refresh
/// and yield `None`.
pub async fn resolve_sentinel(
    client: &dyn ControlPlaneClient,
    identity: &SandboxIdentity,
    provider: &str,
    record: &AuthRecord,
) -> Result<Option<ProviderToken>> {
    if !record.is_sentinel() {
        return Ok(None);
    }

    let request = TokenRequest::for_provider(identity, provider);
    tracing::debug!(provider = %provider, url = %request.url, "exchanging sentinel credential");
    client.exchange(&request).await.map(Some)
}
