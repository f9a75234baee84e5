//! Credential provider definitions.

/// Where a provider's real OAuth secrets live in the sandbox environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    /// Key of the provider's entry in the credential file.
    pub name: String,
    /// Variable holding the real refresh token.
    pub refresh_token_var: String,
    /// Variable holding the optional account id.
    pub account_id_var: String,
}

impl ProviderSpec {
    /// Spec using the `<NAME>_OAUTH_REFRESH_TOKEN` / `<NAME>_OAUTH_ACCOUNT_ID` convention.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let prefix: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();

        Self {
            refresh_token_var: format!("{}_OAUTH_REFRESH_TOKEN", prefix),
            account_id_var: format!("{}_OAUTH_ACCOUNT_ID", prefix),
            name,
        }
    }

    /// The OpenAI provider.
    pub fn openai() -> Self {
        Self::new("openai")
    }

    /// Providers materialized when none are requested explicitly.
    pub fn builtin() -> Vec<Self> {
        vec![Self::openai()]
    }

    /// Variables carrying secrets for this provider.
    pub fn secret_vars(&self) -> [&str; 1] {
        [self.refresh_token_var.as_str()]
    }

    /// Variables read once at startup and never passed on to children.
    pub fn consumed_vars(&self) -> [&str; 2] {
        [self.refresh_token_var.as_str(), self.account_id_var.as_str()]
    }
}
