//! Redaction of secret values from log and error text.

use crate::environment::Environment;

/// Replaces known secret values with `[REDACTED:<name>]`.
#[derive(Default)]
pub struct Redactor {
    /// (name, value) pairs, longest value first so overlapping secrets
    /// are replaced whole.
    secrets: Vec<(String, String)>,
}

impl Redactor {
    /// Creates an empty redactor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every listed variable that is set in `env`.
    pub fn from_env<'a>(env: &Environment, vars: impl IntoIterator<Item = &'a str>) -> Self {
        let mut redactor = Self::new();
        for var in vars {
            if let Some(value) = env.get(var) {
                redactor.register(var, value);
            }
        }
        redactor
    }

    /// Adds a secret. Empty values are ignored.
    pub fn register(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() || self.secrets.iter().any(|(_, v)| *v == value) {
            return;
        }
        self.secrets.push((name.into(), value));
        self.secrets.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    }

    /// Redacts all known secret values from `text`.
    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (name, value) in &self.secrets {
            result = result.replace(value, &format!("[REDACTED:{}]", name));
        }
        result
    }

    /// Returns true if `text` contains any known secret.
    pub fn leaks(&self, text: &str) -> bool {
        self.secrets.iter().any(|(_, value)| text.contains(value))
    }

    /// Returns the number of registered secrets.
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Returns true if no secrets are registered.
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

// Never print registered values.
impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("names", &self.secrets.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}
