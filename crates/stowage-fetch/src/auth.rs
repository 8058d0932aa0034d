//! Bearer token for bundle requests.

use crate::config::TOKEN_ENV;

/// Token provider for bundle requests.
#[derive(Clone, Default)]
pub enum TokenProvider {
    /// Static token (from config or env).
    Static(String),

    /// No authentication.
    #[default]
    None,
}

impl TokenProvider {
    pub fn static_token(token: impl Into<String>) -> Self {
        Self::Static(token.into())
    }

    /// `STOWAGE_FETCH_TOKEN` if set and non-empty, else no auth.
    pub fn from_env() -> Self {
        match std::env::var(TOKEN_ENV) {
            Ok(token) if !token.is_empty() => Self::Static(token),
            _ => Self::None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Static(token) => Some(token),
            Self::None => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::None)
    }
}

// Keeps tokens out of logs.
impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Static(<redacted>)"),
            Self::None => f.write_str("None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var(TOKEN_ENV, "env-token");
        let provider = TokenProvider::from_env();
        std::env::remove_var(TOKEN_ENV);

        assert_eq!(provider.token(), Some("env-token"));
        assert!(TokenProvider::from_env().token().is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let provider = TokenProvider::static_token("hunter2");
        assert!(provider.is_authenticated());
        assert!(!format!("{:?}", provider).contains("hunter2"));
    }
}
