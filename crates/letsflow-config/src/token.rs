//! LetsCloud API token

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};

/// Token that selects the in-memory gateway instead of the HTTP API
pub const MOCK_TOKEN: &str = "mock-token-for-testing";

const MIN_TOKEN_LEN: usize = 10;

/// API token as read from configuration
///
/// Deserialization does not validate; call [`ApiToken::validate`] (or build
/// one with [`ApiToken::new`]) before using it. `Debug` never shows the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = Self(token.into().trim().to_string());
        token.validate()?;
        Ok(token)
    }

    /// Wrap without validating, like a value read from a file
    pub(crate) fn unchecked(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.is_mock() {
            return Ok(());
        }
        if self.0.chars().count() < MIN_TOKEN_LEN {
            return Err(ConfigError::InvalidToken(format!(
                "{}文字以上である必要があります",
                MIN_TOKEN_LEN
            )));
        }
        Ok(())
    }

    /// Whether this is the sentinel that routes to the fake gateway
    pub fn is_mock(&self) -> bool {
        self.0 == MOCK_TOKEN
    }

    /// The raw token, for the HTTP header only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_mock() {
            write!(f, "ApiToken({})", MOCK_TOKEN)
        } else {
            write!(f, "ApiToken(****)")
        }
    }
}
