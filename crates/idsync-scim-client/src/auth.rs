//! Bearer-token authentication for the target APIs.

use reqwest::RequestBuilder;

/// A ready-to-use bearer token.
///
/// Acquiring the token is the caller's concern. The [`Debug`] impl redacts the
/// secret so it never ends up in log output.
#[derive(Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Whether the token is empty (after trimming).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// The raw secret, for handing to another client.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Apply authentication to a request builder.
    #[must_use]
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.0)
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BearerToken").field(&"[REDACTED]").finish()
    }
}
