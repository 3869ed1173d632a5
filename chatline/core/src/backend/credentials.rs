//! Credential Providers
//!
//! The identity provider is an external collaborator. The chat core only
//! needs an opaque bearer token for the outgoing request and a way to ask
//! whether one exists at all; it never refreshes or validates tokens.

/// Source of the bearer credential attached to outgoing requests
pub trait CredentialProvider: Send + Sync {
    /// Current bearer token, if the user is signed in
    fn bearer_token(&self) -> Option<String>;

    /// Whether a credential can be supplied right now
    fn is_available(&self) -> bool {
        self.bearer_token().is_some()
    }
}

/// A fixed token (e.g. from the environment or a CLI flag)
#[derive(Clone)]
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    /// Wrap a token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredential")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl CredentialProvider for StaticCredential {
    fn bearer_token(&self) -> Option<String> {
        let token = self.token.trim();
        (!token.is_empty()).then(|| token.to_string())
    }
}

/// No identity provider configured
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCredential;

impl CredentialProvider for NoCredential {
    fn bearer_token(&self) -> Option<String> {
        None
    }

    fn is_available(&self) -> bool {
        false
    }
}
