#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing {0}")]
    MissingCredentials(&'static str),
    #[error("an authorization flow is already in progress")]
    AlreadyPending,
    #[error("interactive authorization is not supported")]
    InteractiveUnsupported,
    #[error("callback listener failed: {0}")]
    Listener(String),
    #[error("failed to open browser: {0}")]
    Browser(String),
    #[error("authorization failed: {0}")]
    Denied(String),
    #[error("no authorization code received")]
    MissingCode,
    #[error("authorization state mismatch")]
    StateMismatch,
    #[error("authorization timed out")]
    TimedOut,
    #[error("token request failed: {0}")]
    TokenRequest(String),
    #[error("token storage failed: {0}")]
    Storage(String),
}

/// Failure of an authenticated call against one of the external APIs.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("unauthorized after token refresh")]
    Unauthorized,
    #[error("access forbidden")]
    Forbidden,
    #[error("rate limited")]
    RateLimited { retry_after: Option<u64> },
    #[error("request failed with status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("{0}")]
    Auth(AuthError),
    #[error("{0} cannot be completed through the API")]
    NotCompletable(String),
}

impl ApiError {
    /// True when the page should stop polling and ask the user to sign in.
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthenticated
                | ApiError::Unauthorized
                | ApiError::Auth(AuthError::MissingCredentials(_))
        )
    }

    pub fn user_message(&self, service: &str) -> String {
        match self {
            ApiError::Forbidden => {
                format!("{service} denied access - check your subscription")
            }
            ApiError::RateLimited {
                retry_after: Some(seconds),
            } => format!("{service} rate limit reached - retry in {seconds}s"),
            ApiError::RateLimited { retry_after: None } => {
                format!("{service} rate limit reached - please wait")
            }
            ApiError::Unauthenticated | ApiError::Unauthorized => {
                format!("{service} authentication required")
            }
            other => other.to_string(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}
