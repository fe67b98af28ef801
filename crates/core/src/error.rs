use thiserror::Error;

/// Every failure the historian core can report to a caller.
///
/// Each variant maps to a stable machine code via [`CanaryError::error_type`]
/// and carries one remediation step via [`CanaryError::remediation`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanaryError {
    /// Caller input is malformed. Never retried.
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String, hint: String },

    /// The identifier does not exist upstream (or resolved to nothing).
    #[error("Tag not found: {tag}")]
    TagNotFound { tag: String, hint: String },

    /// Credential exchange failed, or the session was rejected twice.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The breaker is open; no request was sent.
    #[error("Historian circuit is open, retry in {remaining_secs}s")]
    CircuitOpen { remaining_secs: u64 },

    /// Transient failures persisted through every retry.
    #[error("Historian unavailable after {attempts} attempts: {last_error}")]
    UpstreamUnavailable { attempts: u32, last_error: String },

    /// The historian rejected the request permanently (4xx / bad status code).
    #[error("Historian rejected request ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// The local tag catalog file exists but could not be parsed.
    #[error("Catalog load failed for {path}: {reason}")]
    CatalogLoad { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl CanaryError {
    pub fn invalid_query(message: impl Into<String>, hint: impl Into<String>) -> Self {
        CanaryError::InvalidQuery {
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn tag_not_found(tag: impl Into<String>, hint: impl Into<String>) -> Self {
        CanaryError::TagNotFound {
            tag: tag.into(),
            hint: hint.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        CanaryError::Config(message.into())
    }

    /// Stable snake_case code used in the `error.type` field of responses.
    pub fn error_type(&self) -> &'static str {
        match self {
            CanaryError::InvalidQuery { .. } => "invalid_query",
            CanaryError::TagNotFound { .. } => "tag_not_found",
            CanaryError::Authentication(_) => "authentication_error",
            CanaryError::CircuitOpen { .. } => "circuit_open",
            CanaryError::UpstreamUnavailable { .. } => "upstream_unavailable",
            CanaryError::Upstream { .. } => "upstream_error",
            CanaryError::CatalogLoad { .. } => "catalog_load_error",
            CanaryError::Config(_) => "configuration_error",
            CanaryError::Internal(_) => "internal_error",
        }
    }

    /// One actionable next step for whoever reads the error.
    pub fn remediation(&self) -> String {
        match self {
            CanaryError::InvalidQuery { hint, .. } | CanaryError::TagNotFound { hint, .. } => {
                hint.clone()
            }
            CanaryError::Authentication(_) => {
                "Check CANARY_API_TOKEN and that the token is enabled for this application".to_string()
            }
            CanaryError::CircuitOpen { remaining_secs } => format!(
                "The historian is failing repeatedly; wait {}s before retrying",
                remaining_secs
            ),
            CanaryError::UpstreamUnavailable { .. } => {
                "Retry later or narrow the time range to reduce load on the historian".to_string()
            }
            CanaryError::Upstream { .. } => {
                "Verify the tag paths and parameters; this request will not succeed on retry".to_string()
            }
            CanaryError::CatalogLoad { .. } => {
                "Fix the catalog JSON file; resolution continues with remote search only".to_string()
            }
            CanaryError::Config(_) => "Correct the configuration and restart".to_string(),
            CanaryError::Internal(_) => "Retry the request; report it if it persists".to_string(),
        }
    }

    /// Transient failures are worth retrying later; permanent ones are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CanaryError::CircuitOpen { .. } | CanaryError::UpstreamUnavailable { .. }
        )
    }
}

impl From<serde_json::Error> for CanaryError {
    fn from(e: serde_json::Error) -> Self {
        CanaryError::Internal(format!("JSON error: {}", e))
    }
}
