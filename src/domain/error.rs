//! Domain error types.

/// Top-level error type for balancer.
#[derive(Debug, thiserror::Error)]
pub enum BalancerError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("http request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("http request to {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    #[error("{entity}_not_found")]
    NotFound { entity: String },

    #[error("{reason}")]
    InvalidInput { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BalancerError {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Short machine-readable code used in JSON error payloads.
    pub fn code(&self) -> String {
        match self {
            BalancerError::NotFound { .. } | BalancerError::InvalidInput { .. } => self.to_string(),
            BalancerError::Database { .. } | BalancerError::DatabaseQuery { .. } => {
                "database_error".to_string()
            }
            BalancerError::ConfigParse { .. }
            | BalancerError::ConfigMissing { .. }
            | BalancerError::ConfigInvalid { .. } => "config_error".to_string(),
            BalancerError::Http { .. } | BalancerError::HttpStatus { .. } => {
                "upstream_error".to_string()
            }
            BalancerError::Decode { .. } => "decode_error".to_string(),
            BalancerError::Io(_) => "io_error".to_string(),
        }
    }
}

impl From<rusqlite::Error> for BalancerError {
    fn from(e: rusqlite::Error) -> Self {
        BalancerError::DatabaseQuery {
            reason: e.to_string(),
        }
    }
}

impl From<r2d2::Error> for BalancerError {
    fn from(e: r2d2::Error) -> Self {
        BalancerError::Database {
            reason: e.to_string(),
        }
    }
}

impl From<&BalancerError> for std::process::ExitCode {
    fn from(err: &BalancerError) -> Self {
        let code: u8 = match err {
            BalancerError::Io(_)
            | BalancerError::Http { .. }
            | BalancerError::HttpStatus { .. }
            | BalancerError::Decode { .. } => 1,
            BalancerError::ConfigParse { .. }
            | BalancerError::ConfigMissing { .. }
            | BalancerError::ConfigInvalid { .. } => 2,
            BalancerError::Database { .. } | BalancerError::DatabaseQuery { .. } => 3,
            BalancerError::InvalidInput { .. } => 4,
            BalancerError::NotFound { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
