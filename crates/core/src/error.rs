/// Domain error taxonomy shared by the store, repositories, and HTTP layer.
///
/// Medium-specific failures are converted into these variants at the
/// `taskmaster-db` boundary so callers never see raw I/O or driver errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} with id {id} already exists")]
    DuplicateId { entity: &'static str, id: String },

    #[error("A user with email '{0}' already exists")]
    DuplicateEmail(String),

    #[error("Gave up after {attempts} conflicting write attempts")]
    TooManyConflicts { attempts: u32 },

    #[error("Storage medium unavailable: {0}")]
    MediumUnavailable(String),

    #[error("Malformed stored data in field '{field}': {reason}")]
    MalformedData { field: String, reason: String },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable kind, used as the `code` of error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::DuplicateId { .. } => "DUPLICATE_ID",
            Self::DuplicateEmail(_) => "DUPLICATE_EMAIL",
            Self::TooManyConflicts { .. } => "TOO_MANY_CONFLICTS",
            Self::MediumUnavailable(_) => "MEDIUM_UNAVAILABLE",
            Self::MalformedData { .. } => "MALFORMED_DATA",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedData {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
