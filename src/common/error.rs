use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("Caller is not authenticated")]
    Unauthenticated,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Passcode has already been redeemed")]
    AlreadyUsed,

    #[error("Attendance already marked today")]
    AlreadyMarked,

    #[error("Passcode has expired")]
    Expired,

    #[error("No face detected in the provided image")]
    NoFaceDetected,

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl AttendanceError {
    /// Stable machine-readable kind, sent alongside the human message in
    /// RPC responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AttendanceError::Unauthenticated => "unauthenticated",
            AttendanceError::InvalidArgument(_) => "invalid-argument",
            AttendanceError::NotFound(_) => "not-found",
            AttendanceError::AlreadyUsed => "already-used",
            AttendanceError::AlreadyMarked => "already-marked",
            AttendanceError::Expired => "expired",
            AttendanceError::NoFaceDetected => "no-face-detected",
            AttendanceError::EmbeddingService(_) => "embedding-service",
            AttendanceError::Storage(_) => "storage",
            AttendanceError::Conflict(_) => "conflict",
            AttendanceError::Io(_) => "io",
            AttendanceError::Other(_) => "internal",
        }
    }

    /// Only transaction conflicts are safe to retry; everything else may
    /// have already mutated state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttendanceError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
