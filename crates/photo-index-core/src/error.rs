//! Error taxonomy shared by every core operation.

use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    /// A referenced photo or face does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An embedding does not have the configured dimensionality.
    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    /// The persistence backend failed (I/O, lock timeout, constraint).
    #[error("storage error: {0}")]
    Storage(String),

    /// An external generation call exceeded its time budget.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// Invalid parameters for the requested operation.
    #[error("precondition failed: {0}")]
    Precondition(String),
}

impl IndexError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        IndexError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        IndexError::Precondition(msg.into())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        IndexError::Storage(err.to_string())
    }
}

/// Fail with [`IndexError::DimensionMismatch`] unless `got == expected`.
pub fn check_dims(what: impl Into<String>, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(IndexError::DimensionMismatch {
            what: what.into(),
            expected,
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_dims_accepts_equal() {
        assert!(check_dims("photo", 384, 384).is_ok());
    }

    #[test]
    fn check_dims_rejects_mismatch() {
        let err = check_dims("query", 384, 256).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 384,
                got: 256,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "dimension mismatch for query: expected 384, got 256"
        );
    }
}
