// Error taxonomy for the ledger core
//
// NotFound and store failures are terminal for the request.
// QuotaExceeded is an expected, user-facing outcome produced from a
// PlanDecision::Deny when a guarded mutation is refused.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{message}")]
    QuotaExceeded {
        message: String,
        upgrade_required: bool,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound { .. })
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, LedgerError::QuotaExceeded { .. })
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = LedgerError::not_found("Hospital", "abc");
        assert_eq!(err.to_string(), "Hospital not found: abc");
        assert!(err.is_not_found());
        assert!(!err.is_quota_exceeded());
    }

    #[test]
    fn test_quota_message_is_display_text() {
        let err = LedgerError::QuotaExceeded {
            message: "Limit reached".to_string(),
            upgrade_required: true,
        };
        assert_eq!(err.to_string(), "Limit reached");
        assert!(err.is_quota_exceeded());
    }
}
