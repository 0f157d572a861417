//! Error types for Loanr
//!
//! Centralized error handling using thiserror.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{LoanStatus, Operation};

/// All error types that can occur in Loanr
#[derive(Debug, Error)]
pub enum LoanrError {
    /// Loan, borrower, employee or investor missing from storage
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: u64 },

    /// Operation attempted from the wrong loan status
    #[error("Invalid state transition: cannot {operation} loan {loan_id} while {status}")]
    InvalidStateTransition {
        loan_id: u64,
        operation: Operation,
        status: LoanStatus,
    },

    /// Malformed input (dates, amounts, empty uploads, allocation sets)
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Investment total differs from the loan principal
    #[error("Allocation mismatch: total investment ${total:.2} must equal loan amount ${principal:.2}")]
    AllocationMismatch { total: Decimal, principal: Decimal },

    /// Document write or repository error
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Notification send error
    #[error("Delivery failure: {0}")]
    DeliveryFailure(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LoanrError {
    /// Shorthand for a missing record of the given kind
    pub fn not_found(entity: impl Into<String>, id: u64) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id,
        }
    }

    /// Returns true for failures raised by the record or document store
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            LoanrError::StorageFailure(_) | LoanrError::Io(_) | LoanrError::Json(_)
        )
    }
}

/// Result type alias for Loanr operations
pub type Result<T> = std::result::Result<T, LoanrError>;
