//! Error types for the ledger

use crate::types::TransactionStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// One variant per failure kind so callers can distinguish "not permitted"
/// from "business rule violated" without string matching.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (non-positive amount, bad parameters)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Debit would take the balance negative
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds {
        /// Balance at the time of the check
        available: Decimal,
        /// Amount the operation needed
        required: Decimal,
    },

    /// Actor lacks the role the operation requires
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Payment method not found
    #[error("Payment method not found: {0}")]
    PaymentMethodNotFound(String),

    /// Status transition not permitted by the state machine
    #[error("Invalid transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status
        from: TransactionStatus,
        /// Requested status
        to: TransactionStatus,
    },

    /// Balance compare-and-swap exhausted its retry budget
    #[error("Concurrent balance update conflict: {0}")]
    Conflict(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence collaborator failure
    #[error("Store error: {0}")]
    Store(String),
}
