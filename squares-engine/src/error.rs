//! Error types for the squares engine

use crate::types::{GameStatus, Square};
use thiserror::Error;

/// Result type for squares operations
pub type Result<T> = std::result::Result<T, Error>;

/// Squares engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (bad payout structure, out-of-range cell, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Game not found
    #[error("Game not found: {0}")]
    GameNotFound(String),

    /// Purchase not found
    #[error("Purchase not found: {0}")]
    PurchaseNotFound(String),

    /// Game no longer accepts the operation
    #[error("Game is {status:?}: {reason}")]
    GameClosed {
        /// Current status
        status: GameStatus,
        /// What was attempted
        reason: String,
    },

    /// Another purchaser owns the cell
    #[error("Square ({},{}) is already taken", .0.row, .0.col)]
    SquareTaken(Square),

    /// Game status transition not permitted
    #[error("Invalid game transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status
        from: GameStatus,
        /// Requested status
        to: GameStatus,
    },

    /// Ledger operation failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence collaborator failure
    #[error("Store error: {0}")]
    Store(String),
}
