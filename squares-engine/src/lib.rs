//! GridPot Squares Engine
//!
//! Lifecycle engine for 10×10 squares games: purchase, random number
//! assignment, period-by-period settlement against live scores, and
//! full-refund cancellation. Every balance effect delegates to
//! [`ledger_core::Ledger`]; this crate never touches a balance directly.
//!
//! # Invariants
//!
//! - No two purchases in a game share a cell (atomic insert-if-vacant)
//! - At most one payout per `(game, period)` (atomic insert-if-absent)
//! - A game's pot always equals the sum of its purchase amounts
//! - Number assignment happens exactly once per game

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod engine;
pub mod error;
pub mod resolver;
pub mod store;
pub mod types;

// Re-exports
pub use config::SquaresConfig;
pub use engine::{PurchaseReceipt, SquaresEngine};
pub use error::{Error, Result};
pub use resolver::{resolve_winner, winning_cell};
pub use store::{GameStore, MemoryGameStore};
pub use types::{
    GameInvitation, GameStatus, InvitationStatus, NewGame, PayoutStructure, Period, Square,
    SquaresGame, SquaresPayout, SquaresPurchase, GRID_SIZE, TOTAL_SQUARES,
};
