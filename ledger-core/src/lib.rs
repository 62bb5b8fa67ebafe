//! GridPot Ledger Core
//!
//! Money-movement ledger for the wagering platform: account balances, an
//! append-only transaction audit trail, and the admin settlement workflow
//! for pending deposits and withdrawals.
//!
//! # Architecture
//!
//! - **Single-sourced audit trail**: every balance change writes a
//!   [`Transaction`] with before/after snapshots
//! - **Injected ports**: persistence and notifications are traits supplied
//!   at construction; [`MemoryStore`] backs tests and embedding
//! - **Race-free balances**: the only balance mutation primitive is an
//!   atomic compare-and-swap, so concurrent debits cannot overdraw
//!
//! # Invariants
//!
//! - Completed transactions satisfy
//!   `balance_after = balance_before ± effective_amount`
//! - Transaction status moves forward only and records never delete
//! - Debits never take a balance negative

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod approval;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod store;
pub mod types;

// Re-exports
pub use approval::ApprovalWorkflow;
pub use config::LedgerConfig;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use metrics::Metrics;
pub use notify::{
    MemoryNotifier, Notification, NotificationKind, NotificationPriority, Notifier, NullNotifier,
};
pub use store::{AccountStore, MemoryStore, PaymentMethodStore, TransactionStore};
pub use types::{
    Account, Direction, NewTransaction, PaymentMethod, Role, Transaction, TransactionKind,
    TransactionStatus, UserId,
};
