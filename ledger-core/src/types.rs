//! Core types for the ledger
//!
//! All monetary values use `Decimal` at two-decimal precision; floats never
//! touch money. Transactions are created once and only move forward through
//! their status machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User identifier (platform account handle)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account role, read to gate admin-only transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Regular bettor
    User,
    /// Platform administrator
    Admin,
    /// Administrator with full privileges
    SuperAdmin,
}

impl Role {
    /// Whether this role may settle pending transactions
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

/// Direction of a balance effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Increases the balance
    Credit,
    /// Decreases the balance
    Debit,
}

/// Transaction kind
///
/// The kind fixes the balance direction statically; admin adjustments carry
/// their direction in the kind itself so the classification stays total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Funds in from a payment method (admin-settled)
    Deposit,
    /// Funds out to a payment method (admin-settled)
    Withdrawal,
    /// Stake debited for a straight bet
    BetPlaced,
    /// Winnings credited for a straight bet
    BetWon,
    /// Stake returned for a voided bet
    BetRefund,
    /// Consolidated debit for a squares purchase
    SquaresPurchase,
    /// Net period winnings credited to a square owner
    SquaresPayout,
    /// Aggregated refund for a cancelled squares game
    SquaresRefund,
    /// Manual credit by an administrator
    AdminCredit,
    /// Manual debit by an administrator
    AdminDebit,
}

impl TransactionKind {
    /// Static credit/debit classification
    pub fn direction(self) -> Direction {
        match self {
            TransactionKind::Deposit
            | TransactionKind::BetWon
            | TransactionKind::BetRefund
            | TransactionKind::SquaresPayout
            | TransactionKind::SquaresRefund
            | TransactionKind::AdminCredit => Direction::Credit,
            TransactionKind::Withdrawal
            | TransactionKind::BetPlaced
            | TransactionKind::SquaresPurchase
            | TransactionKind::AdminDebit => Direction::Debit,
        }
    }
}

/// Transaction status
///
/// Transitions move forward only: `Pending` may enter `Processing` or any
/// terminal state, `Processing` may enter a terminal state. Terminal states
/// never transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Awaiting admin review
    Pending,
    /// Picked up by an admin, not yet final
    Processing,
    /// Balance effect applied (terminal)
    Completed,
    /// Rejected or failed settlement (terminal)
    Failed,
    /// Withdrawn by the user or admin before settlement (terminal)
    Cancelled,
}

impl TransactionStatus {
    /// Whether the status admits no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }

    /// Forward-only transition check
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

/// A single entry in the balance audit log
///
/// `balance_before`/`balance_after` snapshot the account around the applied
/// effect. For transactions created `Pending` they hold the prospective
/// values captured at creation and are overwritten with the live values at
/// settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Account this transaction belongs to
    pub user_id: UserId,

    /// Kind (fixes credit/debit direction)
    pub kind: TransactionKind,

    /// Current status
    pub status: TransactionStatus,

    /// Requested amount (positive magnitude)
    pub amount: Decimal,

    /// Balance before the effect
    pub balance_before: Decimal,

    /// Balance after the effect
    pub balance_after: Decimal,

    /// Fee-adjusted net amount actually moved, when it differs from `amount`
    pub actual_amount: Option<Decimal>,

    /// Fee withheld (`amount - actual_amount`), recorded at settlement
    pub fee: Option<Decimal>,

    /// Related entity (game, payout, ...)
    pub related_id: Option<Uuid>,

    /// Payment method used for deposits/withdrawals
    pub payment_method_id: Option<Uuid>,

    /// Human-readable description
    pub description: String,

    /// Reason recorded on failure or cancellation
    pub failure_reason: Option<String>,

    /// Admin who settled the transaction
    pub reviewed_by: Option<UserId>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Settlement timestamp (terminal states only)
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// The amount that actually moves the balance
    pub fn effective_amount(&self) -> Decimal {
        self.actual_amount.unwrap_or(self.amount)
    }
}

/// Platform account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Owner
    pub user_id: UserId,

    /// Current balance (two-decimal precision)
    pub balance: Decimal,

    /// Role
    pub role: Role,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last balance change
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a user-role account with an opening balance
    pub fn new(user_id: UserId, balance: Decimal) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance,
            role: Role::User,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an admin-role account
    pub fn admin(user_id: UserId) -> Self {
        Self {
            role: Role::Admin,
            ..Self::new(user_id, Decimal::ZERO)
        }
    }
}

/// External payment method on file for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Unique ID
    pub id: Uuid,

    /// Owner
    pub user_id: UserId,

    /// Display label ("Visa ···4242")
    pub label: String,

    /// Verified methods may be used for withdrawals
    pub verified: bool,

    /// Last successful use
    pub last_used_at: Option<DateTime<Utc>>,
}

impl PaymentMethod {
    /// Create an unverified method
    pub fn new(user_id: UserId, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            label: label.into(),
            verified: false,
            last_used_at: None,
        }
    }
}

/// Parameters for [`crate::Ledger::create_transaction`]
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Account to move
    pub user_id: UserId,

    /// Kind
    pub kind: TransactionKind,

    /// Initial status (`Completed` applies the balance effect immediately)
    pub status: TransactionStatus,

    /// Positive magnitude
    pub amount: Decimal,

    /// Related entity
    pub related_id: Option<Uuid>,

    /// Payment method
    pub payment_method_id: Option<Uuid>,

    /// Description for the audit trail
    pub description: String,
}

impl NewTransaction {
    /// A transaction applied immediately (status `Completed`)
    pub fn completed(
        user_id: UserId,
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            status: TransactionStatus::Completed,
            amount,
            related_id: None,
            payment_method_id: None,
            description: description.into(),
        }
    }

    /// A transaction awaiting admin settlement (status `Pending`)
    pub fn pending(
        user_id: UserId,
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            status: TransactionStatus::Pending,
            ..Self::completed(user_id, kind, amount, description)
        }
    }

    /// Attach a related entity ID
    pub fn with_related(mut self, related_id: Uuid) -> Self {
        self.related_id = Some(related_id);
        self
    }

    /// Attach a payment method ID
    pub fn with_payment_method(mut self, payment_method_id: Uuid) -> Self {
        self.payment_method_id = Some(payment_method_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_classification() {
        assert_eq!(TransactionKind::Deposit.direction(), Direction::Credit);
        assert_eq!(TransactionKind::SquaresPayout.direction(), Direction::Credit);
        assert_eq!(TransactionKind::SquaresRefund.direction(), Direction::Credit);
        assert_eq!(TransactionKind::Withdrawal.direction(), Direction::Debit);
        assert_eq!(TransactionKind::SquaresPurchase.direction(), Direction::Debit);
        assert_eq!(TransactionKind::AdminDebit.direction(), Direction::Debit);
    }

    #[test]
    fn test_status_transitions_forward_only() {
        use TransactionStatus::*;

        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        // No backward or out-of-terminal moves
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Completed));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_effective_amount_prefers_actual() {
        let user = UserId::new("u1");
        let mut tx = Transaction {
            id: Uuid::now_v7(),
            user_id: user,
            kind: TransactionKind::Withdrawal,
            status: TransactionStatus::Pending,
            amount: dec!(50.00),
            balance_before: dec!(100.00),
            balance_after: dec!(50.00),
            actual_amount: None,
            fee: None,
            related_id: None,
            payment_method_id: None,
            description: String::new(),
            failure_reason: None,
            reviewed_by: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        assert_eq!(tx.effective_amount(), dec!(50.00));

        tx.actual_amount = Some(dec!(48.00));
        assert_eq!(tx.effective_amount(), dec!(48.00));
    }

    #[test]
    fn test_role_admin_gate() {
        assert!(!Role::User.is_admin());
        assert!(Role::Admin.is_admin());
        assert!(Role::SuperAdmin.is_admin());
    }
}
