//! Core types for the squares engine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledger_core::UserId;

/// Grid axis length; a board is `GRID_SIZE × GRID_SIZE` cells
pub const GRID_SIZE: u8 = 10;

/// Total squares on a board
pub const TOTAL_SQUARES: u32 = (GRID_SIZE as u32) * (GRID_SIZE as u32);

/// Game lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Created, not yet open to the public
    Setup,
    /// Selling squares
    Active,
    /// Numbers assigned, awaiting kickoff
    Locked,
    /// Scores coming in
    Live,
    /// Final period settled (terminal)
    Resolved,
    /// Cancelled with refunds (terminal)
    Cancelled,
}

impl GameStatus {
    /// Whether squares may still be purchased
    pub fn accepts_purchases(self) -> bool {
        matches!(self, GameStatus::Setup | GameStatus::Active)
    }

    /// Whether the game admits no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, GameStatus::Resolved | GameStatus::Cancelled)
    }
}

/// Scoring checkpoint at which a share of the pot pays out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Period {
    /// End of the first quarter
    First,
    /// Halftime
    Second,
    /// End of the third quarter
    Third,
    /// Final whistle
    Final,
    /// First overtime
    Overtime,
    /// Second overtime
    DoubleOvertime,
}

impl Period {
    /// All periods in play order
    pub const ALL: [Period; 6] = [
        Period::First,
        Period::Second,
        Period::Third,
        Period::Final,
        Period::Overtime,
        Period::DoubleOvertime,
    ];

    /// Whether this checkpoint ends regulation play
    pub fn is_final(self) -> bool {
        self == Period::Final
    }
}

/// Pot fractions paid at each regulation checkpoint
///
/// The four fractions must sum to 1.0 within a small tolerance. Overtime
/// checkpoints pay the Final fraction again; the structure itself stays
/// four-way so the fractions keep summing to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutStructure {
    /// First-quarter share
    pub first: Decimal,

    /// Halftime share
    pub second: Decimal,

    /// Third-quarter share
    pub third: Decimal,

    /// Final share
    pub fourth: Decimal,
}

impl PayoutStructure {
    /// The common 15/25/15/45 split
    pub fn standard() -> Self {
        Self {
            first: Decimal::new(15, 2),
            second: Decimal::new(25, 2),
            third: Decimal::new(15, 2),
            fourth: Decimal::new(45, 2),
        }
    }

    /// Sum of the four fractions
    pub fn total(&self) -> Decimal {
        self.first + self.second + self.third + self.fourth
    }

    /// Check the fractions are non-negative and sum to 1.0 within
    /// `tolerance`
    pub fn is_valid(&self, tolerance: Decimal) -> bool {
        let parts = [self.first, self.second, self.third, self.fourth];
        if parts.iter().any(|f| f.is_sign_negative()) {
            return false;
        }
        (self.total() - Decimal::ONE).abs() <= tolerance
    }

    /// Fraction paid at `period`; overtime reuses the Final share
    pub fn fraction_for(&self, period: Period) -> Decimal {
        match period {
            Period::First => self.first,
            Period::Second => self.second,
            Period::Third => self.third,
            Period::Final | Period::Overtime | Period::DoubleOvertime => self.fourth,
        }
    }
}

/// One cell selection on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Square {
    /// Row index, 0-9
    pub row: u8,

    /// Column index, 0-9
    pub col: u8,
}

impl Square {
    /// Create a selection
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    /// Whether both coordinates are on the board
    pub fn in_bounds(self) -> bool {
        self.row < GRID_SIZE && self.col < GRID_SIZE
    }
}

/// A squares game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquaresGame {
    /// Unique ID
    pub id: Uuid,

    /// Display title ("Week 12: Home vs Away")
    pub title: String,

    /// Price of one square
    pub price_per_square: Decimal,

    /// Sum of all purchase amounts
    pub total_pot: Decimal,

    /// Squares sold so far (0-100)
    pub squares_sold: u32,

    /// Pot shares per period
    pub payout_structure: PayoutStructure,

    /// Lifecycle status
    pub status: GameStatus,

    /// Flips true exactly once, at grid lock
    pub numbers_assigned: bool,

    /// Row digit assignment (permutation of 0-9), present after lock
    pub row_numbers: Option<[u8; 10]>,

    /// Column digit assignment (permutation of 0-9), present after lock
    pub col_numbers: Option<[u8; 10]>,

    /// Event start; the grid locks no later than this
    pub starts_at: DateTime<Utc>,

    /// Reason recorded at cancellation
    pub cancel_reason: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A purchased square
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquaresPurchase {
    /// Unique ID
    pub id: Uuid,

    /// Game this purchase belongs to
    pub game_id: Uuid,

    /// Paying account
    pub user_id: UserId,

    /// Display label on the grid; may differ from the payer
    pub owner_name: String,

    /// Cell
    pub square: Square,

    /// Amount paid for this cell
    pub amount: Decimal,

    /// Purchase timestamp
    pub created_at: DateTime<Utc>,
}

/// A settled period payout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquaresPayout {
    /// Unique ID
    pub id: Uuid,

    /// Game
    pub game_id: Uuid,

    /// Period settled
    pub period: Period,

    /// Winning purchase
    pub purchase_id: Uuid,

    /// Credited account
    pub user_id: UserId,

    /// Net amount credited (after platform fee)
    pub amount: Decimal,

    /// Home score at the checkpoint
    pub home_score: u32,

    /// Away score at the checkpoint
    pub away_score: u32,

    /// Settlement timestamp
    pub created_at: DateTime<Utc>,
}

/// Invitation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    /// Sent, unanswered
    Pending,
    /// Accepted (explicitly or by purchasing)
    Accepted,
    /// Declined
    Declined,
}

/// Invitation to join a game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameInvitation {
    /// Unique ID
    pub id: Uuid,

    /// Game
    pub game_id: Uuid,

    /// Invited account
    pub user_id: UserId,

    /// Status
    pub status: InvitationStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Parameters for [`crate::SquaresEngine::create_game`]
#[derive(Debug, Clone)]
pub struct NewGame {
    /// Display title
    pub title: String,

    /// Price of one square
    pub price_per_square: Decimal,

    /// Pot shares per period
    pub payout_structure: PayoutStructure,

    /// Event start time
    pub starts_at: DateTime<Utc>,
}
