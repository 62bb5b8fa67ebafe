//! Winner resolution
//!
//! Pure functions, no IO: a cell wins a period when its assigned row digit
//! equals the home score's last digit and its assigned column digit equals
//! the away score's last digit.

use crate::types::{SquaresGame, SquaresPurchase};

/// Board coordinates of the winning cell for a score pair.
///
/// `row_numbers[i]` is the digit assigned to row `i`; the winning row is
/// the index holding `home % 10`, likewise for columns with the away score.
/// Both lookups always succeed because the arrays are permutations of 0-9.
pub fn winning_cell(
    row_numbers: &[u8; 10],
    col_numbers: &[u8; 10],
    home_score: u32,
    away_score: u32,
) -> (u8, u8) {
    let home_digit = (home_score % 10) as u8;
    let away_digit = (away_score % 10) as u8;

    let row = row_numbers
        .iter()
        .position(|&n| n == home_digit)
        .expect("row numbers are a permutation of 0-9") as u8;
    let col = col_numbers
        .iter()
        .position(|&n| n == away_digit)
        .expect("col numbers are a permutation of 0-9") as u8;

    (row, col)
}

/// The purchase occupying the winning cell, or `None` when the grid is
/// unassigned or the cell is unowned.
pub fn resolve_winner<'a>(
    game: &SquaresGame,
    purchases: &'a [SquaresPurchase],
    home_score: u32,
    away_score: u32,
) -> Option<&'a SquaresPurchase> {
    let (Some(row_numbers), Some(col_numbers)) = (&game.row_numbers, &game.col_numbers) else {
        return None;
    };

    let (row, col) = winning_cell(row_numbers, col_numbers, home_score, away_score);
    purchases
        .iter()
        .find(|p| p.square.row == row && p.square.col == col)
}
