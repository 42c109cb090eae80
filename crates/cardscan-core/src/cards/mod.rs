pub mod label;
pub mod suit;

pub use label::CardLabel;
pub use suit::{Rank, Suit};

/// Number of cells in a standard playing card sprite sheet (13 ranks x 4 suits).
pub const PLAYING_CARD_SHEET_LEN: usize = 52;
