use anyhow::{Result, bail, ensure};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::PLAYING_CARD_SHEET_LEN;
use super::suit::{Rank, Suit};

const JOKER_PREFIX: &str = "joker_";

/// Identity of a board element as carried in a detection's class label.
///
/// Playing cards render as `<rank><suit>` ("KS", "10H"), jokers as
/// `joker_<name>`; anything else is an auxiliary icon kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardLabel {
    Playing { rank: Rank, suit: Suit },
    Joker(String),
    Icon(String),
}

impl CardLabel {
    pub fn playing(rank: Rank, suit: Suit) -> Self {
        CardLabel::Playing { rank, suit }
    }

    /// Label for a cell of the 13x4 playing card sprite sheet.
    ///
    /// Rows are suits (Hearts, Clubs, Diamonds, Spades), columns are ranks
    /// from Two to Ace.
    pub fn from_sheet_index(index: usize) -> Result<Self> {
        ensure!(
            index < PLAYING_CARD_SHEET_LEN,
            "sprite sheet index {} out of range (0..{})",
            index,
            PLAYING_CARD_SHEET_LEN
        );
        let suit = Suit::ALL[index / Rank::ALL.len()];
        let rank = Rank::ALL[index % Rank::ALL.len()];
        Ok(CardLabel::playing(rank, suit))
    }

    /// Inverse of [`CardLabel::from_sheet_index`]; `None` for jokers and icons.
    pub fn sheet_index(&self) -> Option<usize> {
        match self {
            CardLabel::Playing { rank, suit } => {
                Some(*suit as usize * Rank::ALL.len() + *rank as usize)
            }
            _ => None,
        }
    }

    pub fn is_playing_card(&self) -> bool {
        matches!(self, CardLabel::Playing { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            CardLabel::Playing { rank, suit } => format!("{} of {}", rank.code(), suit),
            CardLabel::Joker(name) => format!("Joker ({})", name),
            CardLabel::Icon(name) => format!("Icon ({})", name),
        }
    }
}

impl FromStr for CardLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty card label");
        }

        if let Some(name) = s
            .get(..JOKER_PREFIX.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(JOKER_PREFIX))
            .map(|_| &s[JOKER_PREFIX.len()..])
        {
            ensure!(!name.is_empty(), "joker label without a name: '{}'", s);
            return Ok(CardLabel::Joker(name.to_string()));
        }

        // Playing cards: rank code followed by a single suit symbol
        let mut chars = s.chars();
        if let Some(last) = chars.next_back() {
            if let (Some(suit), Some(rank)) = (Suit::from_symbol(last), Rank::from_code(chars.as_str())) {
                return Ok(CardLabel::playing(rank, suit));
            }
        }

        Ok(CardLabel::Icon(s.to_string()))
    }
}

impl fmt::Display for CardLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardLabel::Playing { rank, suit } => write!(f, "{}{}", rank.code(), suit.symbol()),
            CardLabel::Joker(name) => write!(f, "{}{}", JOKER_PREFIX, name),
            CardLabel::Icon(name) => f.write_str(name),
        }
    }
}
