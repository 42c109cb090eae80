//! Game domain types shared by the vision pipeline and the CLI.

pub mod cards;
pub mod layout;

pub use cards::{CardLabel, Rank, Suit};
pub use layout::{BoardLayout, BoardZone};
