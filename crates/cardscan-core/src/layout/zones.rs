//! Screen zones of the game board.
//!
//! The board splits into a stats bar on the left, the joker row across the
//! top of the remaining width and the playing hand below it.

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BoardZone {
    /// Score, hands and discards panel
    Data,
    /// Joker and consumable row
    Jokers,
    /// Playing cards in hand
    Hand,
}

/// Fractional split of the board into [`BoardZone`]s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardLayout {
    /// Width of the data bar as a fraction of board width
    pub data_width: f64,
    /// Height of the joker row as a fraction of board height
    pub jokers_height: f64,
}

impl Default for BoardLayout {
    fn default() -> Self {
        Self {
            data_width: 0.25,
            jokers_height: 0.30,
        }
    }
}

impl BoardLayout {
    pub fn new(data_width: f64, jokers_height: f64) -> Result<Self> {
        let layout = Self {
            data_width,
            jokers_height,
        };
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..1.0).contains(&self.data_width),
            "data_width must be in [0, 1), got {}",
            self.data_width
        );
        ensure!(
            (0.0..1.0).contains(&self.jokers_height),
            "jokers_height must be in [0, 1), got {}",
            self.jokers_height
        );
        Ok(())
    }

    /// Zone containing the point `(x, y)` of a `width` x `height` board.
    pub fn zone_at(&self, x: f64, y: f64, width: f64, height: f64) -> BoardZone {
        if x < width * self.data_width {
            BoardZone::Data
        } else if y < height * self.jokers_height {
            BoardZone::Jokers
        } else {
            BoardZone::Hand
        }
    }

    /// Zone of a box, decided by its center.
    pub fn zone_of(&self, bounds: [f64; 4], width: f64, height: f64) -> BoardZone {
        let [x_min, y_min, x_max, y_max] = bounds;
        self.zone_at((x_min + x_max) / 2.0, (y_min + y_max) / 2.0, width, height)
    }
}
