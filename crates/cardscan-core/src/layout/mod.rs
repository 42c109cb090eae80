pub mod zones;

pub use zones::{BoardLayout, BoardZone};
