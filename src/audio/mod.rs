//! Audio pacing for real-time recognition

mod pacer;

pub use pacer::{AudioPacer, PacerReport};
