//! Per-scan lookup structures over existing recordings and recorded movies

pub mod movies;
pub mod timers;

pub use movies::MovieIndex;
pub use timers::TimerIndex;
