mod engine;
mod phase;

pub use engine::{TimerEngine, TimerSnapshot, Transition};
pub use phase::{format_mmss, Phase};
