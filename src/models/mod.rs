pub mod formation;
pub mod progress;
pub mod quiz_attempt;
pub mod user;
