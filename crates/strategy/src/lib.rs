pub mod normalizer;
pub mod planner;

pub use normalizer::{BuyCandidate, buy_candidates};
pub use planner::build_plan;
