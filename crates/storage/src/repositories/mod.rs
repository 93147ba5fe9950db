pub mod actions_repo;

pub use actions_repo::{ActionRecord, ActionsRepository};
