pub mod cycle_service;
pub mod execution_service;
