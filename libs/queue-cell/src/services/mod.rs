pub mod estimation;
pub mod export;
pub mod patients;
pub mod pending;
pub mod queue;
