pub mod quota;
pub mod schedule;
