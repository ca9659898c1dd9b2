pub mod earnings;
pub mod metrics;
