pub mod prediction;
pub mod tracking;
