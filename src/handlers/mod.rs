pub mod ballots;
pub mod devices;
pub mod polls;
