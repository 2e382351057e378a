pub mod exchange;
pub mod visit;
