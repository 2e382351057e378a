//! Test doubles for the pipeline's external collaborators.

pub mod mocks;

pub use mocks::*;
