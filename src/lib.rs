//! Card exchange status detection
//!
//! Visits to a shared card enqueue a de-duplicated detection job; a polling
//! worker drains the queue, asks the card-info provider whether the card is
//! still available and writes the result back to PostgreSQL. Terminal
//! statuses are cached briefly so repeat visits skip the database.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
