pub mod best_effort;
pub mod card_info;
pub mod queue;
pub mod rate_limit;
pub mod status_cache;
pub mod worker;
