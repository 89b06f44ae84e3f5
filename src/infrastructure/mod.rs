pub mod config;
pub mod day_fact_client;
pub mod error;
pub mod in_memory_source;
pub mod month_cache;
pub mod telemetry;
