pub mod availability;
pub mod models;
