pub mod bulk_blocking;
pub mod day_picker;
pub mod month_loader;
