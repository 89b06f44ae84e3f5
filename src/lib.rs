//! Availability calendar for a single venue.
//!
//! Month buckets of day facts are fetched once and cached. Days are classified
//! for display, staff block or unblock days in bulk, and event or tasting forms
//! pick single days with optimistic updates.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bulk_blocking::{BulkBlockingController, BulkPhase, BulkReport};
pub use application::day_picker::{
    CalendarUpdate, DayPicker, DisplayedMonthUpdates, PickOutcome, PickTicket,
};
pub use application::month_loader::{LoadState, MonthLoad, MonthLoader, YearLoad};
pub use domain::availability::{
    classify, is_selectable_for_blocking, is_selectable_for_event_creation,
    is_selectable_for_tasting_pick, PickPurpose,
};
pub use domain::models::{
    BulkDayResult, BulkDayStatus, DayCell, DayClass, DayFact, DayRecord, EventStatus,
    EventSummary, MonthKey,
};
pub use infrastructure::config::{ensure_default_config, load_calendar_config, CalendarConfig};
pub use infrastructure::day_fact_client::{DayFactSource, DayRangeQuery, ReqwestDayFactSource};
pub use infrastructure::error::CalendarError;
pub use infrastructure::in_memory_source::InMemoryDayFactSource;
pub use infrastructure::month_cache::{MonthCache, MonthCoverage};
pub use infrastructure::telemetry::{init_tracing, init_tracing_from_config};
