use crate::domain::models::{is_weekend, BulkDayResult, BulkDayStatus, DayFact, DayRecord};
use crate::infrastructure::day_fact_client::{BulkBlockResponse, DayFactSource, DayRangeQuery};
use crate::infrastructure::error::CalendarError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct SourceState {
    facts: BTreeMap<NaiveDate, DayFact>,
    records: BTreeMap<NaiveDate, DayRecord>,
    next_record_id: u64,
}

/// Authoritative day store living in the current process.
///
/// Applies the same conflict rule as the venue backend: a day with an active
/// event or a tasting is skipped when blocking. Unblocking always succeeds.
#[derive(Debug, Default)]
pub struct InMemoryDayFactSource {
    state: Mutex<SourceState>,
    list_calls: AtomicUsize,
    bulk_calls: AtomicUsize,
    resolve_calls: AtomicUsize,
}

impl InMemoryDayFactSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_facts(facts: impl IntoIterator<Item = DayFact>) -> Self {
        let source = Self::default();
        {
            let mut state = source
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state.facts = facts.into_iter().map(|fact| (fact.date, fact)).collect();
        }
        source
    }

    /// Replace or insert a fact, as another console session would.
    pub fn upsert_fact(&self, fact: DayFact) -> Result<(), CalendarError> {
        let mut state = self.state.lock().map_err(CalendarError::lock)?;
        state.facts.insert(fact.date, fact);
        Ok(())
    }

    pub fn fact(&self, date: NaiveDate) -> Result<Option<DayFact>, CalendarError> {
        let state = self.state.lock().map_err(CalendarError::lock)?;
        Ok(state.facts.get(&date).cloned())
    }

    pub fn record_count(&self) -> Result<usize, CalendarError> {
        let state = self.state.lock().map_err(CalendarError::lock)?;
        Ok(state.records.len())
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DayFactSource for InMemoryDayFactSource {
    async fn list_days(&self, query: DayRangeQuery) -> Result<Vec<DayFact>, CalendarError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if query.to < query.from {
            return Err(CalendarError::InvalidDate(format!(
                "range end {} is before start {}",
                query.to, query.from
            )));
        }

        let state = self.state.lock().map_err(CalendarError::lock)?;
        Ok(state
            .facts
            .range(query.from..=query.to)
            .map(|(_, fact)| fact)
            .filter(|fact| !query.weekends_only || is_weekend(fact.date))
            .cloned()
            .collect())
    }

    async fn block_days_bulk(
        &self,
        dates: &[NaiveDate],
        blocked: bool,
    ) -> Result<BulkBlockResponse, CalendarError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().map_err(CalendarError::lock)?;

        let results = dates
            .iter()
            .map(|&date| {
                let fact = state
                    .facts
                    .entry(date)
                    .or_insert_with(|| DayFact::free(date));
                let status = if !blocked {
                    fact.is_blocked = false;
                    BulkDayStatus::Unblocked
                } else if fact.has_active_event() || fact.tastings_count > 0 {
                    BulkDayStatus::Skipped
                } else {
                    fact.is_blocked = true;
                    BulkDayStatus::Blocked
                };
                BulkDayResult { date, status }
            })
            .collect();

        Ok(BulkBlockResponse { results })
    }

    async fn get_or_create_day(&self, date: NaiveDate) -> Result<DayRecord, CalendarError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().map_err(CalendarError::lock)?;

        if let Some(existing) = state.records.get(&date) {
            return Ok(existing.clone());
        }

        state.next_record_id += 1;
        let record = DayRecord {
            id: format!("day-{}", state.next_record_id),
            date,
        };
        state.records.insert(date, record.clone());
        state.facts.entry(date).or_insert_with(|| DayFact::free(date));
        Ok(record)
    }
}
