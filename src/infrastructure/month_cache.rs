use crate::domain::models::{DayFact, MonthBucket, MonthKey};
use crate::infrastructure::error::CalendarError;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// How much of a month a cached bucket covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthCoverage {
    Full,
    WeekendsOnly,
}

impl MonthCoverage {
    pub fn satisfies(self, weekends_only: bool) -> bool {
        match self {
            Self::Full => true,
            Self::WeekendsOnly => weekends_only,
        }
    }
}

#[derive(Debug)]
struct CachedMonth {
    bucket: MonthBucket,
    coverage: MonthCoverage,
}

/// Session-scoped day facts keyed by month.
///
/// Entries never expire on their own. Every mutation is announced on a
/// broadcast channel so views can repaint the months they show. Readers only
/// ever receive clones.
#[derive(Debug)]
pub struct MonthCache {
    months: Mutex<HashMap<MonthKey, CachedMonth>>,
    updates: broadcast::Sender<MonthKey>,
}

impl Default for MonthCache {
    fn default() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            months: Mutex::new(HashMap::new()),
            updates,
        }
    }
}

impl MonthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonthKey> {
        self.updates.subscribe()
    }

    pub fn get_month(&self, key: MonthKey) -> Result<Option<MonthBucket>, CalendarError> {
        let months = self.months.lock().map_err(CalendarError::lock)?;
        Ok(months.get(&key).map(|cached| cached.bucket.clone()))
    }

    pub fn coverage(&self, key: MonthKey) -> Result<Option<MonthCoverage>, CalendarError> {
        let months = self.months.lock().map_err(CalendarError::lock)?;
        Ok(months.get(&key).map(|cached| cached.coverage))
    }

    pub fn has_month(&self, key: MonthKey) -> Result<bool, CalendarError> {
        Ok(self.coverage(key)?.is_some())
    }

    /// Replace the bucket for `key`. Facts dated outside the month are dropped.
    pub fn set_month(
        &self,
        key: MonthKey,
        facts: impl IntoIterator<Item = DayFact>,
        coverage: MonthCoverage,
    ) -> Result<(), CalendarError> {
        let bucket: MonthBucket = facts
            .into_iter()
            .filter(|fact| key.contains(fact.date))
            .map(|fact| (fact.date, fact))
            .collect();
        {
            let mut months = self.months.lock().map_err(CalendarError::lock)?;
            months.insert(key, CachedMonth { bucket, coverage });
        }
        self.announce(key);
        Ok(())
    }

    /// Apply `patch` to the fact for `date`, inserting a free fact first when
    /// the month is loaded but the day was never returned by the source.
    ///
    /// Returns `false` without calling `patch` when the month is not cached.
    pub fn patch_day<F>(&self, key: MonthKey, date: NaiveDate, patch: F) -> Result<bool, CalendarError>
    where
        F: FnOnce(&mut DayFact),
    {
        if !key.contains(date) {
            return Err(CalendarError::InvalidDate(format!("{date} is outside month {key}")));
        }
        {
            let mut months = self.months.lock().map_err(CalendarError::lock)?;
            let Some(cached) = months.get_mut(&key) else {
                return Ok(false);
            };
            let fact = cached
                .bucket
                .entry(date)
                .or_insert_with(|| DayFact::free(date));
            patch(fact);
        }
        self.announce(key);
        Ok(true)
    }

    pub fn fact_for(&self, date: NaiveDate) -> Result<Option<DayFact>, CalendarError> {
        let months = self.months.lock().map_err(CalendarError::lock)?;
        Ok(months
            .get(&MonthKey::of(date))
            .and_then(|cached| cached.bucket.get(&date))
            .cloned())
    }

    pub fn invalidate_month(&self, key: MonthKey) -> Result<bool, CalendarError> {
        let removed = {
            let mut months = self.months.lock().map_err(CalendarError::lock)?;
            months.remove(&key).is_some()
        };
        if removed {
            self.announce(key);
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<(), CalendarError> {
        let keys: Vec<MonthKey> = {
            let mut months = self.months.lock().map_err(CalendarError::lock)?;
            months.drain().map(|(key, _)| key).collect()
        };
        for key in keys {
            self.announce(key);
        }
        Ok(())
    }

    fn announce(&self, key: MonthKey) {
        // No receivers is fine.
        let _ = self.updates.send(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EventStatus, EventSummary};

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn june() -> MonthKey {
        MonthKey::of(date("2025-06-01"))
    }

    #[test]
    fn set_month_indexes_by_date_and_drops_foreign_days() {
        let cache = MonthCache::new();
        let mut booked = DayFact::free(date("2025-06-02"));
        booked.events.push(EventSummary {
            id: "evt-1".to_string(),
            title: "Wedding".to_string(),
            status: EventStatus::Confirmed,
        });

        cache
            .set_month(
                june(),
                vec![booked.clone(), DayFact::free(date("2025-07-01"))],
                MonthCoverage::Full,
            )
            .expect("set month");

        let bucket = cache.get_month(june()).expect("read").expect("bucket exists");
        assert_eq!(bucket.len(), 1);
        assert_eq!(cache.fact_for(date("2025-06-02")).expect("read"), Some(booked));
        assert_eq!(cache.fact_for(date("2025-07-01")).expect("read"), None);
    }

    #[test]
    fn patch_day_inserts_missing_day_in_loaded_month() {
        let cache = MonthCache::new();
        cache
            .set_month(june(), Vec::new(), MonthCoverage::Full)
            .expect("set month");

        let patched = cache
            .patch_day(june(), date("2025-06-05"), |fact| fact.is_blocked = true)
            .expect("patch");

        assert!(patched);
        let fact = cache
            .fact_for(date("2025-06-05"))
            .expect("read")
            .expect("inserted fact");
        assert!(fact.is_blocked);
    }

    #[test]
    fn patch_day_ignores_unloaded_month_and_rejects_foreign_dates() {
        let cache = MonthCache::new();
        let patched = cache
            .patch_day(june(), date("2025-06-05"), |fact| fact.is_blocked = true)
            .expect("patch");
        assert!(!patched);
        assert!(!cache.has_month(june()).expect("read"));

        let error = cache
            .patch_day(june(), date("2025-07-05"), |fact| fact.is_blocked = true)
            .expect_err("date outside month");
        assert!(matches!(error, CalendarError::InvalidDate(_)));
    }

    #[test]
    fn mutations_are_announced() {
        let cache = MonthCache::new();
        let mut updates = cache.subscribe();

        cache
            .set_month(june(), Vec::new(), MonthCoverage::WeekendsOnly)
            .expect("set month");
        cache
            .patch_day(june(), date("2025-06-07"), |fact| fact.tastings_count = 1)
            .expect("patch");
        cache.invalidate_month(june()).expect("invalidate");

        assert_eq!(updates.try_recv().expect("set announced"), june());
        assert_eq!(updates.try_recv().expect("patch announced"), june());
        assert_eq!(updates.try_recv().expect("invalidate announced"), june());
        assert!(updates.try_recv().is_err());
    }

    #[test]
    fn coverage_reports_weekend_buckets() {
        let cache = MonthCache::new();
        cache
            .set_month(june(), Vec::new(), MonthCoverage::WeekendsOnly)
            .expect("set month");

        let coverage = cache.coverage(june()).expect("read").expect("cached");
        assert!(coverage.satisfies(true));
        assert!(!coverage.satisfies(false));
        assert!(MonthCoverage::Full.satisfies(false));
    }
}
