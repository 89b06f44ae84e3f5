use crate::domain::models::{MonthBucket, MonthKey};
use crate::infrastructure::config::CalendarConfig;
use crate::infrastructure::day_fact_client::{DayFactSource, DayRangeQuery};
use crate::infrastructure::error::CalendarError;
use crate::infrastructure::month_cache::{MonthCache, MonthCoverage};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Loading flag shown by month views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthLoad {
    Cached,
    Fetched { days: usize },
}

#[derive(Debug, Clone, Default)]
pub struct YearLoad {
    pub loaded: Vec<MonthKey>,
    pub failed: Vec<(MonthKey, String)>,
}

/// Fetch-on-miss path between the day fact source and the month cache.
///
/// At most one fetch per month per session, unless the month was invalidated
/// or the cached bucket only covers weekends. Concurrent misses are not
/// de-duplicated; the later response overwrites with equivalent data.
pub struct MonthLoader<S>
where
    S: DayFactSource,
{
    source: Arc<S>,
    cache: Arc<MonthCache>,
    config: CalendarConfig,
    states: Mutex<HashMap<MonthKey, LoadState>>,
    now_provider: NowProvider,
}

impl<S> MonthLoader<S>
where
    S: DayFactSource,
{
    pub fn new(source: Arc<S>, cache: Arc<MonthCache>, config: CalendarConfig) -> Self {
        Self {
            source,
            cache,
            config,
            states: Mutex::new(HashMap::new()),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn cache(&self) -> &Arc<MonthCache> {
        &self.cache
    }

    pub fn load_state(&self, key: MonthKey) -> Result<LoadState, CalendarError> {
        let states = self.states.lock().map_err(CalendarError::lock)?;
        Ok(states.get(&key).cloned().unwrap_or(LoadState::Idle))
    }

    pub async fn ensure_month(
        &self,
        key: MonthKey,
        weekends_only: bool,
    ) -> Result<MonthLoad, CalendarError> {
        if let Some(coverage) = self.cache.coverage(key)? {
            if coverage.satisfies(weekends_only) {
                debug!(month = %key, "month served from cache");
                return Ok(MonthLoad::Cached);
            }
            debug!(month = %key, "weekend-only bucket upgraded to full month");
        }

        self.set_state(key, LoadState::Loading)?;
        let query = DayRangeQuery {
            from: key.first_day(),
            to: key.last_day(),
            weekends_only,
        };

        match self.source.list_days(query).await {
            Ok(days) => {
                let count = days.len();
                let coverage = if weekends_only {
                    MonthCoverage::WeekendsOnly
                } else {
                    MonthCoverage::Full
                };
                self.cache.set_month(key, days, coverage)?;
                self.set_state(key, LoadState::Ready)?;
                info!(month = %key, days = count, weekends_only, "month fetched");
                Ok(MonthLoad::Fetched { days: count })
            }
            Err(error) => {
                warn!(month = %key, error = %error, "month fetch failed");
                self.set_state(key, LoadState::Failed(error.to_string()))?;
                Err(error)
            }
        }
    }

    /// Load the month a view's date range is anchored on.
    pub async fn ensure_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<MonthLoad, CalendarError> {
        if to < from {
            return Err(CalendarError::InvalidDate(format!(
                "range end {to} is before start {from}"
            )));
        }
        self.ensure_month(MonthKey::of(from), false).await
    }

    pub async fn ensure_current_month(&self) -> Result<MonthLoad, CalendarError> {
        let today = self.config.today((self.now_provider)());
        self.ensure_month(MonthKey::of(today), false).await
    }

    /// Yearly overview: months load one after another and a failed month
    /// does not stop the rest.
    pub async fn ensure_year(&self, year: i32) -> Result<YearLoad, CalendarError> {
        let weekends_only = self.config.yearly_overview_weekends_only;
        let mut result = YearLoad::default();
        let mut key = MonthKey::new(year, 1).map_err(CalendarError::InvalidDate)?;

        for _ in 0..12 {
            match self.ensure_month(key, weekends_only).await {
                Ok(_) => result.loaded.push(key),
                Err(error) => result.failed.push((key, error.to_string())),
            }
            key = key.next();
        }
        Ok(result)
    }

    pub fn month(&self, key: MonthKey) -> Result<Option<MonthBucket>, CalendarError> {
        self.cache.get_month(key)
    }

    fn set_state(&self, key: MonthKey, state: LoadState) -> Result<(), CalendarError> {
        let mut states = self.states.lock().map_err(CalendarError::lock)?;
        states.insert(key, state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DayFact, DayRecord};
    use crate::infrastructure::day_fact_client::BulkBlockResponse;
    use crate::infrastructure::in_memory_source::InMemoryDayFactSource;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    enum FakeListResponse {
        Success(Vec<DayFact>),
        NetworkError,
    }

    #[derive(Debug)]
    struct FakeDayFactSource {
        list_responses: Mutex<VecDeque<FakeListResponse>>,
        list_calls: AtomicUsize,
        queries: Mutex<Vec<DayRangeQuery>>,
    }

    impl FakeDayFactSource {
        fn with_list_responses(responses: Vec<FakeListResponse>) -> Self {
            Self {
                list_responses: Mutex::new(responses.into()),
                list_calls: AtomicUsize::new(0),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DayFactSource for FakeDayFactSource {
        async fn list_days(&self, query: DayRangeQuery) -> Result<Vec<DayFact>, CalendarError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().expect("queries lock poisoned").push(query);
            let response = self
                .list_responses
                .lock()
                .expect("list response lock poisoned")
                .pop_front()
                .unwrap_or(FakeListResponse::Success(Vec::new()));
            match response {
                FakeListResponse::Success(days) => Ok(days),
                FakeListResponse::NetworkError => {
                    Err(CalendarError::Http("network error while listing days".to_string()))
                }
            }
        }

        async fn block_days_bulk(
            &self,
            _dates: &[NaiveDate],
            _blocked: bool,
        ) -> Result<BulkBlockResponse, CalendarError> {
            Err(CalendarError::Http("not implemented in fake".to_string()))
        }

        async fn get_or_create_day(&self, _date: NaiveDate) -> Result<DayRecord, CalendarError> {
            Err(CalendarError::Http("not implemented in fake".to_string()))
        }
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn june() -> MonthKey {
        "2025-06".parse().expect("valid month key")
    }

    #[tokio::test]
    async fn same_month_is_fetched_once() {
        let source = Arc::new(InMemoryDayFactSource::with_facts(vec![DayFact::free(date(
            "2025-06-04",
        ))]));
        let loader = MonthLoader::new(
            Arc::clone(&source),
            Arc::new(MonthCache::new()),
            CalendarConfig::default(),
        );

        let first = loader.ensure_month(june(), false).await.expect("first load");
        let second = loader.ensure_month(june(), false).await.expect("second load");

        assert_eq!(first, MonthLoad::Fetched { days: 1 });
        assert_eq!(second, MonthLoad::Cached);
        assert_eq!(source.list_calls(), 1);
        assert_eq!(loader.load_state(june()).expect("state"), LoadState::Ready);
    }

    #[tokio::test]
    async fn month_query_spans_first_to_last_day() {
        let source = Arc::new(FakeDayFactSource::with_list_responses(Vec::new()));
        let loader = MonthLoader::new(
            Arc::clone(&source),
            Arc::new(MonthCache::new()),
            CalendarConfig::default(),
        );

        loader
            .ensure_range(date("2025-06-10"), date("2025-06-16"))
            .await
            .expect("load");

        let queries = source.queries.lock().expect("queries lock poisoned");
        assert_eq!(
            queries.as_slice(),
            &[DayRangeQuery {
                from: date("2025-06-01"),
                to: date("2025-06-30"),
                weekends_only: false,
            }]
        );
    }

    #[tokio::test]
    async fn failed_fetch_leaves_month_absent_and_refetches_later() {
        let source = Arc::new(FakeDayFactSource::with_list_responses(vec![
            FakeListResponse::NetworkError,
            FakeListResponse::Success(vec![DayFact::free(date("2025-06-02"))]),
        ]));
        let cache = Arc::new(MonthCache::new());
        let loader = MonthLoader::new(Arc::clone(&source), Arc::clone(&cache), CalendarConfig::default());

        let error = loader.ensure_month(june(), false).await.expect_err("first load fails");
        assert!(matches!(error, CalendarError::Http(_)));
        assert!(!cache.has_month(june()).expect("read"));
        assert!(matches!(
            loader.load_state(june()).expect("state"),
            LoadState::Failed(message) if message.contains("network error")
        ));

        let retried = loader.ensure_month(june(), false).await.expect("second load");
        assert_eq!(retried, MonthLoad::Fetched { days: 1 });
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn weekend_bucket_is_upgraded_but_full_bucket_serves_weekends() {
        let source = Arc::new(FakeDayFactSource::with_list_responses(Vec::new()));
        let loader = MonthLoader::new(
            Arc::clone(&source),
            Arc::new(MonthCache::new()),
            CalendarConfig::default(),
        );

        loader.ensure_month(june(), true).await.expect("weekends");
        assert_eq!(loader.ensure_month(june(), true).await.expect("cached"), MonthLoad::Cached);
        assert!(matches!(
            loader.ensure_month(june(), false).await.expect("upgrade"),
            MonthLoad::Fetched { .. }
        ));
        assert_eq!(loader.ensure_month(june(), true).await.expect("cached"), MonthLoad::Cached);
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn yearly_overview_continues_past_failed_month() {
        let mut responses = vec![FakeListResponse::Success(Vec::new())];
        responses.push(FakeListResponse::NetworkError);
        let source = Arc::new(FakeDayFactSource::with_list_responses(responses));
        let loader = MonthLoader::new(
            Arc::clone(&source),
            Arc::new(MonthCache::new()),
            CalendarConfig::default(),
        );

        let year = loader.ensure_year(2025).await.expect("year load");

        assert_eq!(year.loaded.len(), 11);
        assert_eq!(year.failed.len(), 1);
        assert_eq!(year.failed[0].0.to_string(), "2025-02");
        let queries = source.queries.lock().expect("queries lock poisoned");
        assert!(queries.iter().all(|query| query.weekends_only));
    }

    #[tokio::test]
    async fn current_month_follows_venue_timezone() {
        let source = Arc::new(FakeDayFactSource::with_list_responses(Vec::new()));
        let config = CalendarConfig {
            venue_timezone: chrono_tz::Pacific::Auckland,
            ..CalendarConfig::default()
        };
        let now = DateTime::parse_from_rfc3339("2025-06-30T20:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc);
        let cache = Arc::new(MonthCache::new());
        let loader = MonthLoader::new(Arc::clone(&source), Arc::clone(&cache), config)
            .with_now_provider(Arc::new(move || now));

        loader.ensure_current_month().await.expect("load");

        assert!(cache.has_month("2025-07".parse().expect("valid key")).expect("read"));
    }
}
