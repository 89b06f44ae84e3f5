use crate::domain::availability::{is_selectable_for_blocking, month_cells};
use crate::domain::models::{BulkDayResult, BulkDayStatus, DayCell, MonthKey};
use crate::infrastructure::day_fact_client::DayFactSource;
use crate::infrastructure::error::CalendarError;
use crate::infrastructure::month_cache::MonthCache;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkPhase {
    Idle,
    Selecting,
    Submitting,
    Applied,
    RolledBack,
}

/// Server outcome of one bulk request, restricted to submitted dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport {
    pub blocked: bool,
    pub results: Vec<BulkDayResult>,
}

impl BulkReport {
    pub fn changed_dates(&self) -> Vec<NaiveDate> {
        self.results
            .iter()
            .filter(|result| result.status != BulkDayStatus::Skipped)
            .map(|result| result.date)
            .collect()
    }

    pub fn skipped_dates(&self) -> Vec<NaiveDate> {
        self.results
            .iter()
            .filter(|result| result.status == BulkDayStatus::Skipped)
            .map(|result| result.date)
            .collect()
    }

    /// Message for the operator when some days were left untouched.
    pub fn notice(&self) -> Option<String> {
        let skipped = self.skipped_dates();
        if skipped.is_empty() {
            return None;
        }
        let dates = skipped
            .iter()
            .map(|date| date.format("%Y-%m-%d").to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let action = if self.blocked { "blocked" } else { "unblocked" };
        Some(format!(
            "{} day(s) not {action}: conflict with an active event or tasting ({dates})",
            skipped.len()
        ))
    }
}

#[derive(Debug)]
struct BulkState {
    selection: BTreeSet<NaiveDate>,
    phase: BulkPhase,
}

/// Multi-day block/unblock flow.
///
/// The visible selection is cleared as soon as a request is sent and put back
/// verbatim if the whole request fails. Per-day outcomes from the server are
/// authoritative: only `blocked`/`unblocked` days are patched into the cache.
pub struct BulkBlockingController<S>
where
    S: DayFactSource,
{
    source: Arc<S>,
    cache: Arc<MonthCache>,
    state: Mutex<BulkState>,
}

impl<S> BulkBlockingController<S>
where
    S: DayFactSource,
{
    pub fn new(source: Arc<S>, cache: Arc<MonthCache>) -> Self {
        Self {
            source,
            cache,
            state: Mutex::new(BulkState {
                selection: BTreeSet::new(),
                phase: BulkPhase::Idle,
            }),
        }
    }

    pub fn phase(&self) -> Result<BulkPhase, CalendarError> {
        let state = self.state.lock().map_err(CalendarError::lock)?;
        Ok(state.phase)
    }

    pub fn selection(&self) -> Result<Vec<NaiveDate>, CalendarError> {
        let state = self.state.lock().map_err(CalendarError::lock)?;
        Ok(state.selection.iter().copied().collect())
    }

    pub fn is_selected(&self, date: NaiveDate) -> Result<bool, CalendarError> {
        let state = self.state.lock().map_err(CalendarError::lock)?;
        Ok(state.selection.contains(&date))
    }

    /// Add or remove `date`. Returns whether the selection changed.
    ///
    /// Days with an active event or a tasting cannot be added, and nothing
    /// changes while a request is in flight.
    pub fn toggle_selection(&self, date: NaiveDate) -> Result<bool, CalendarError> {
        let selectable = is_selectable_for_blocking(self.cache.fact_for(date)?.as_ref());
        let mut state = self.state.lock().map_err(CalendarError::lock)?;
        if state.phase == BulkPhase::Submitting {
            debug!(date = %date, "toggle ignored while bulk request is in flight");
            return Ok(false);
        }

        let changed = if state.selection.remove(&date) {
            true
        } else if selectable {
            state.selection.insert(date)
        } else {
            debug!(date = %date, "toggle ignored for conflicting day");
            false
        };
        state.phase = Self::selecting_phase(&state.selection, state.phase);
        Ok(changed)
    }

    /// Add every selectable day of the inclusive range. Returns how many days
    /// were added.
    pub fn select_range(&self, from: NaiveDate, to: NaiveDate) -> Result<usize, CalendarError> {
        if to < from {
            return Err(CalendarError::InvalidDate(format!(
                "range end {to} is before start {from}"
            )));
        }

        let mut candidates = Vec::new();
        let mut date = from;
        while date <= to {
            if is_selectable_for_blocking(self.cache.fact_for(date)?.as_ref()) {
                candidates.push(date);
            }
            date += Duration::days(1);
        }

        let mut state = self.state.lock().map_err(CalendarError::lock)?;
        if state.phase == BulkPhase::Submitting {
            return Ok(0);
        }
        let added = candidates
            .into_iter()
            .filter(|date| state.selection.insert(*date))
            .count();
        state.phase = Self::selecting_phase(&state.selection, state.phase);
        Ok(added)
    }

    pub fn clear_selection(&self) -> Result<(), CalendarError> {
        let mut state = self.state.lock().map_err(CalendarError::lock)?;
        if state.phase == BulkPhase::Submitting {
            return Ok(());
        }
        state.selection.clear();
        state.phase = BulkPhase::Idle;
        Ok(())
    }

    /// Send the current selection as one bulk request.
    ///
    /// On a whole-request failure the pre-submission selection is restored
    /// and the error is returned. The same happens when the returned future
    /// is dropped before the request settles. There is no automatic retry;
    /// submitting the same days again is safe.
    pub async fn submit_bulk(&self, blocked: bool) -> Result<BulkReport, CalendarError> {
        let snapshot: Vec<NaiveDate> = {
            let mut state = self.state.lock().map_err(CalendarError::lock)?;
            if state.phase == BulkPhase::Submitting {
                return Err(CalendarError::BulkInFlight);
            }
            if state.selection.is_empty() {
                return Err(CalendarError::EmptySelection);
            }
            state.phase = BulkPhase::Submitting;
            std::mem::take(&mut state.selection).into_iter().collect()
        };
        let guard = SubmitGuard::arm(&self.state, snapshot.clone());

        info!(days = snapshot.len(), blocked, "submitting bulk blocking request");
        let response = self.source.block_days_bulk(&snapshot, blocked).await;
        guard.disarm();

        match response {
            Ok(response) => {
                let applied = self.apply_results(&snapshot, blocked, response.results);
                self.finish(BulkPhase::Applied, None)?;
                let report = applied?;
                info!(
                    changed = report.changed_dates().len(),
                    skipped = report.skipped_dates().len(),
                    "bulk blocking applied"
                );
                Ok(report)
            }
            Err(error) => {
                warn!(error = %error, days = snapshot.len(), "bulk blocking failed, restoring selection");
                self.finish(BulkPhase::RolledBack, Some(snapshot))?;
                Err(error)
            }
        }
    }

    /// Cells for the blocking view of `month`.
    pub fn month_cells(&self, month: MonthKey) -> Result<Vec<DayCell>, CalendarError> {
        let bucket = self.cache.get_month(month)?;
        let state = self.state.lock().map_err(CalendarError::lock)?;
        Ok(month_cells(
            month,
            bucket.as_ref(),
            is_selectable_for_blocking,
            |date| state.selection.contains(&date),
        ))
    }

    fn apply_results(
        &self,
        snapshot: &[NaiveDate],
        blocked: bool,
        results: Vec<BulkDayResult>,
    ) -> Result<BulkReport, CalendarError> {
        let submitted: BTreeSet<NaiveDate> = snapshot.iter().copied().collect();
        let mut accepted = Vec::with_capacity(results.len());

        for result in results {
            if !submitted.contains(&result.date) {
                warn!(date = %result.date, "ignoring bulk result for a day that was not submitted");
                continue;
            }
            let is_blocked = match result.status {
                BulkDayStatus::Blocked => Some(true),
                BulkDayStatus::Unblocked => Some(false),
                BulkDayStatus::Skipped => None,
            };
            if let Some(is_blocked) = is_blocked {
                self.cache
                    .patch_day(MonthKey::of(result.date), result.date, |fact| {
                        fact.is_blocked = is_blocked
                    })?;
            } else {
                debug!(date = %result.date, "day skipped by server");
            }
            accepted.push(result);
        }

        Ok(BulkReport {
            blocked,
            results: accepted,
        })
    }

    fn finish(&self, phase: BulkPhase, restore: Option<Vec<NaiveDate>>) -> Result<(), CalendarError> {
        let mut state = self.state.lock().map_err(CalendarError::lock)?;
        if let Some(restore) = restore {
            state.selection = restore.into_iter().collect();
        }
        state.phase = phase;
        Ok(())
    }

    fn selecting_phase(selection: &BTreeSet<NaiveDate>, current: BulkPhase) -> BulkPhase {
        if current == BulkPhase::Submitting {
            current
        } else if selection.is_empty() {
            BulkPhase::Idle
        } else {
            BulkPhase::Selecting
        }
    }
}

/// Rolls an abandoned submission back when the `submit_bulk` future is
/// dropped mid-request.
struct SubmitGuard<'a> {
    state: &'a Mutex<BulkState>,
    snapshot: Option<Vec<NaiveDate>>,
}

impl<'a> SubmitGuard<'a> {
    fn arm(state: &'a Mutex<BulkState>, snapshot: Vec<NaiveDate>) -> Self {
        Self {
            state,
            snapshot: Some(snapshot),
        }
    }

    fn disarm(mut self) {
        self.snapshot = None;
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        warn!(days = snapshot.len(), "bulk blocking abandoned, restoring selection");
        state.selection = snapshot.into_iter().collect();
        state.phase = BulkPhase::RolledBack;
    }
}
