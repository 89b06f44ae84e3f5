use crate::domain::availability::{month_cells, PickPurpose};
use crate::domain::models::{DayCell, DayRecord, MonthKey};
use crate::infrastructure::day_fact_client::DayFactSource;
use crate::infrastructure::error::CalendarError;
use crate::infrastructure::month_cache::MonthCache;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Handle for one pick, compared against the picker's latest generation when
/// its resolution lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickTicket {
    pub date: NaiveDate,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    /// The day record is attached and the selection kept.
    Applied(DayRecord),
    /// A newer pick superseded this one; the result was dropped.
    Stale,
    /// Resolution failed; the selection went back to the last confirmed value.
    Reverted {
        restored: Option<NaiveDate>,
        error: String,
    },
    /// The date fails the picker's selectability rule.
    Rejected,
}

#[derive(Debug, Clone, Copy)]
struct PendingPick {
    date: NaiveDate,
    generation: u64,
}

#[derive(Debug, Default)]
struct PickerState {
    selection: Option<NaiveDate>,
    confirmed: Option<NaiveDate>,
    attached: Option<DayRecord>,
    pending: Option<PendingPick>,
    generation: u64,
    notice: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUpdate {
    Month(MonthKey),
    /// Updates were dropped; repaint every displayed month.
    Resync,
}

/// Cache updates filtered down to the months a picker is displaying.
pub struct DisplayedMonthUpdates {
    receiver: broadcast::Receiver<MonthKey>,
    displayed: Arc<Mutex<BTreeSet<MonthKey>>>,
}

impl DisplayedMonthUpdates {
    /// Wait for the next update touching a displayed month. `None` once the
    /// cache is gone.
    pub async fn next(&mut self) -> Option<CalendarUpdate> {
        loop {
            match self.receiver.recv().await {
                Ok(key) => {
                    let displayed = match self.displayed.lock() {
                        Ok(displayed) => displayed.contains(&key),
                        Err(_) => true,
                    };
                    if displayed {
                        return Some(CalendarUpdate::Month(key));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "month updates lagged");
                    return Some(CalendarUpdate::Resync);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Date field that commits a pick locally first and resolves the backing day
/// record in the background.
///
/// Only the latest pick's resolution is ever applied (last pick wins). A
/// failed resolution puts the selection back to the value the caller last
/// confirmed.
pub struct DayPicker<S>
where
    S: DayFactSource,
{
    source: Arc<S>,
    cache: Arc<MonthCache>,
    purpose: PickPurpose,
    state: Mutex<PickerState>,
    displayed: Arc<Mutex<BTreeSet<MonthKey>>>,
}

impl<S> DayPicker<S>
where
    S: DayFactSource,
{
    pub fn new(source: Arc<S>, cache: Arc<MonthCache>, purpose: PickPurpose) -> Self {
        Self {
            source,
            cache,
            purpose,
            state: Mutex::new(PickerState::default()),
            displayed: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    pub fn purpose(&self) -> PickPurpose {
        self.purpose
    }

    /// The caller's externally confirmed value, used as the revert target.
    pub fn set_current_value(&self, value: Option<NaiveDate>) -> Result<(), CalendarError> {
        let mut state = self.state.lock().map_err(CalendarError::lock)?;
        state.confirmed = value;
        if state.pending.is_none() {
            state.selection = value;
        }
        if state.attached.as_ref().map(|record| record.date) != value {
            state.attached = None;
        }
        Ok(())
    }

    pub fn selection(&self) -> Result<Option<NaiveDate>, CalendarError> {
        let state = self.state.lock().map_err(CalendarError::lock)?;
        Ok(state.selection)
    }

    pub fn attached_day(&self) -> Result<Option<DayRecord>, CalendarError> {
        let state = self.state.lock().map_err(CalendarError::lock)?;
        Ok(state.attached.clone())
    }

    pub fn is_pending(&self) -> Result<bool, CalendarError> {
        let state = self.state.lock().map_err(CalendarError::lock)?;
        Ok(state.pending.is_some())
    }

    /// Transient message left by the last failed resolution.
    pub fn notice(&self) -> Result<Option<String>, CalendarError> {
        let state = self.state.lock().map_err(CalendarError::lock)?;
        Ok(state.notice.clone())
    }

    /// Select `date` immediately. Returns `None` without touching state when
    /// the date is not selectable for this picker's purpose.
    pub fn pick(&self, date: NaiveDate) -> Result<Option<PickTicket>, CalendarError> {
        let fact = self.cache.fact_for(date)?;
        if !self.purpose.is_selectable(fact.as_ref()) {
            debug!(date = %date, purpose = ?self.purpose, "pick rejected");
            return Ok(None);
        }

        let mut state = self.state.lock().map_err(CalendarError::lock)?;
        state.generation += 1;
        let generation = state.generation;
        state.selection = Some(date);
        state.pending = Some(PendingPick { date, generation });
        state.notice = None;
        debug!(date = %date, generation, "day picked");
        Ok(Some(PickTicket { date, generation }))
    }

    /// Resolve the backing day record for `ticket`.
    ///
    /// Errors from the source never escape: they become
    /// `PickOutcome::Reverted`. Only a poisoned state lock is returned as an
    /// error. Dropping the future before it settles reverts the pick as a
    /// failure would, without a notice.
    pub async fn resolve(&self, ticket: PickTicket) -> Result<PickOutcome, CalendarError> {
        let guard = ResolveGuard {
            state: &self.state,
            ticket: Some(ticket),
        };
        let result = self.source.get_or_create_day(ticket.date).await;
        guard.disarm();

        let outcome = {
            let mut state = self.state.lock().map_err(CalendarError::lock)?;
            let is_current = state
                .pending
                .is_some_and(|pending| pending.generation == ticket.generation);
            if !is_current {
                debug!(date = %ticket.date, generation = ticket.generation, "stale day resolution dropped");
                return Ok(PickOutcome::Stale);
            }
            state.pending = None;

            match result {
                Ok(record) => {
                    state.confirmed = Some(ticket.date);
                    state.attached = Some(record.clone());
                    PickOutcome::Applied(record)
                }
                Err(error) => {
                    let restored = state.confirmed;
                    state.selection = restored;
                    let message = format!("could not reserve {}: {error}", ticket.date);
                    state.notice = Some(message.clone());
                    warn!(date = %ticket.date, error = %error, "day resolution failed, selection reverted");
                    PickOutcome::Reverted {
                        restored,
                        error: message,
                    }
                }
            }
        };

        if let PickOutcome::Applied(record) = &outcome {
            info!(date = %record.date, day_id = %record.id, "day attached");
            // The day now exists server-side; make sure the loaded bucket has it.
            self.cache
                .patch_day(MonthKey::of(record.date), record.date, |_| {})?;
        }
        Ok(outcome)
    }

    pub async fn pick_and_resolve(&self, date: NaiveDate) -> Result<PickOutcome, CalendarError> {
        match self.pick(date)? {
            Some(ticket) => self.resolve(ticket).await,
            None => Ok(PickOutcome::Rejected),
        }
    }

    pub fn show_month(&self, month: MonthKey) -> Result<(), CalendarError> {
        let mut displayed = self.displayed.lock().map_err(CalendarError::lock)?;
        displayed.insert(month);
        Ok(())
    }

    pub fn hide_month(&self, month: MonthKey) -> Result<(), CalendarError> {
        let mut displayed = self.displayed.lock().map_err(CalendarError::lock)?;
        displayed.remove(&month);
        Ok(())
    }

    pub fn displayed_months(&self) -> Result<Vec<MonthKey>, CalendarError> {
        let displayed = self.displayed.lock().map_err(CalendarError::lock)?;
        Ok(displayed.iter().copied().collect())
    }

    pub fn subscribe(&self) -> DisplayedMonthUpdates {
        DisplayedMonthUpdates {
            receiver: self.cache.subscribe(),
            displayed: Arc::clone(&self.displayed),
        }
    }

    /// Cells for `month`, disabling dates that fail this picker's rule.
    pub fn month_cells(&self, month: MonthKey) -> Result<Vec<DayCell>, CalendarError> {
        let bucket = self.cache.get_month(month)?;
        let selection = self.selection()?;
        let purpose = self.purpose;
        Ok(month_cells(
            month,
            bucket.as_ref(),
            |fact| purpose.is_selectable(fact),
            |date| selection == Some(date),
        ))
    }
}

/// Clears an abandoned pending pick so the picker falls back to its confirmed
/// value.
struct ResolveGuard<'a> {
    state: &'a Mutex<PickerState>,
    ticket: Option<PickTicket>,
}

impl ResolveGuard<'_> {
    fn disarm(mut self) {
        self.ticket = None;
    }
}

impl Drop for ResolveGuard<'_> {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let is_current = state
            .pending
            .is_some_and(|pending| pending.generation == ticket.generation);
        if is_current {
            debug!(date = %ticket.date, "day resolution abandoned, selection reverted");
            state.pending = None;
            let confirmed = state.confirmed;
            state.selection = confirmed;
        }
    }
}
