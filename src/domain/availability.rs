use crate::domain::models::{DayCell, DayClass, DayFact, MonthBucket, MonthKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Availability Classifier ───────────────────────────────────────
//
// Blocking, plain event creation and tasting scheduling tolerate different
// conflicts. Keep the three predicates separate.

/// Derive the display class of a day.
///
/// Precedence: blocked > active event > tasting only > free. A day missing
/// from the cache is free.
pub fn classify(fact: Option<&DayFact>) -> DayClass {
    let Some(fact) = fact else {
        return DayClass::Free;
    };
    if fact.is_blocked {
        DayClass::Blocked
    } else if fact.has_active_event() {
        DayClass::ActiveEvent
    } else if fact.tastings_count > 0 {
        DayClass::TastingOnly
    } else {
        DayClass::Free
    }
}

/// Whether a day may join a bulk block/unblock selection.
///
/// Already-blocked days stay selectable so they can be unblocked. Cancelled
/// events never prevent blocking.
pub fn is_selectable_for_blocking(fact: Option<&DayFact>) -> bool {
    fact.is_none_or(|fact| !fact.has_active_event() && fact.tastings_count == 0)
}

/// Quick-create is offered only on fully free days: any event entry,
/// cancelled ones included, disables it.
pub fn is_selectable_for_event_creation(fact: Option<&DayFact>) -> bool {
    fact.is_none_or(|fact| !fact.is_blocked && fact.events.is_empty() && fact.tastings_count == 0)
}

/// Tastings may share a day with other tastings or cancelled events.
pub fn is_selectable_for_tasting_pick(fact: Option<&DayFact>) -> bool {
    fact.is_none_or(|fact| !fact.is_blocked && !fact.has_active_event())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PickPurpose {
    EventCreation,
    TastingPick,
}

impl PickPurpose {
    pub fn is_selectable(self, fact: Option<&DayFact>) -> bool {
        match self {
            Self::EventCreation => is_selectable_for_event_creation(fact),
            Self::TastingPick => is_selectable_for_tasting_pick(fact),
        }
    }
}

/// Paint every day of `month`. Days missing from `bucket` (or a month that
/// is not loaded yet) render as free.
pub fn month_cells<R, F>(
    month: MonthKey,
    bucket: Option<&MonthBucket>,
    selectable: R,
    is_selected: F,
) -> Vec<DayCell>
where
    R: Fn(Option<&DayFact>) -> bool,
    F: Fn(NaiveDate) -> bool,
{
    month
        .days()
        .map(|date| {
            let fact = bucket.and_then(|bucket| bucket.get(&date));
            DayCell {
                date,
                class: classify(fact),
                selectable: selectable(fact),
                selected: is_selected(date),
            }
        })
        .collect()
}
