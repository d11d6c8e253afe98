//! Pure queue arithmetic: ticket numbering, base times, call-time
//! estimates, and the scope recalculation plan. Everything here works on
//! immutable snapshots of a scope's ordered waiting rows; persistence is
//! the orchestration layer's job.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::models::Queue;

/// Identity of a delay-sharing group: one doctor session, or one
/// service's walk-in pool, always together with the queue date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueScope {
    Session(Uuid),
    WalkIn(Uuid),
}

impl QueueScope {
    pub fn of(queue: &Queue) -> Self {
        match queue.doctor_schedule_id {
            Some(schedule_id) => QueueScope::Session(schedule_id),
            None => QueueScope::WalkIn(queue.service_id),
        }
    }
}

/// Widest zero-pad whose sequence ceiling still fits an i64.
const MAX_TICKET_PADDING: u32 = 18;

/// Next ticket number in a scope. The sequence wraps back to 1 once it
/// would no longer fit the zero-padded width.
pub fn next_ticket_number(prefix: &str, padding: u32, last_sequence: Option<i64>) -> String {
    let padding = padding.min(MAX_TICKET_PADDING);
    let max = 10_i64.pow(padding) - 1;
    let mut sequence = last_sequence.unwrap_or(0) + 1;
    if sequence > max {
        sequence = 1;
    }
    format!("{}{:0width$}", prefix, sequence, width = padding as usize)
}

/// Recovers the numeric sequence from a stored ticket number.
pub fn ticket_sequence(number: &str, prefix: &str) -> Option<i64> {
    number.strip_prefix(prefix)?.parse().ok()
}

/// Base instant estimates in a scope are measured from.
///
/// Sessions start counting at the session start, but never in the past
/// when the date is today. Walk-ins count from now today, and from the
/// configured day start on future dates.
pub fn scope_base_time(
    date: NaiveDate,
    session_start: Option<NaiveTime>,
    walk_in_day_start: NaiveTime,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match session_start {
        Some(start) => {
            let start_at = date.and_time(start).and_utc();
            if date == now.date_naive() {
                start_at.max(now)
            } else {
                start_at
            }
        }
        None => {
            if date == now.date_naive() {
                now
            } else {
                date.and_time(walk_in_day_start).and_utc()
            }
        }
    }
}

/// Call-time estimate for the 1-based position in a scope.
pub fn estimate_for_position(
    base: DateTime<Utc>,
    position: usize,
    extra_delay_minutes: i64,
    slot_minutes: i64,
) -> DateTime<Utc> {
    base + Duration::minutes(position as i64 * slot_minutes + extra_delay_minutes)
}

/// The delay currently shared by a scope's waiting rows.
pub fn scope_delay(waiting: &[Queue]) -> i64 {
    waiting.iter().map(|q| q.extra_delay_minutes).max().unwrap_or(0)
}

/// One row's rewrite produced by a scope recalculation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecalcUpdate {
    pub id: i64,
    pub estimated_call_time: DateTime<Utc>,
    pub extra_delay_minutes: i64,
}

/// Re-walks a scope's waiting rows (already ordered by creation) and
/// produces the estimate and delay every row should carry.
pub fn recalculate(
    waiting: &[Queue],
    base: DateTime<Utc>,
    extra_delay_minutes: i64,
    slot_minutes: i64,
) -> Vec<RecalcUpdate> {
    waiting
        .iter()
        .enumerate()
        .map(|(index, queue)| RecalcUpdate {
            id: queue.id,
            estimated_call_time: estimate_for_position(
                base,
                index + 1,
                extra_delay_minutes,
                slot_minutes,
            ),
            extra_delay_minutes,
        })
        .collect()
}

/// 1-based position of a row among its ordered waiting siblings.
pub fn position_of(waiting: &[Queue], id: i64) -> Option<usize> {
    waiting.iter().position(|q| q.id == id).map(|i| i + 1)
}

/// Minutes until an estimate, clamped at zero once it has passed.
pub fn remaining_minutes(estimate: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (estimate - now).num_minutes().max(0)
}
