use chrono::{DateTime, Utc};

use crate::model::Span;

/// Earliest start at or after `desired_start` where a booking of
/// `duration_minutes` fits between `bookings`.
///
/// `bookings` must be sorted by start. The candidate only ever moves
/// forward, so the result never overlaps any supplied booking.
pub fn suggest(desired_start: DateTime<Utc>, duration_minutes: u32, bookings: &[Span]) -> DateTime<Utc> {
    let mut candidate = Span::from_minutes(desired_start, duration_minutes);
    for booked in bookings {
        if candidate.end <= booked.start {
            return candidate.start;
        }
        if candidate.start < booked.end {
            candidate = Span::from_minutes(booked.end, duration_minutes);
        }
    }
    candidate.start
}

/// Up to `count` successive free starts. Each search begins where the
/// previous suggestion ends, so suggestions never overlap one another.
pub fn suggest_many(
    desired_start: DateTime<Utc>,
    duration_minutes: u32,
    bookings: &[Span],
    count: usize,
) -> Vec<DateTime<Utc>> {
    let mut sorted = bookings.to_vec();
    sorted.sort_by_key(|s| s.start);

    let mut out = Vec::with_capacity(count);
    let mut from = desired_start;
    for _ in 0..count {
        let start = suggest(from, duration_minutes, &sorted);
        out.push(start);
        from = Span::from_minutes(start, duration_minutes).end;
    }
    out
}
