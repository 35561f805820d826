use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use appointd::engine::{expand, overlaps, suggest, suggest_many, UnknownRulePolicy};
use appointd::model::*;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn minute(offset: u32) -> DateTime<Utc> {
    base() + Duration::minutes(i64::from(offset))
}

prop_compose! {
    fn arb_booking()(offset in 0u32..10_000, minutes in 1u32..240) -> Span {
        Span::from_minutes(minute(offset), minutes)
    }
}

proptest! {
    #[test]
    fn overlap_is_symmetric(a in 0u32..5_000, da in 1u32..500, b in 0u32..5_000, db in 1u32..500) {
        prop_assert_eq!(
            overlaps(minute(a), da, minute(b), db),
            overlaps(minute(b), db, minute(a), da)
        );
    }

    #[test]
    fn touching_never_overlaps(a in 0u32..5_000, da in 1u32..500, db in 1u32..500) {
        prop_assert!(!overlaps(minute(a), da, minute(a + da), db));
        prop_assert!(!overlaps(minute(a + da), db, minute(a), da));
    }

    #[test]
    fn suggestion_never_overlaps_bookings(
        mut bookings in prop::collection::vec(arb_booking(), 0..30),
        desired in 0u32..10_000,
        minutes in 1u32..240,
    ) {
        bookings.sort_by_key(|s| s.start);
        let start = suggest(minute(desired), minutes, &bookings);
        prop_assert!(start >= minute(desired));
        let slot = Span::from_minutes(start, minutes);
        for b in &bookings {
            prop_assert!(!slot.overlaps(b), "slot {:?} overlaps {:?}", slot, b);
        }
    }

    #[test]
    fn many_suggestions_are_free_and_disjoint(
        bookings in prop::collection::vec(arb_booking(), 0..20),
        desired in 0u32..10_000,
        minutes in 1u32..240,
        count in 1usize..5,
    ) {
        let starts = suggest_many(minute(desired), minutes, &bookings, count);
        prop_assert_eq!(starts.len(), count);
        let slots: Vec<Span> = starts.iter().map(|s| Span::from_minutes(*s, minutes)).collect();
        for pair in slots.windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
        }
        for slot in &slots {
            prop_assert!(bookings.iter().all(|b| !slot.overlaps(b)));
        }
    }

    #[test]
    fn expansion_has_limit_entries_one_period_apart(
        rule_idx in 0usize..2,
        offset in 0u32..100_000,
        limit in 1usize..50,
    ) {
        let (rule, period) = [
            (RecurrenceRule::Daily, Duration::days(1)),
            (RecurrenceRule::Weekly, Duration::weeks(1)),
        ][rule_idx].clone();
        let anchor = Appointment {
            id: None,
            customer_name: "Prop".into(),
            start: minute(offset),
            duration_minutes: 30,
            notes: String::new(),
            recurrence: rule,
            status: Status::Scheduled,
            resource: "RoomA".into(),
            customer_id: None,
            provider_id: None,
        };
        let got = expand(&anchor, limit, UnknownRulePolicy::default());
        prop_assert_eq!(got.len(), limit);
        prop_assert_eq!(got[0].start, anchor.start + period);
        for pair in got.windows(2) {
            prop_assert_eq!(pair[1].start - pair[0].start, period);
        }
    }

    #[test]
    fn monthly_expansion_advances_each_step(day in 1u32..=31, limit in 1usize..24) {
        let start = Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap();
        let anchor = Appointment {
            id: None,
            customer_name: "Prop".into(),
            start,
            duration_minutes: 30,
            notes: String::new(),
            recurrence: RecurrenceRule::Monthly,
            status: Status::Scheduled,
            resource: String::new(),
            customer_id: None,
            provider_id: None,
        };
        let got = expand(&anchor, limit, UnknownRulePolicy::default());
        prop_assert_eq!(got.len(), limit);
        let mut prev = start;
        for o in &got {
            prop_assert!(o.start > prev);
            prop_assert!(o.start - prev <= Duration::days(31));
            prev = o.start;
        }
    }
}
