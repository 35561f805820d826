use chrono::{DateTime, Utc};

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Whether two bookings on the same resource collide.
///
/// Each booking is `[start, start + duration)`. Touching intervals
/// (`a_end == b_start`) do not conflict.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_duration_minutes: u32,
    b_start: DateTime<Utc>,
    b_duration_minutes: u32,
) -> bool {
    Span::from_minutes(a_start, a_duration_minutes)
        .overlaps(&Span::from_minutes(b_start, b_duration_minutes))
}

/// First existing booking that collides with `candidate`, if any.
pub(crate) fn find_conflict<'a>(
    candidate: &Appointment,
    existing: &'a [Appointment],
) -> Option<&'a Appointment> {
    existing
        .iter()
        .filter(|e| e.id.is_none() || e.id != candidate.id)
        .find(|e| candidate.conflicts_with(e))
}

/// Field invariants every persisted appointment satisfies.
pub(crate) fn validate(a: &Appointment) -> Result<(), EngineError> {
    if a.customer_name.trim().is_empty() {
        return Err(EngineError::Validation("customer name is required".into()));
    }
    if a.customer_name.len() > MAX_CUSTOMER_NAME_LEN {
        return Err(EngineError::Validation("customer name too long".into()));
    }
    if a.duration_minutes == 0 {
        return Err(EngineError::Validation("duration must be positive".into()));
    }
    if a.duration_minutes > MAX_DURATION_MINUTES {
        return Err(EngineError::Validation("duration too long".into()));
    }
    if a.notes.len() > MAX_NOTES_LEN {
        return Err(EngineError::Validation("notes too long".into()));
    }
    if a.resource.len() > MAX_RESOURCE_LEN {
        return Err(EngineError::Validation("resource identifier too long".into()));
    }
    if a.start.timestamp() == 0 {
        return Err(EngineError::Validation("start time is required".into()));
    }
    if a.checked_span().is_none() {
        return Err(EngineError::Validation("start time out of range".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    fn valid() -> Appointment {
        Appointment {
            id: None,
            customer_name: "John Doe".into(),
            start: at(10, 0),
            duration_minutes: 60,
            notes: String::new(),
            recurrence: RecurrenceRule::None,
            status: Status::Scheduled,
            resource: "RoomA".into(),
            customer_id: None,
            provider_id: None,
        }
    }

    #[test]
    fn overlap_cases() {
        assert!(overlaps(at(10, 0), 60, at(10, 30), 30));
        assert!(overlaps(at(10, 0), 60, at(9, 0), 120)); // containment
        assert!(!overlaps(at(10, 0), 60, at(11, 0), 30)); // touching
        assert!(!overlaps(at(11, 0), 30, at(10, 0), 60)); // touching, reversed
        assert!(!overlaps(at(8, 0), 30, at(10, 0), 60));
    }

    #[test]
    fn find_conflict_skips_self_and_other_resources() {
        let mut mine = valid();
        mine.id = Some(Ulid::new());

        let mut other_room = valid();
        other_room.id = Some(Ulid::new());
        other_room.resource = "RoomB".into();

        assert!(find_conflict(&mine, &[mine.clone(), other_room.clone()]).is_none());

        let mut clash = valid();
        clash.id = Some(Ulid::new());
        clash.start = at(10, 45);
        let existing = [other_room, clash.clone()];
        assert_eq!(find_conflict(&mine, &existing), Some(&clash));
    }

    #[test]
    fn validate_accepts_valid() {
        assert!(validate(&valid()).is_ok());
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let cases: Vec<(&str, Box<dyn Fn(&mut Appointment)>)> = vec![
            ("customer name is required", Box::new(|a: &mut Appointment| a.customer_name = "  ".into())),
            ("duration must be positive", Box::new(|a: &mut Appointment| a.duration_minutes = 0)),
            ("duration too long", Box::new(|a: &mut Appointment| a.duration_minutes = MAX_DURATION_MINUTES + 1)),
            ("notes too long", Box::new(|a: &mut Appointment| a.notes = "x".repeat(MAX_NOTES_LEN + 1))),
            ("resource identifier too long", Box::new(|a: &mut Appointment| a.resource = "r".repeat(MAX_RESOURCE_LEN + 1))),
            ("start time is required", Box::new(|a: &mut Appointment| a.start = DateTime::<Utc>::UNIX_EPOCH)),
            (
                "start time out of range",
                Box::new(|a: &mut Appointment| a.start = DateTime::<Utc>::MAX_UTC - chrono::Duration::minutes(30)),
            ),
        ];
        for (msg, mutate) in cases {
            let mut a = valid();
            mutate(&mut a);
            match validate(&a) {
                Err(EngineError::Validation(m)) => assert_eq!(m, msg),
                other => panic!("expected validation error {msg:?}, got {other:?}"),
            }
        }
    }
}
