use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};

use crate::model::{Appointment, ProjectedOccurrence, RecurrenceRule};

/// What to project for an anchor whose rule text isn't one we know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownRulePolicy {
    /// `limit` occurrences, all at the anchor's own start.
    #[default]
    RepeatAnchor,
    /// No occurrences.
    Skip,
}

impl FromStr for UnknownRulePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "repeat" | "repeat_anchor" => Ok(UnknownRulePolicy::RepeatAnchor),
            "skip" => Ok(UnknownRulePolicy::Skip),
            other => Err(format!("unknown recurrence policy {other:?}")),
        }
    }
}

fn advance(rule: &RecurrenceRule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match rule {
        RecurrenceRule::Daily => from.checked_add_signed(Duration::days(1)),
        RecurrenceRule::Weekly => from.checked_add_signed(Duration::weeks(1)),
        // chrono clamps to the last day of a shorter month.
        RecurrenceRule::Monthly => from.checked_add_months(Months::new(1)),
        RecurrenceRule::None | RecurrenceRule::Unrecognized(_) => None,
    }
}

fn project(anchor: &Appointment, start: DateTime<Utc>) -> ProjectedOccurrence {
    ProjectedOccurrence {
        anchor_id: anchor.id,
        customer_name: anchor.customer_name.clone(),
        start,
        duration_minutes: anchor.duration_minutes,
        notes: anchor.notes.clone(),
        recurrence: anchor.recurrence.clone(),
        resource: anchor.resource.clone(),
        customer_id: anchor.customer_id,
        provider_id: anchor.provider_id,
    }
}

/// Project the next `limit` occurrences of `anchor`, the first one period
/// after the anchor's start. Stops early only if a date overflows.
pub fn expand(anchor: &Appointment, limit: usize, policy: UnknownRulePolicy) -> Vec<ProjectedOccurrence> {
    if limit == 0 {
        return Vec::new();
    }
    match (&anchor.recurrence, policy) {
        (RecurrenceRule::None, _) => Vec::new(),
        (RecurrenceRule::Unrecognized(_), UnknownRulePolicy::Skip) => Vec::new(),
        (RecurrenceRule::Unrecognized(_), UnknownRulePolicy::RepeatAnchor) => {
            (0..limit).map(|_| project(anchor, anchor.start)).collect()
        }
        (rule, _) => {
            let mut out = Vec::with_capacity(limit);
            let mut current = anchor.start;
            while out.len() < limit {
                let Some(next) = advance(rule, current) else { break };
                out.push(project(anchor, next));
                current = next;
            }
            out
        }
    }
}
