use tracing::{debug, info, warn};

use crate::auth::{self, Action, Ownership};
use crate::model::*;

use super::conflict::{find_conflict, validate};
use super::slots::suggest_many;
use super::{instrumented, AppointmentService, EngineError};

/// Backfill a create payload. Fails only on a missing start.
fn normalize_new(draft: AppointmentDraft) -> Result<Appointment, EngineError> {
    let start = draft
        .start
        .ok_or_else(|| EngineError::Validation("start time is required".into()))?;
    Ok(Appointment {
        id: None,
        customer_name: draft.customer_name,
        start,
        duration_minutes: draft.duration_minutes,
        notes: draft.notes,
        recurrence: draft.recurrence.unwrap_or_default(),
        status: draft.status.unwrap_or_default(),
        resource: draft.resource,
        customer_id: draft.customer_id,
        provider_id: draft.provider_id,
    })
}

/// Overlay an update payload on the stored record. Empty strings, a zero
/// duration and `None` all mean "keep what is stored".
fn normalize_update(stored: &Appointment, draft: AppointmentDraft) -> Appointment {
    fn or_keep(new: String, old: &str) -> String {
        if new.is_empty() { old.to_string() } else { new }
    }
    Appointment {
        id: stored.id,
        customer_name: or_keep(draft.customer_name, &stored.customer_name),
        start: draft.start.unwrap_or(stored.start),
        duration_minutes: if draft.duration_minutes == 0 {
            stored.duration_minutes
        } else {
            draft.duration_minutes
        },
        notes: or_keep(draft.notes, &stored.notes),
        recurrence: draft.recurrence.unwrap_or_else(|| stored.recurrence.clone()),
        status: draft.status.unwrap_or(stored.status),
        resource: or_keep(draft.resource, &stored.resource),
        customer_id: draft.customer_id.or(stored.customer_id),
        provider_id: draft.provider_id.or(stored.provider_id),
    }
}

impl AppointmentService {
    /// Book a new appointment. Returns the id the store assigned.
    ///
    /// On a resource clash fails with [`EngineError::Conflict`] carrying the
    /// next free starts; nothing is persisted.
    pub async fn create(&self, user: &User, draft: AppointmentDraft) -> Result<AppointmentId, EngineError> {
        instrumented("create", self.create_inner(user, draft)).await
    }

    async fn create_inner(&self, user: &User, mut draft: AppointmentDraft) -> Result<AppointmentId, EngineError> {
        auth::claim_ownership(user, &mut draft);
        auth::authorize(user, Action::Create, Ownership::from(&draft))?;
        let mut appointment = normalize_new(draft)?;
        validate(&appointment)?;

        let guard = if appointment.resource.is_empty() {
            None
        } else {
            Some(self.lock_resource(&appointment.resource).await)
        };
        if guard.is_some() {
            self.check_free(&appointment).await?;
        }

        let id = self.store.create_appointment(&appointment).await?;
        drop(guard);

        appointment.id = Some(id);
        metrics::counter!(crate::observability::APPOINTMENTS_CREATED_TOTAL).increment(1);
        info!("created appointment {id} on {:?} at {}", appointment.resource, appointment.start);
        self.notify.send(&Event::AppointmentCreated { appointment });
        Ok(id)
    }

    /// Caller holds the resource lock.
    async fn check_free(&self, appointment: &Appointment) -> Result<(), EngineError> {
        let existing = self
            .store
            .get_appointments_overlapping(&appointment.resource, appointment.span())
            .await?;
        let Some(conflicting) = find_conflict(appointment, &existing) else {
            return Ok(());
        };
        let conflicting = conflicting.id.unwrap_or_else(ulid::Ulid::nil);

        // One extra duration past the window covers the tail of the last slot.
        let span = appointment.span();
        let reach = self
            .config
            .suggestion_window
            .max(span.duration())
            .checked_add(&span.duration())
            .unwrap_or(chrono::TimeDelta::MAX);
        let fetched = Span::new(
            span.start,
            span.start
                .checked_add_signed(reach)
                .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC),
        );
        let mut booked: Vec<Span> = self
            .store
            .get_appointments_overlapping(&appointment.resource, fetched)
            .await?
            .iter()
            .filter(|a| a.occupies_resource())
            .map(Appointment::span)
            .collect();
        booked.sort_by_key(|s| s.start);
        let suggested: Vec<_> = suggest_many(
            appointment.start,
            appointment.duration_minutes,
            &booked,
            self.config.suggestion_count,
        )
        .into_iter()
        .filter(|start| {
            Span::checked_from_minutes(*start, appointment.duration_minutes)
                .is_some_and(|slot| slot.end <= fetched.end)
        })
        .collect();
        if suggested.len() < self.config.suggestion_count {
            debug!(
                "only {} verified suggestions on {:?} before {}",
                suggested.len(),
                appointment.resource,
                fetched.end
            );
        }

        metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
        warn!(
            "conflict on {:?} at {} with {conflicting}",
            appointment.resource, appointment.start
        );
        Err(EngineError::Conflict {
            resource: appointment.resource.clone(),
            conflicting,
            suggested,
        })
    }

    /// Overwrite an appointment. Unset draft fields keep their stored values.
    /// Resource conflicts are not re-checked here.
    pub async fn update(&self, user: &User, id: AppointmentId, draft: AppointmentDraft) -> Result<(), EngineError> {
        instrumented("update", self.update_inner(user, id, draft)).await
    }

    async fn update_inner(&self, user: &User, id: AppointmentId, draft: AppointmentDraft) -> Result<(), EngineError> {
        let stored = self.load(id).await?;
        auth::authorize(user, Action::Update, Ownership::from(&stored))?;
        let appointment = normalize_update(&stored, draft);
        validate(&appointment)?;

        self.store.update_appointment(&appointment).await?;
        info!("updated appointment {id}");
        self.notify.send(&Event::AppointmentUpdated { appointment });
        Ok(())
    }

    pub async fn delete(&self, user: &User, id: AppointmentId) -> Result<(), EngineError> {
        instrumented("delete", self.delete_inner(user, id)).await
    }

    async fn delete_inner(&self, user: &User, id: AppointmentId) -> Result<(), EngineError> {
        let stored = self.load(id).await?;
        auth::authorize(user, Action::Delete, Ownership::from(&stored))?;

        self.store.delete_appointment(id).await?;
        info!("deleted appointment {id}");
        self.notify.send(&Event::AppointmentDeleted { id });
        Ok(())
    }

    /// Set a status by id. Performs no authorization; callers that act on
    /// behalf of a user should go through [`AppointmentService::mark_complete`].
    pub async fn update_status(&self, id: AppointmentId, status: Status) -> Result<(), EngineError> {
        instrumented("update_status", self.update_status_inner(id, status)).await
    }

    async fn update_status_inner(&self, id: AppointmentId, status: Status) -> Result<(), EngineError> {
        self.store.update_appointment_status(id, status).await?;
        info!("appointment {id} status set to {status}");
        self.notify.send(&Event::StatusChanged { id, status });
        Ok(())
    }

    /// Mark an appointment completed. Admins, or the assigned provider.
    pub async fn mark_complete(&self, user: &User, id: AppointmentId) -> Result<(), EngineError> {
        instrumented("mark_complete", self.mark_complete_inner(user, id)).await
    }

    async fn mark_complete_inner(&self, user: &User, id: AppointmentId) -> Result<(), EngineError> {
        let stored = self.load(id).await?;
        auth::authorize(user, Action::Complete, Ownership::from(&stored))?;

        let status = Status::Completed;
        self.store.update_appointment_status(id, status).await?;
        info!("appointment {id} completed by {}", user.id);
        self.notify.send(&Event::StatusChanged { id, status });
        Ok(())
    }

    pub(super) async fn load(&self, id: AppointmentId) -> Result<Appointment, EngineError> {
        let found = self.store.get_appointment_by_id(id).await?;
        if found.is_none() {
            debug!("appointment {id} not in store");
        }
        found.ok_or(EngineError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn stored() -> Appointment {
        Appointment {
            id: Some(Ulid::new()),
            customer_name: "John Doe".into(),
            start: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            duration_minutes: 60,
            notes: "bring forms".into(),
            recurrence: RecurrenceRule::Weekly,
            status: Status::Scheduled,
            resource: "RoomA".into(),
            customer_id: Some(Ulid::new()),
            provider_id: Some(Ulid::new()),
        }
    }

    #[test]
    fn new_defaults_rule_and_status() {
        let a = normalize_new(AppointmentDraft {
            customer_name: "John".into(),
            start: Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()),
            duration_minutes: 30,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(a.recurrence, RecurrenceRule::None);
        assert_eq!(a.status, Status::Scheduled);
        assert_eq!(a.id, None);
    }

    #[test]
    fn new_without_start_is_rejected() {
        let err = normalize_new(AppointmentDraft::default()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(m) if m == "start time is required"));
    }

    #[test]
    fn update_keeps_unset_fields() {
        let old = stored();
        let merged = normalize_update(
            &old,
            AppointmentDraft {
                duration_minutes: 90,
                ..Default::default()
            },
        );
        assert_eq!(merged.duration_minutes, 90);
        assert_eq!(merged.id, old.id);
        assert_eq!(merged.customer_name, old.customer_name);
        assert_eq!(merged.start, old.start);
        assert_eq!(merged.notes, old.notes);
        assert_eq!(merged.recurrence, old.recurrence);
        assert_eq!(merged.resource, old.resource);
        assert_eq!(merged.customer_id, old.customer_id);
    }
}
