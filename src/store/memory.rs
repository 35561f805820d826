use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;
use ulid::Ulid;

use crate::model::*;

use super::{AppointmentStore, StoreError};

/// A single booked interval on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    id: AppointmentId,
    span: Span,
}

/// Intervals on one resource, sorted by `span.start`.
#[derive(Debug, Default)]
struct ResourceIndex {
    intervals: Vec<Interval>,
}

impl ResourceIndex {
    fn insert(&mut self, interval: Interval) {
        let pos = self
            .intervals
            .binary_search_by_key(&interval.span.start, |i| i.span.start)
            .unwrap_or_else(|e| e);
        self.intervals.insert(pos, interval);
    }

    fn remove(&mut self, id: AppointmentId) -> Option<Interval> {
        let pos = self.intervals.iter().position(|i| i.id == id)?;
        Some(self.intervals.remove(pos))
    }

    /// Intervals whose span overlaps the query window.
    /// Binary search skips everything starting at or after `query.end`.
    fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Interval> {
        let right_bound = self
            .intervals
            .partition_point(|i| i.span.start < query.end);
        self.intervals[..right_bound]
            .iter()
            .filter(move |i| i.span.end > query.start)
    }
}

struct Record {
    /// Insertion sequence; the store's natural list order.
    seq: u64,
    appointment: Appointment,
}

pub struct InMemoryStore {
    records: DashMap<AppointmentId, Record>,
    by_resource: DashMap<String, ResourceIndex>,
    next_seq: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            by_resource: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every stored appointment in insertion order.
    pub fn snapshot(&self) -> Vec<Appointment> {
        let mut rows: Vec<(u64, Appointment)> = self
            .records
            .iter()
            .map(|e| (e.seq, e.appointment.clone()))
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, a)| a).collect()
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event to the index. Events referring to unknown ids are
    /// ignored so a replayed log with a stale tail can't poison the state.
    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::AppointmentCreated { appointment } => {
                let Some(id) = appointment.id else { return };
                self.index(id, appointment);
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                self.records.insert(
                    id,
                    Record {
                        seq,
                        appointment: appointment.clone(),
                    },
                );
            }
            Event::AppointmentUpdated { appointment } => {
                let Some(id) = appointment.id else { return };
                let Some(mut record) = self.records.get_mut(&id) else { return };
                self.unindex(id, &record.appointment.resource);
                self.index(id, appointment);
                record.appointment = appointment.clone();
            }
            Event::StatusChanged { id, status } => {
                if let Some(mut record) = self.records.get_mut(id) {
                    record.appointment.status = *status;
                }
            }
            Event::AppointmentDeleted { id } => {
                if let Some((_, record)) = self.records.remove(id) {
                    self.unindex(*id, &record.appointment.resource);
                }
            }
        }
    }

    fn index(&self, id: AppointmentId, appointment: &Appointment) {
        if appointment.resource.is_empty() {
            return;
        }
        let Some(span) = appointment.checked_span() else {
            warn!("appointment {id} ends past the representable range, not indexed");
            return;
        };
        self.by_resource
            .entry(appointment.resource.clone())
            .or_default()
            .insert(Interval { id, span });
    }

    fn unindex(&self, id: AppointmentId, resource: &str) {
        if resource.is_empty() {
            return;
        }
        if let Some(mut index) = self.by_resource.get_mut(resource) {
            index.remove(id);
        }
    }

    fn require(&self, id: &AppointmentId) -> Result<(), StoreError> {
        if self.records.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::Missing(*id))
        }
    }

    /// Build the event a mutation would produce, after checking it applies.
    /// Shared with the WAL store, which logs the event before applying it.
    pub(crate) fn prepare_create(&self, appointment: &Appointment) -> (AppointmentId, Event) {
        let id = Ulid::new();
        let mut stored = appointment.clone();
        stored.id = Some(id);
        (id, Event::AppointmentCreated { appointment: stored })
    }

    pub(crate) fn prepare_update(&self, appointment: &Appointment) -> Result<Event, StoreError> {
        let id = appointment.id.ok_or(StoreError::Invalid("update without id"))?;
        self.require(&id)?;
        Ok(Event::AppointmentUpdated {
            appointment: appointment.clone(),
        })
    }

    pub(crate) fn prepare_status(&self, id: AppointmentId, status: Status) -> Result<Event, StoreError> {
        self.require(&id)?;
        Ok(Event::StatusChanged { id, status })
    }

    pub(crate) fn prepare_delete(&self, id: AppointmentId) -> Result<Event, StoreError> {
        self.require(&id)?;
        Ok(Event::AppointmentDeleted { id })
    }

    // ── Queries (sync; the trait impl wraps these) ───────────

    pub(crate) fn find(&self, id: &AppointmentId) -> Option<Appointment> {
        self.records.get(id).map(|r| r.appointment.clone())
    }

    pub(crate) fn overlapping(&self, resource: &str, window: &Span) -> Vec<Appointment> {
        let Some(index) = self.by_resource.get(resource) else {
            return Vec::new();
        };
        let ids: Vec<AppointmentId> = index.overlapping(window).map(|i| i.id).collect();
        drop(index);

        let mut hits: Vec<Appointment> = ids
            .iter()
            .filter_map(|id| self.find(id))
            .filter(|a| a.status != Status::Cancelled)
            .collect();
        hits.sort_by_key(|a| a.start);
        hits
    }

    pub(crate) fn list(&self, query: &ListQuery) -> Vec<Appointment> {
        let mut rows: Vec<(u64, Appointment)> = self
            .records
            .iter()
            .filter(|r| query.filter.matches(&r.appointment))
            .map(|r| (r.seq, r.appointment.clone()))
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        let mut rows: Vec<Appointment> = rows.into_iter().map(|(_, a)| a).collect();
        if let Some(order) = query.sort {
            order.sort(&mut rows);
        }
        rows.into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect()
    }

    pub(crate) fn recurring(&self, limit: usize) -> Vec<Appointment> {
        self.snapshot()
            .into_iter()
            .filter(|a| a.recurrence.is_recurring())
            .take(limit)
            .collect()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn create_appointment(&self, appointment: &Appointment) -> Result<AppointmentId, StoreError> {
        let (id, event) = self.prepare_create(appointment);
        self.apply_event(&event);
        Ok(id)
    }

    async fn get_appointment_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        Ok(self.find(&id))
    }

    async fn get_appointments_overlapping(
        &self,
        resource: &str,
        window: Span,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.overlapping(resource, &window))
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let event = self.prepare_update(appointment)?;
        self.apply_event(&event);
        Ok(())
    }

    async fn update_appointment_status(&self, id: AppointmentId, status: Status) -> Result<(), StoreError> {
        let event = self.prepare_status(id, status)?;
        self.apply_event(&event);
        Ok(())
    }

    async fn delete_appointment(&self, id: AppointmentId) -> Result<(), StoreError> {
        let event = self.prepare_delete(id)?;
        self.apply_event(&event);
        Ok(())
    }

    async fn get_all_appointments(&self, query: &ListQuery) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.list(query))
    }

    async fn get_recurring_appointments(&self, limit: usize) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.recurring(limit))
    }
}
