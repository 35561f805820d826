//! Persistence collaborators. The engine only talks to [`AppointmentStore`];
//! the implementations here are an in-memory index and a WAL-backed store
//! layered on top of it.

mod durable;
mod memory;

pub use durable::WalStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Appointment, AppointmentId, ListQuery, Span, Status};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no appointment with id {0}")]
    Missing(AppointmentId),

    #[error("invalid record: {0}")]
    Invalid(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store unavailable: {0}")]
    Closed(&'static str),
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Persist a new appointment and return the id the store assigned.
    async fn create_appointment(&self, appointment: &Appointment) -> Result<AppointmentId, StoreError>;

    async fn get_appointment_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError>;

    /// Non-cancelled appointments on `resource` whose span intersects
    /// `window`, sorted ascending by start.
    async fn get_appointments_overlapping(
        &self,
        resource: &str,
        window: Span,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Replace a stored appointment. `appointment.id` must be set.
    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError>;

    async fn update_appointment_status(&self, id: AppointmentId, status: Status) -> Result<(), StoreError>;

    async fn delete_appointment(&self, id: AppointmentId) -> Result<(), StoreError>;

    async fn get_all_appointments(&self, query: &ListQuery) -> Result<Vec<Appointment>, StoreError>;

    /// Up to `limit` appointments whose recurrence rule is set.
    async fn get_recurring_appointments(&self, limit: usize) -> Result<Vec<Appointment>, StoreError>;
}
