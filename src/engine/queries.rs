use tracing::debug;

use crate::auth::{self, Action, Ownership};
use crate::limits::*;
use crate::model::*;

use super::recurrence::expand;
use super::{instrumented, AppointmentService, EngineError};

/// 0 means the default page size; anything above the cap is cut to it.
fn clamp_limit(limit: usize) -> usize {
    match limit {
        0 => DEFAULT_LIST_LIMIT,
        n => n.min(MAX_LIST_LIMIT),
    }
}

impl AppointmentService {
    /// One page of the appointments `user` may see.
    ///
    /// Non-admins are scoped to their own records whatever the query asks
    /// for; the rest of the filter applies on top.
    pub async fn get_all(&self, user: &User, query: ListQuery) -> Result<Vec<Appointment>, EngineError> {
        instrumented("get_all", self.get_all_inner(user, query)).await
    }

    async fn get_all_inner(&self, user: &User, mut query: ListQuery) -> Result<Vec<Appointment>, EngineError> {
        let scope = auth::list_scope(user)?;
        query.filter = scope.apply(query.filter);
        query.limit = clamp_limit(query.limit);

        let mut rows = self.store.get_all_appointments(&query).await?;
        if let Some(order) = query.sort {
            order.sort(&mut rows);
        }
        debug!("listed {} appointments for {}", rows.len(), user.id);
        Ok(rows)
    }

    /// A record is visible by id exactly when it would be visible in
    /// [`AppointmentService::get_all`].
    pub async fn get_by_id(&self, user: &User, id: AppointmentId) -> Result<Appointment, EngineError> {
        instrumented("get_by_id", self.get_by_id_inner(user, id)).await
    }

    async fn get_by_id_inner(&self, user: &User, id: AppointmentId) -> Result<Appointment, EngineError> {
        let stored = self.load(id).await?;
        auth::authorize(user, Action::Read, Ownership::from(&stored))?;
        Ok(stored)
    }

    /// Projected occurrences of up to `limit` recurring appointments,
    /// `limit` each, grouped by anchor in store order. Nothing is persisted.
    pub async fn get_future_occurrences(&self, limit: usize) -> Result<Vec<ProjectedOccurrence>, EngineError> {
        instrumented("get_future_occurrences", self.get_future_occurrences_inner(limit)).await
    }

    async fn get_future_occurrences_inner(&self, limit: usize) -> Result<Vec<ProjectedOccurrence>, EngineError> {
        let limit = limit.min(MAX_OCCURRENCE_LIMIT);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let anchors = self.store.get_recurring_appointments(limit).await?;
        let occurrences: Vec<ProjectedOccurrence> = anchors
            .iter()
            .flat_map(|anchor| expand(anchor, limit, self.config.unknown_rule))
            .collect();
        debug!(
            "projected {} occurrences from {} anchors",
            occurrences.len(),
            anchors.len()
        );
        Ok(occurrences)
    }
}
