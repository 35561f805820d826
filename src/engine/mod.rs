mod conflict;
mod error;
mod mutations;
mod queries;
mod recurrence;
mod slots;

pub use conflict::overlaps;
pub use error::{EngineError, ErrorKind};
pub use recurrence::{expand, UnknownRulePolicy};
pub use slots::{suggest, suggest_many};

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};

use crate::model::Event;
use crate::notify::NotifyHub;
use crate::store::AppointmentStore;

/// Tunables for the scheduling engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingConfig {
    /// How far past the requested start to look for alternatives on conflict.
    pub suggestion_window: Duration,
    /// Alternatives carried by a conflict error. At least one.
    pub suggestion_count: usize,
    pub unknown_rule: UnknownRulePolicy,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            suggestion_window: Duration::days(7),
            suggestion_count: 3,
            unknown_rule: UnknownRulePolicy::default(),
        }
    }
}

/// Authorization, conflict detection and recurrence around an
/// [`AppointmentStore`].
///
/// Check-and-insert on a resource runs under that resource's mutex, so
/// concurrent creates on one resource are serialized while different
/// resources proceed in parallel.
pub struct AppointmentService {
    store: Arc<dyn AppointmentStore>,
    notify: Arc<NotifyHub>,
    resource_locks: DashMap<String, Arc<Mutex<()>>>,
    config: SchedulingConfig,
}

impl AppointmentService {
    pub fn new(store: Arc<dyn AppointmentStore>, notify: Arc<NotifyHub>) -> Self {
        Self::with_config(store, notify, SchedulingConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn AppointmentStore>,
        notify: Arc<NotifyHub>,
        mut config: SchedulingConfig,
    ) -> Self {
        config.suggestion_count = config.suggestion_count.clamp(1, crate::limits::MAX_SUGGESTIONS);
        Self {
            store,
            notify,
            resource_locks: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    /// Every event this service publishes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.notify.subscribe()
    }

    /// Hold the resource's mutex until the guard drops.
    async fn lock_resource(&self, resource: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .resource_locks
            .entry(resource.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

/// Count and time one service operation, labelled by outcome.
async fn instrumented<T>(
    op: &'static str,
    fut: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    let started = Instant::now();
    let result = fut.await;
    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    metrics::counter!(crate::observability::OPERATIONS_TOTAL, "op" => op, "status" => status)
        .increment(1);
    metrics::histogram!(crate::observability::OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    result
}
