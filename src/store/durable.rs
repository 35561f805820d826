use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::model::*;
use crate::wal::Wal;

use super::{AppointmentStore, InMemoryStore, StoreError};

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        response: oneshot::Sender<io::Result<usize>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
///
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One fsync for the whole batch.
/// 4. Apply the batch to the in-memory index in log order, then answer.
///
/// Memory is only ever mutated here, so its order matches the log's.
async fn wal_writer_loop(mut wal: Wal, memory: Arc<InMemoryStore>, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, &memory, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());

        for (event, tx) in batch {
            let reply = match &result {
                Ok(()) => {
                    memory.apply_event(&event);
                    Ok(())
                }
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(reply);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, &memory, cmd);
        }
    }
    debug!("WAL writer stopped");
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after a failed append so half-written bytes don't ride
    // along with the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, memory: &InMemoryStore, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { response } => {
            let events: Vec<Event> = memory
                .snapshot()
                .into_iter()
                .map(|appointment| Event::AppointmentCreated { appointment })
                .collect();
            let kept = events.len();
            let _ = response.send(wal.compact(&events).map(|()| kept));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => {}
    }
}

/// Durable store: an [`InMemoryStore`] rebuilt from, and kept in step with,
/// an append-only log.
///
/// Must be opened inside a tokio runtime; it spawns its writer task.
pub struct WalStore {
    memory: Arc<InMemoryStore>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl WalStore {
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let memory = Arc::new(InMemoryStore::new());
        for event in &events {
            memory.apply_event(event);
        }
        info!(
            "replayed {} events from {}, {} appointments live",
            events.len(),
            path.display(),
            memory.len()
        );

        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, memory.clone(), wal_rx));
        Ok(Self { memory, wal_tx })
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    async fn commit(&self, event: Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| StoreError::Closed("WAL writer shut down"))?;
        rx.await
            .map_err(|_| StoreError::Closed("WAL writer dropped response"))??;
        Ok(())
    }

    /// Rewrite the log to one create record per live appointment.
    /// Returns how many records were kept.
    pub async fn compact(&self) -> Result<usize, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { response: tx })
            .await
            .map_err(|_| StoreError::Closed("WAL writer shut down"))?;
        Ok(rx
            .await
            .map_err(|_| StoreError::Closed("WAL writer dropped response"))??)
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl AppointmentStore for WalStore {
    async fn create_appointment(&self, appointment: &Appointment) -> Result<AppointmentId, StoreError> {
        let (id, event) = self.memory.prepare_create(appointment);
        self.commit(event).await?;
        Ok(id)
    }

    async fn get_appointment_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        Ok(self.memory.find(&id))
    }

    async fn get_appointments_overlapping(
        &self,
        resource: &str,
        window: Span,
    ) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.memory.overlapping(resource, &window))
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let event = self.memory.prepare_update(appointment)?;
        self.commit(event).await
    }

    async fn update_appointment_status(&self, id: AppointmentId, status: Status) -> Result<(), StoreError> {
        let event = self.memory.prepare_status(id, status)?;
        self.commit(event).await
    }

    async fn delete_appointment(&self, id: AppointmentId) -> Result<(), StoreError> {
        let event = self.memory.prepare_delete(id)?;
        self.commit(event).await
    }

    async fn get_all_appointments(&self, query: &ListQuery) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.memory.list(query))
    }

    async fn get_recurring_appointments(&self, limit: usize) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.memory.recurring(limit))
    }
}
