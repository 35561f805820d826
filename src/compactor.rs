use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::WalStore;

const TICK: Duration = Duration::from_secs(5);

/// Compact once appends since the last compaction reach `threshold`.
/// Returns the number of records kept, or `None` if nothing was done.
pub async fn compact_if_due(store: &WalStore, threshold: u64) -> Option<usize> {
    let appends = store.appends_since_compact().await;
    metrics::gauge!(crate::observability::APPOINTMENTS_LIVE).set(store.len() as f64);
    if appends < threshold.max(1) {
        return None;
    }
    match store.compact().await {
        Ok(kept) => {
            metrics::counter!(crate::observability::COMPACTIONS_TOTAL).increment(1);
            info!("compacted WAL: {appends} appends folded into {kept} records");
            Some(kept)
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            None
        }
    }
}

/// Background task that keeps the log from growing without bound.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(TICK);
    loop {
        interval.tick().await;
        if compact_if_due(&store, threshold).await.is_none() {
            debug!("compactor idle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::store::AppointmentStore;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("appointd_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn appt(h: u32) -> Appointment {
        Appointment {
            id: None,
            customer_name: "Alice".into(),
            start: Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap(),
            duration_minutes: 30,
            notes: String::new(),
            recurrence: RecurrenceRule::None,
            status: Status::Scheduled,
            resource: "RoomA".into(),
            customer_id: None,
            provider_id: None,
        }
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let store = WalStore::open(&path).unwrap();

        let first = store.create_appointment(&appt(9)).await.unwrap();
        store.create_appointment(&appt(10)).await.unwrap();
        assert_eq!(compact_if_due(&store, 3).await, None);

        store.delete_appointment(first).await.unwrap();
        assert_eq!(compact_if_due(&store, 3).await, Some(1));
        assert_eq!(store.appends_since_compact().await, 0);
        assert_eq!(compact_if_due(&store, 3).await, None);
    }
}
