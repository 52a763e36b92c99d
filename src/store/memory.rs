//! In-process resource store
//!
//! Stands in for the remote document store: applies conditional writes under
//! a single lock and pushes every new snapshot to subscribers.

use std::{
    collections::HashSet,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info};

use super::{ClearOutcome, ResourceStore, StoreResult, WriteOutcome};
use crate::{
    error::StoreError,
    state::{MachineKind, Resource, ResourceId, ResourceState},
};

#[derive(Debug)]
pub struct InMemoryStore {
    records: Mutex<Vec<Resource>>,
    changes_tx: watch::Sender<Vec<Resource>>,
    available: AtomicBool,
}

impl InMemoryStore {
    pub fn new(resources: Vec<Resource>) -> Self {
        let (changes_tx, _) = watch::channel(resources.clone());
        Self {
            records: Mutex::new(resources),
            changes_tx,
            available: AtomicBool::new(true),
        }
    }

    /// Load machine records from a JSON array
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read machine list {}", path.display()))?;
        let resources: Vec<Resource> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse machine list {}", path.display()))?;

        let mut seen = HashSet::new();
        for resource in &resources {
            if !seen.insert(resource.id.clone()) {
                bail!("Duplicate machine id in {}: {}", path.display(), resource.id);
            }
        }

        info!("Loaded {} machines from {}", resources.len(), path.display());
        Ok(Self::new(resources))
    }

    /// A small laundry room used when no machine list is given
    pub fn with_default_machines() -> Self {
        Self::new(vec![
            Resource::new("W1", MachineKind::Washer, 1, "Level 1 Laundry Room"),
            Resource::new("W2", MachineKind::Washer, 2, "Level 1 Laundry Room"),
            Resource::new("W3", MachineKind::Washer, 3, "Level 3 Laundry Room"),
            Resource::new("D1", MachineKind::Dryer, 1, "Level 1 Laundry Room"),
            Resource::new("D2", MachineKind::Dryer, 2, "Level 3 Laundry Room"),
        ])
    }

    /// Simulate the remote store going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Current record for one machine, bypassing availability checks
    pub fn get(&self, resource_id: &ResourceId) -> Option<Resource> {
        self.lock().iter().find(|r| &r.id == resource_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Resource>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("in-memory store is offline"))
        }
    }

    fn publish(&self, records: &[Resource]) {
        self.changes_tx.send_replace(records.to_vec());
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn list_resources(&self) -> StoreResult<Vec<Resource>> {
        self.ensure_available()?;
        Ok(self.lock().clone())
    }

    fn subscribe(&self) -> Option<watch::Receiver<Vec<Resource>>> {
        Some(self.changes_tx.subscribe())
    }

    async fn write_reservation(
        &self,
        resource_id: &ResourceId,
        reservation_end: DateTime<Utc>,
        available_as_of: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome> {
        self.ensure_available()?;

        let mut records = self.lock();
        let Some(record) = records.iter_mut().find(|r| &r.id == resource_id) else {
            return Ok(WriteOutcome::NotFound);
        };

        if !record.is_available(available_as_of) {
            debug!("Rejecting reservation write for {}: still reserved", resource_id);
            return Ok(WriteOutcome::Conflict);
        }

        record.state = ResourceState::Reserved;
        record.reservation_end = Some(reservation_end);
        self.publish(&records);
        Ok(WriteOutcome::Written)
    }

    async fn clear_reservation(
        &self,
        resource_id: &ResourceId,
        expected_end: Option<DateTime<Utc>>,
    ) -> StoreResult<ClearOutcome> {
        self.ensure_available()?;

        let mut records = self.lock();
        let Some(record) = records.iter_mut().find(|r| &r.id == resource_id) else {
            return Ok(ClearOutcome::NotFound);
        };

        if let Some(expected) = expected_end {
            if record.reservation_end != Some(expected) {
                debug!("Leaving {} alone: reservation has changed hands", resource_id);
                return Ok(ClearOutcome::Superseded);
            }
        }

        if record.state == ResourceState::Available && record.reservation_end.is_none() {
            return Ok(ClearOutcome::Cleared);
        }

        record.state = ResourceState::Available;
        record.reservation_end = None;
        self.publish(&records);
        Ok(ClearOutcome::Cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::io::Write;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_conditional_write_rejects_reserved_machine() {
        let store = InMemoryStore::with_default_machines();
        let id = ResourceId::new("W1");

        let first = store
            .write_reservation(&id, t0() + Duration::minutes(30), t0())
            .await
            .unwrap();
        let second = store
            .write_reservation(&id, t0() + Duration::minutes(45), t0())
            .await
            .unwrap();

        assert_eq!(first, WriteOutcome::Written);
        assert_eq!(second, WriteOutcome::Conflict);
        assert_eq!(store.get(&id).unwrap().reservation_end, Some(t0() + Duration::minutes(30)));
    }

    #[tokio::test]
    async fn test_expired_record_can_be_rewritten() {
        let store = InMemoryStore::new(vec![
            Resource::new("W1", MachineKind::Washer, 1, "A").reserved_until(t0()),
        ]);
        let id = ResourceId::new("W1");

        let outcome = store
            .write_reservation(&id, t0() + Duration::minutes(30), t0())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
    }

    #[tokio::test]
    async fn test_unknown_machine() {
        let store = InMemoryStore::with_default_machines();
        let id = ResourceId::new("nope");

        assert_eq!(
            store.write_reservation(&id, t0(), t0()).await.unwrap(),
            WriteOutcome::NotFound
        );
        assert_eq!(store.clear_reservation(&id, None).await.unwrap(), ClearOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_conditional_clear_only_matches_expected_end() {
        let store = InMemoryStore::with_default_machines();
        let id = ResourceId::new("W2");
        let end = t0() + Duration::minutes(45);
        store.write_reservation(&id, end, t0()).await.unwrap();

        let stale = store
            .clear_reservation(&id, Some(t0() + Duration::minutes(30)))
            .await
            .unwrap();
        assert_eq!(stale, ClearOutcome::Superseded);
        assert_eq!(store.get(&id).unwrap().reservation_end, Some(end));

        assert_eq!(store.clear_reservation(&id, Some(end)).await.unwrap(), ClearOutcome::Cleared);
        assert_eq!(store.get(&id).unwrap().state, ResourceState::Available);
    }

    #[tokio::test]
    async fn test_subscribers_see_writes() {
        let store = InMemoryStore::with_default_machines();
        let mut rx = store.subscribe().unwrap();
        let id = ResourceId::new("D1");

        store
            .write_reservation(&id, t0() + Duration::minutes(60), t0())
            .await
            .unwrap();

        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        let d1 = snapshot.iter().find(|r| r.id == id).unwrap();
        assert_eq!(d1.state, ResourceState::Reserved);
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_call() {
        let store = InMemoryStore::with_default_machines();
        store.set_available(false);

        assert!(store.list_resources().await.is_err());
        assert!(store.clear_reservation(&ResourceId::new("W1"), None).await.is_err());

        store.set_available(true);
        assert_eq!(store.list_resources().await.unwrap().len(), 5);
    }

    #[test]
    fn test_seed_file_rejects_duplicate_ids() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":"W1","kind":"washer","location":"A"}},{{"id":"W1","kind":"dryer","location":"B"}}]"#
        )
        .unwrap();

        let err = InMemoryStore::from_json_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate machine id"));
    }

    #[test]
    fn test_seed_file_loads_machines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":"W9","kind":"washer","number":9,"location":"Hall 9"}}]"#
        )
        .unwrap();

        let store = InMemoryStore::from_json_file(file.path()).unwrap();
        let w9 = store.get(&ResourceId::new("W9")).unwrap();
        assert_eq!(w9.number, 9);
        assert_eq!(w9.location, "Hall 9");
    }
}
