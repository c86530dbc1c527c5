use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use shipyard_core::{NewPublishStatus, PublishError, PublishKind, PublishStatus};

use crate::persistence::{PublishStatusPersistence, PublishStatusTransaction};

#[derive(Clone, Debug, Default)]
struct StatusTable {
    rows: Vec<PublishStatus>,
    next_id: i64,
}

impl StatusTable {
    fn insert(&mut self, status: &NewPublishStatus) -> anyhow::Result<PublishStatus> {
        let duplicate = self.rows.iter().any(|row| {
            row.kind == status.kind
                && row.resource_id == status.resource_id
                && row.cluster == status.cluster
        });

        if duplicate {
            return Err(PublishError::LedgerConflict(format!(
                "{} {} already has a live row for cluster {}",
                status.kind, status.resource_id, status.cluster
            ))
            .into());
        }

        self.next_id += 1;

        let row = PublishStatus {
            id: self.next_id,
            kind: status.kind,
            resource_id: status.resource_id,
            template_id: status.template_id,
            cluster: status.cluster.clone(),
        };
        self.rows.push(row.clone());

        Ok(row)
    }
}

/// Ledger held in memory. A transaction locks the whole table and works on a copy that
/// replaces the table on commit.
#[derive(Clone, Debug, Default)]
pub struct PublishStatusMemoryPersistence {
    table: Arc<Mutex<StatusTable>>,
    fail_next_insert: Arc<AtomicBool>,
}

impl PublishStatusMemoryPersistence {
    /// Makes the next transactional insert fail, for exercising rollback paths.
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    /// Writes a row outside of any transaction, bypassing the uniqueness check.
    pub async fn force_insert(&self, status: &NewPublishStatus) -> PublishStatus {
        let mut table = self.table.lock().await;
        table.next_id += 1;

        let row = PublishStatus {
            id: table.next_id,
            kind: status.kind,
            resource_id: status.resource_id,
            template_id: status.template_id,
            cluster: status.cluster.clone(),
        };
        table.rows.push(row.clone());

        row
    }
}

struct MemoryStatusTransaction {
    guard: OwnedMutexGuard<StatusTable>,
    working: StatusTable,
    kind: PublishKind,
    resource_id: i64,
    fail_next_insert: Arc<AtomicBool>,
}

#[async_trait]
impl PublishStatusTransaction for MemoryStatusTransaction {
    async fn list(&mut self) -> anyhow::Result<Vec<PublishStatus>> {
        let (kind, resource_id) = (self.kind, self.resource_id);

        Ok(self
            .working
            .rows
            .iter()
            .filter(|row| row.kind == kind && row.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn insert(&mut self, status: &NewPublishStatus) -> anyhow::Result<PublishStatus> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(anyhow::anyhow!("injected insert failure"));
        }

        self.working.insert(status)
    }

    async fn delete(&mut self, id: i64) -> anyhow::Result<u64> {
        let before = self.working.rows.len();
        self.working.rows.retain(|row| row.id != id);

        Ok((before - self.working.rows.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let MemoryStatusTransaction {
            mut guard, working, ..
        } = *self;

        *guard = working;

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl PublishStatusPersistence for PublishStatusMemoryPersistence {
    async fn begin(
        &self,
        kind: PublishKind,
        resource_id: i64,
    ) -> anyhow::Result<Box<dyn PublishStatusTransaction>> {
        let guard = Arc::clone(&self.table).lock_owned().await;
        let working = guard.clone();

        Ok(Box::new(MemoryStatusTransaction {
            guard,
            working,
            kind,
            resource_id,
            fail_next_insert: Arc::clone(&self.fail_next_insert),
        }))
    }

    async fn get_by_resource(
        &self,
        kind: PublishKind,
        resource_id: i64,
    ) -> anyhow::Result<Vec<PublishStatus>> {
        let table = self.table.lock().await;

        Ok(table
            .rows
            .iter()
            .filter(|row| row.kind == kind && row.resource_id == resource_id)
            .cloned()
            .collect())
    }
}
