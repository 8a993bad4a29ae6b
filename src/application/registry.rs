use crate::domain::blocks::{reconcile_blocks, BlockReconciliation, ScheduleBlock, ScheduleBlockKey};
use crate::domain::models::ScheduleResult;
use crate::infrastructure::booking_calendar::{BookingCalendar, BookingRequest};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::schedule_block_store::ScheduleBlockRepository;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
type KeyLock = Arc<AsyncMutex<()>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Registered(String),
    Unregistered,
}

/// Maps accepted placements to external bookings.
///
/// Operations on the same key are serialized by a per-key async lock, and a
/// failed external call never leaves a partial entry behind.
pub struct ScheduleBlockRegistry<C, R>
where
    C: BookingCalendar,
    R: ScheduleBlockRepository,
{
    calendar: Arc<C>,
    repository: Arc<R>,
    key_locks: Mutex<HashMap<ScheduleBlockKey, KeyLock>>,
    now_provider: NowProvider,
}

impl<C, R> ScheduleBlockRegistry<C, R>
where
    C: BookingCalendar,
    R: ScheduleBlockRepository,
{
    pub fn new(calendar: Arc<C>, repository: Arc<R>) -> Self {
        Self {
            calendar,
            repository,
            key_locks: Mutex::new(HashMap::new()),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn is_registered(&self, key: &ScheduleBlockKey) -> Result<bool, InfraError> {
        Ok(self.repository.get(key)?.is_some())
    }

    pub fn booking_id(&self, key: &ScheduleBlockKey) -> Result<Option<String>, InfraError> {
        Ok(self
            .repository
            .get(key)?
            .map(|block| block.external_booking_id))
    }

    /// Creates the external booking and records it. Fails with `Conflict`
    /// when the key is already registered.
    pub async fn register(&self, request: &BookingRequest) -> Result<String, InfraError> {
        request.validate()?;
        let key = request.key();
        let lock = self.key_lock(&key)?;
        let outcome = {
            let _guard = lock.lock().await;
            self.register_locked(&key, request).await
        };
        self.release_key_lock(&key, &lock);
        outcome
    }

    /// Removes the entry, then deletes the external booking. The entry is
    /// restored when the delete fails. Fails with `NotFound` when the key is
    /// not registered.
    pub async fn unregister(&self, key: &ScheduleBlockKey) -> Result<(), InfraError> {
        let lock = self.key_lock(key)?;
        let outcome = {
            let _guard = lock.lock().await;
            self.unregister_locked(key).await
        };
        self.release_key_lock(key, &lock);
        outcome
    }

    pub async fn toggle(&self, request: &BookingRequest) -> Result<ToggleOutcome, InfraError> {
        request.validate()?;
        let key = request.key();
        let lock = self.key_lock(&key)?;
        let outcome = {
            let _guard = lock.lock().await;
            self.toggle_locked(&key, request).await
        };
        self.release_key_lock(&key, &lock);
        outcome
    }

    pub fn blocks_for_task(&self, task_id: &str) -> Result<Vec<ScheduleBlock>, InfraError> {
        self.repository.list_for_task(task_id)
    }

    /// Drops every entry of a deleted task. External bookings are left alone.
    pub fn forget_task(&self, task_id: &str) -> Result<Vec<ScheduleBlock>, InfraError> {
        let removed = self.repository.remove_for_task(task_id)?;
        if !removed.is_empty() {
            tracing::info!(task_id, removed = removed.len(), "forgot schedule blocks of deleted task");
        }
        Ok(removed)
    }

    /// Drops the entry whose external booking was deleted elsewhere.
    pub fn forget_booking(&self, booking_id: &str) -> Result<Option<ScheduleBlock>, InfraError> {
        let removed = self.repository.remove_by_booking_id(booking_id)?;
        if let Some(block) = &removed {
            tracing::info!(key = %block.key, booking_id, "forgot schedule block of deleted booking");
        }
        Ok(removed)
    }

    pub fn reconcile(&self, result: &ScheduleResult) -> Result<BlockReconciliation, InfraError> {
        let blocks = self.repository.list_all()?;
        let reconciliation = reconcile_blocks(result, &blocks);
        if !reconciliation.orphaned.is_empty() {
            tracing::warn!(
                orphaned = reconciliation.orphaned.len(),
                "registered schedule blocks no longer match any proposed slot"
            );
        }
        Ok(reconciliation)
    }

    async fn toggle_locked(
        &self,
        key: &ScheduleBlockKey,
        request: &BookingRequest,
    ) -> Result<ToggleOutcome, InfraError> {
        if self.repository.get(key)?.is_some() {
            match self.unregister_locked(key).await {
                Ok(()) => Ok(ToggleOutcome::Unregistered),
                Err(InfraError::NotFound(_)) => self
                    .register_locked(key, request)
                    .await
                    .map(ToggleOutcome::Registered),
                Err(error) => Err(error),
            }
        } else {
            match self.register_locked(key, request).await {
                Ok(booking_id) => Ok(ToggleOutcome::Registered(booking_id)),
                Err(InfraError::Conflict(_)) => self
                    .unregister_locked(key)
                    .await
                    .map(|()| ToggleOutcome::Unregistered),
                Err(error) => Err(error),
            }
        }
    }

    async fn register_locked(
        &self,
        key: &ScheduleBlockKey,
        request: &BookingRequest,
    ) -> Result<String, InfraError> {
        if self.repository.get(key)?.is_some() {
            return Err(InfraError::Conflict(format!(
                "schedule block already registered: {key}"
            )));
        }

        let booking_id = self.calendar.create_booking(request).await?;
        let block = ScheduleBlock {
            key: key.clone(),
            external_booking_id: booking_id.clone(),
            registered_at: (self.now_provider)(),
        };
        if let Err(error) = self.repository.insert(&block) {
            tracing::warn!(key = %key, booking_id = %booking_id, %error, "rolling back booking after failed registration");
            if let Err(delete_error) = self.calendar.delete_booking(&booking_id).await {
                tracing::warn!(booking_id = %booking_id, error = %delete_error, "failed to delete rolled back booking");
            }
            return Err(error);
        }

        tracing::info!(key = %key, booking_id = %booking_id, "schedule block registered");
        Ok(booking_id)
    }

    async fn unregister_locked(&self, key: &ScheduleBlockKey) -> Result<(), InfraError> {
        let block = self.repository.get(key)?.ok_or_else(|| {
            InfraError::NotFound(format!("schedule block not registered: {key}"))
        })?;

        // The entry never outlives its booking; it is restored if the delete fails.
        if !self.repository.remove(key)? {
            return Err(InfraError::NotFound(format!(
                "schedule block not registered: {key}"
            )));
        }
        if let Err(error) = self.calendar.delete_booking(&block.external_booking_id).await {
            if let Err(restore_error) = self.repository.insert(&block) {
                tracing::warn!(key = %key, error = %restore_error, "failed to restore schedule block after failed delete");
            }
            return Err(error);
        }

        tracing::info!(key = %key, booking_id = %block.external_booking_id, "schedule block unregistered");
        Ok(())
    }

    fn key_lock(&self, key: &ScheduleBlockKey) -> Result<KeyLock, InfraError> {
        let mut locks = self.key_locks.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("schedule block key locks poisoned: {error}"))
        })?;
        Ok(locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    fn release_key_lock(&self, key: &ScheduleBlockKey, lock: &KeyLock) {
        let Ok(mut locks) = self.key_locks.lock() else {
            return;
        };
        // Only the map and the caller hold it: nobody is waiting on this key.
        if Arc::strong_count(lock) <= 2 {
            locks.remove(key);
        }
    }
}
