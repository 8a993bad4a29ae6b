use crate::domain::blocks::{ScheduleBlock, ScheduleBlockKey};
use crate::domain::models::{format_hhmm, parse_hhmm};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::apply_schema;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait ScheduleBlockRepository: Send + Sync {
    fn get(&self, key: &ScheduleBlockKey) -> Result<Option<ScheduleBlock>, InfraError>;
    /// Fails with [`InfraError::Conflict`] when the key is already stored.
    fn insert(&self, block: &ScheduleBlock) -> Result<(), InfraError>;
    fn remove(&self, key: &ScheduleBlockKey) -> Result<bool, InfraError>;
    fn remove_by_booking_id(&self, booking_id: &str) -> Result<Option<ScheduleBlock>, InfraError>;
    fn remove_for_task(&self, task_id: &str) -> Result<Vec<ScheduleBlock>, InfraError>;
    fn list_for_task(&self, task_id: &str) -> Result<Vec<ScheduleBlock>, InfraError>;
    fn list_all(&self) -> Result<Vec<ScheduleBlock>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteScheduleBlockRepository {
    db_path: PathBuf,
}

type BlockRow = (String, String, String, String, String);

impl SqliteScheduleBlockRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Opens the repository and makes sure the table exists.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, InfraError> {
        let repository = Self::new(db_path);
        apply_schema(&repository.connect()?)?;
        Ok(repository)
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn query_blocks(
        connection: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<ScheduleBlock>, InfraError> {
        let mut statement = connection.prepare(sql)?;
        let rows = statement
            .query_map(params, |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<Result<Vec<BlockRow>, _>>()?;
        rows.into_iter().map(row_to_block).collect()
    }
}

impl ScheduleBlockRepository for SqliteScheduleBlockRepository {
    fn get(&self, key: &ScheduleBlockKey) -> Result<Option<ScheduleBlock>, InfraError> {
        let connection = self.connect()?;
        let row: Option<BlockRow> = connection
            .query_row(
                "SELECT task_id, date, start_time, external_booking_id, registered_at
                 FROM schedule_blocks
                 WHERE task_id = ?1 AND date = ?2 AND start_time = ?3",
                params![key.task_id, key.date.to_string(), format_hhmm(key.start_time)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        row.map(row_to_block).transpose()
    }

    fn insert(&self, block: &ScheduleBlock) -> Result<(), InfraError> {
        block.validate().map_err(InfraError::InvalidConfig)?;
        let connection = self.connect()?;
        let inserted = connection.execute(
            "INSERT INTO schedule_blocks
               (task_id, date, start_time, external_booking_id, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                block.key.task_id,
                block.key.date.to_string(),
                format_hhmm(block.key.start_time),
                block.external_booking_id,
                block.registered_at.to_rfc3339(),
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(error, _))
                if error.code == ErrorCode::ConstraintViolation =>
            {
                Err(InfraError::Conflict(format!(
                    "schedule block already registered: {}",
                    block.key
                )))
            }
            Err(error) => Err(error.into()),
        }
    }

    fn remove(&self, key: &ScheduleBlockKey) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let removed = connection.execute(
            "DELETE FROM schedule_blocks WHERE task_id = ?1 AND date = ?2 AND start_time = ?3",
            params![key.task_id, key.date.to_string(), format_hhmm(key.start_time)],
        )?;
        Ok(removed > 0)
    }

    fn remove_by_booking_id(&self, booking_id: &str) -> Result<Option<ScheduleBlock>, InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        let existing = Self::query_blocks(
            &transaction,
            "SELECT task_id, date, start_time, external_booking_id, registered_at
             FROM schedule_blocks WHERE external_booking_id = ?1",
            params![booking_id],
        )?;
        transaction.execute(
            "DELETE FROM schedule_blocks WHERE external_booking_id = ?1",
            params![booking_id],
        )?;
        transaction.commit()?;
        Ok(existing.into_iter().next())
    }

    fn remove_for_task(&self, task_id: &str) -> Result<Vec<ScheduleBlock>, InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        let existing = Self::query_blocks(
            &transaction,
            "SELECT task_id, date, start_time, external_booking_id, registered_at
             FROM schedule_blocks WHERE task_id = ?1
             ORDER BY date, start_time",
            params![task_id],
        )?;
        transaction.execute(
            "DELETE FROM schedule_blocks WHERE task_id = ?1",
            params![task_id],
        )?;
        transaction.commit()?;
        Ok(existing)
    }

    fn list_for_task(&self, task_id: &str) -> Result<Vec<ScheduleBlock>, InfraError> {
        let connection = self.connect()?;
        Self::query_blocks(
            &connection,
            "SELECT task_id, date, start_time, external_booking_id, registered_at
             FROM schedule_blocks WHERE task_id = ?1
             ORDER BY date, start_time",
            params![task_id],
        )
    }

    fn list_all(&self) -> Result<Vec<ScheduleBlock>, InfraError> {
        let connection = self.connect()?;
        Self::query_blocks(
            &connection,
            "SELECT task_id, date, start_time, external_booking_id, registered_at
             FROM schedule_blocks
             ORDER BY task_id, date, start_time",
            params![],
        )
    }
}

fn row_to_block(row: BlockRow) -> Result<ScheduleBlock, InfraError> {
    let (task_id, date_raw, start_time_raw, external_booking_id, registered_at_raw) = row;
    let date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d").map_err(|error| {
        InfraError::InvalidConfig(format!(
            "invalid schedule_blocks.date '{date_raw}': {error}"
        ))
    })?;
    let start_time = parse_hhmm(&start_time_raw).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "invalid schedule_blocks.start_time '{start_time_raw}'"
        ))
    })?;
    let registered_at = DateTime::parse_from_rfc3339(&registered_at_raw).map_err(|error| {
        InfraError::InvalidConfig(format!(
            "invalid schedule_blocks.registered_at '{registered_at_raw}': {error}"
        ))
    })?;

    Ok(ScheduleBlock {
        key: ScheduleBlockKey::new(task_id, date, start_time),
        external_booking_id,
        registered_at: registered_at.with_timezone(&Utc),
    })
}

#[derive(Debug, Default)]
pub struct InMemoryScheduleBlockRepository {
    blocks: Mutex<BTreeMap<String, ScheduleBlock>>,
}

impl InMemoryScheduleBlockRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, ScheduleBlock>>, InfraError> {
        self.blocks.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("schedule block store lock poisoned: {error}"))
        })
    }
}

impl ScheduleBlockRepository for InMemoryScheduleBlockRepository {
    fn get(&self, key: &ScheduleBlockKey) -> Result<Option<ScheduleBlock>, InfraError> {
        Ok(self.lock()?.get(&key.to_string()).cloned())
    }

    fn insert(&self, block: &ScheduleBlock) -> Result<(), InfraError> {
        block.validate().map_err(InfraError::InvalidConfig)?;
        let mut blocks = self.lock()?;
        let key = block.key.to_string();
        if blocks.contains_key(&key) {
            return Err(InfraError::Conflict(format!(
                "schedule block already registered: {key}"
            )));
        }
        blocks.insert(key, block.clone());
        Ok(())
    }

    fn remove(&self, key: &ScheduleBlockKey) -> Result<bool, InfraError> {
        Ok(self.lock()?.remove(&key.to_string()).is_some())
    }

    fn remove_by_booking_id(&self, booking_id: &str) -> Result<Option<ScheduleBlock>, InfraError> {
        let mut blocks = self.lock()?;
        let key = blocks
            .iter()
            .find(|(_, block)| block.external_booking_id == booking_id)
            .map(|(key, _)| key.clone());
        Ok(key.and_then(|key| blocks.remove(&key)))
    }

    fn remove_for_task(&self, task_id: &str) -> Result<Vec<ScheduleBlock>, InfraError> {
        let mut blocks = self.lock()?;
        let keys = blocks
            .iter()
            .filter(|(_, block)| block.key.task_id == task_id)
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        Ok(keys.into_iter().filter_map(|key| blocks.remove(&key)).collect())
    }

    fn list_for_task(&self, task_id: &str) -> Result<Vec<ScheduleBlock>, InfraError> {
        Ok(self
            .lock()?
            .values()
            .filter(|block| block.key.task_id == task_id)
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<ScheduleBlock>, InfraError> {
        Ok(self.lock()?.values().cloned().collect())
    }
}
