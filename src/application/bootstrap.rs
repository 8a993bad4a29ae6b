use crate::application::scheduling::SchedulerSettings;
use crate::infrastructure::config::ensure_default_configs;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::schedule_block_store::SqliteScheduleBlockRepository;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

const DATABASE_FILE: &str = "scheduler.sqlite";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub database_path: PathBuf,
    pub settings: SchedulerSettings,
}

impl BootstrapResult {
    pub fn block_repository(&self) -> SqliteScheduleBlockRepository {
        SqliteScheduleBlockRepository::new(&self.database_path)
    }
}

/// Creates `config/`, `state/` and `logs/`, writes missing default configs,
/// validates them and initializes the registry database.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join(DATABASE_FILE);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let settings = SchedulerSettings::load(&config_dir)?;
    initialize_database(&database_path)?;

    tracing::info!(
        workspace_root = %workspace_root.display(),
        timezone = %settings.timezone,
        horizon_days = settings.horizon_days,
        "workspace bootstrapped"
    );

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        database_path,
        settings,
    })
}
