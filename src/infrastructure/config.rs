use crate::domain::models::WorkPolicy;
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const POLICIES_JSON: &str = "policies.json";
const SUPPORTED_SCHEMA: u64 = 1;
const DEFAULT_HORIZON_DAYS: u32 = 14;
const MAX_HORIZON_DAYS: u32 = 366;

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "timezone": "UTC"
            }),
        ),
        (
            POLICIES_JSON,
            serde_json::json!({
                "schema": 1,
                "workHours": {
                    "startHour": 9,
                    "endHour": 18
                },
                "skipWeekends": true,
                "horizonDays": DEFAULT_HORIZON_DAYS
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_hour(
    work_hours: &serde_json::Value,
    field_name: &str,
    path: &Path,
) -> Result<u32, InfraError> {
    work_hours
        .get(field_name)
        .and_then(serde_json::Value::as_u64)
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "workHours.{field_name} must be a non-negative integer in {}",
                path.display()
            ))
        })
}

/// Loads the working-hours policy. Out-of-range hours are rejected, not clamped.
pub fn load_work_policy(config_dir: &Path) -> Result<WorkPolicy, InfraError> {
    let path = config_dir.join(POLICIES_JSON);
    let policies = read_config(&path)?;
    let work_hours = policies.get("workHours").ok_or_else(|| {
        InfraError::InvalidConfig(format!("missing workHours in {}", path.display()))
    })?;
    let start_hour = read_hour(work_hours, "startHour", &path)?;
    let end_hour = read_hour(work_hours, "endHour", &path)?;
    let skip_weekends = match policies.get("skipWeekends") {
        None => true,
        Some(value) => value.as_bool().ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "skipWeekends must be a boolean in {}",
                path.display()
            ))
        })?,
    };
    Ok(WorkPolicy::new(start_hour, end_hour, skip_weekends)?)
}

pub fn read_horizon_days(config_dir: &Path) -> Result<u32, InfraError> {
    let path = config_dir.join(POLICIES_JSON);
    let policies = read_config(&path)?;
    let Some(value) = policies.get("horizonDays") else {
        return Ok(DEFAULT_HORIZON_DAYS);
    };
    value
        .as_u64()
        .and_then(|days| u32::try_from(days).ok())
        .filter(|days| (1..=MAX_HORIZON_DAYS).contains(days))
        .ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "horizonDays must be within 1..={MAX_HORIZON_DAYS} in {}",
                path.display()
            ))
        })
}

/// Timezone that defines local working days. Defaults to UTC when unset.
pub fn read_timezone(config_dir: &Path) -> Result<Tz, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let Some(name) = app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Ok(Tz::UTC);
    };
    name.parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{name}': {error}")))
}
