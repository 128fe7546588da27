use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::Role;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_role(value: &str) -> Result<Role> {
    match value {
        "manager" => Ok(Role::Manager),
        "employee" => Ok(Role::Employee),
        other => Err(anyhow!("unknown user role {other}")),
    }
}
