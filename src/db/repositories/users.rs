use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_role},
    models::{NewUser, Role, User},
};

pub const DEFAULT_MANAGER_USERNAME: &str = "manager";
const DEFAULT_MANAGER_NAME: &str = "Default Manager";

fn row_to_user(row: &Row) -> Result<User> {
    let role: String = row.get("role")?;
    let created_at: String = row.get("created_at")?;

    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        role: parse_role(&role)?,
        full_name: row.get("full_name")?,
        team_id: row.get("team_id")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Create an account. Fails on a blank or already taken username.
    pub async fn create_user(&self, new_user: NewUser) -> Result<User> {
        self.write(move |tx| {
            let username = new_user.username.trim().to_string();
            if username.is_empty() {
                bail!("username must not be empty");
            }

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM users WHERE username = ?1",
                    params![username],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                bail!("user {username} already exists");
            }

            let created_at = Utc::now();
            tx.execute(
                "INSERT INTO users (username, role, full_name, team_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    username,
                    new_user.role.as_str(),
                    new_user.full_name,
                    new_user.team_id,
                    created_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to insert user {username}"))?;

            Ok(User {
                id: tx.last_insert_rowid(),
                username,
                role: new_user.role,
                full_name: new_user.full_name,
                team_id: new_user.team_id,
                created_at,
            })
        })
        .await
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<User>> {
        let username = username.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, username, role, full_name, team_id, created_at
                 FROM users
                 WHERE username = ?1",
            )?;
            let mut rows = stmt.query(params![username])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_user(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, role, full_name, team_id, created_at
                 FROM users
                 ORDER BY username ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut users = Vec::new();
            while let Some(row) = rows.next()? {
                users.push(row_to_user(row)?);
            }

            Ok(users)
        })
        .await
    }

    /// Delete a user and all of their samples in one transaction.
    /// Returns `false` when no such user exists.
    pub async fn delete_user(&self, username: &str) -> Result<bool> {
        let username = username.to_string();
        self.write(move |tx| {
            let user_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM users WHERE username = ?1",
                    params![username],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(user_id) = user_id else {
                return Ok(false);
            };

            tx.execute("DELETE FROM states WHERE user_id = ?1", params![user_id])
                .context("failed to delete user samples")?;
            tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])
                .with_context(|| format!("failed to delete user {username}"))?;

            Ok(true)
        })
        .await
    }

    /// Create the bootstrap manager account if it does not exist yet.
    /// Returns `true` when the account was created by this call.
    pub async fn ensure_default_manager(&self) -> Result<bool> {
        if self.find_user(DEFAULT_MANAGER_USERNAME).await?.is_some() {
            return Ok(false);
        }

        self.create_user(NewUser {
            username: DEFAULT_MANAGER_USERNAME.to_string(),
            role: Role::Manager,
            full_name: Some(DEFAULT_MANAGER_NAME.to_string()),
            team_id: None,
        })
        .await
        .map(|_| true)
        .map_err(|err| anyhow!("failed to bootstrap manager account: {err}"))
    }
}
