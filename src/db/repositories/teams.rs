use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::params;

use crate::db::{
    connection::Database,
    models::{Team, TeamMembers},
};

impl Database {
    pub async fn create_team(&self, name: &str) -> Result<Team> {
        let name = name.trim().to_string();
        self.write(move |tx| {
            if name.is_empty() {
                bail!("team name must not be empty");
            }

            let created_at = Utc::now();
            tx.execute(
                "INSERT INTO teams (name, created_at) VALUES (?1, ?2)",
                params![name, created_at.to_rfc3339()],
            )
            .with_context(|| format!("failed to insert team {name}"))?;

            Ok(Team {
                id: tx.last_insert_rowid(),
                name,
                created_at,
            })
        })
        .await
    }

    /// All teams with their member usernames, ordered by team id.
    pub async fn list_teams(&self) -> Result<Vec<TeamMembers>> {
        self.execute(|conn| {
            let mut teams: BTreeMap<i64, TeamMembers> = BTreeMap::new();

            let mut stmt = conn.prepare("SELECT id, name FROM teams ORDER BY id ASC")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let id: i64 = row.get(0)?;
                teams.insert(
                    id,
                    TeamMembers {
                        id,
                        name: row.get(1)?,
                        employees: Vec::new(),
                    },
                );
            }

            let mut stmt = conn.prepare(
                "SELECT team_id, username FROM users
                 WHERE team_id IS NOT NULL
                 ORDER BY username ASC",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let team_id: i64 = row.get(0)?;
                if let Some(team) = teams.get_mut(&team_id) {
                    team.employees.push(row.get(1)?);
                }
            }

            Ok(teams.into_values().collect())
        })
        .await
    }

    /// Unassign all members and delete the team. Returns `false` if it did not exist.
    pub async fn delete_team(&self, team_id: i64) -> Result<bool> {
        self.write(move |tx| {
            tx.execute(
                "UPDATE users SET team_id = NULL WHERE team_id = ?1",
                params![team_id],
            )
            .context("failed to unassign team members")?;
            let rows_affected = tx
                .execute("DELETE FROM teams WHERE id = ?1", params![team_id])
                .context("failed to delete team")?;
            Ok(rows_affected > 0)
        })
        .await
    }
}
