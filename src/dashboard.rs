//! Read side of the dashboard: latest state, history, teams and users, with the
//! manager/self access rule applied.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::db::{CognitiveSample, Database, Role, TeamMembers, RECENT_SAMPLES_LIMIT};

const CLOCK_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Who is asking.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub username: String,
    pub role: Role,
}

impl Viewer {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    /// Managers may view anyone; employees only themselves.
    pub fn can_view(&self, username: &str) -> bool {
        self.role == Role::Manager || self.username == username
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Access<T> {
    Granted(T),
    Unauthorized,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LatestState {
    pub time: String,
    pub face: Option<String>,
    pub voice: Option<String>,
    pub stress: f64,
    pub fatigue: f64,
    pub attention: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateLookup {
    Ready(LatestState),
    NoData,
    NotFound,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryPoint {
    pub time: String,
    pub stress: f64,
    pub fatigue: f64,
    pub attention: f64,
    pub face: Option<String>,
    pub voice: Option<String>,
}

impl From<CognitiveSample> for HistoryPoint {
    fn from(sample: CognitiveSample) -> Self {
        Self {
            time: sample.timestamp.format(DATETIME_FORMAT).to_string(),
            stress: sample.stress,
            fatigue: sample.fatigue,
            attention: sample.attention,
            face: sample.face_label,
            voice: sample.voice_label,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserSummary {
    pub role: Role,
    pub full_name: Option<String>,
    pub team_id: Option<i64>,
}

#[derive(Clone)]
pub struct Dashboard {
    db: Database,
}

impl Dashboard {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn latest_state(&self, viewer: &Viewer, username: &str) -> Result<Access<StateLookup>> {
        if !viewer.can_view(username) {
            return Ok(Access::Unauthorized);
        }

        let Some(user) = self.db.find_user(username).await? else {
            return Ok(Access::Granted(StateLookup::NotFound));
        };

        let lookup = match self.db.latest_sample(user.id).await? {
            Some(sample) => StateLookup::Ready(LatestState {
                time: sample.timestamp.format(CLOCK_FORMAT).to_string(),
                face: sample.face_label,
                voice: sample.voice_label,
                stress: sample.stress,
                fatigue: sample.fatigue,
                attention: sample.attention,
            }),
            None => StateLookup::NoData,
        };
        Ok(Access::Granted(lookup))
    }

    /// Full history, oldest first. Unknown users yield an empty list.
    pub async fn history(&self, viewer: &Viewer, username: &str) -> Result<Access<Vec<HistoryPoint>>> {
        if !viewer.can_view(username) {
            return Ok(Access::Unauthorized);
        }

        let Some(user) = self.db.find_user(username).await? else {
            return Ok(Access::Granted(Vec::new()));
        };

        let samples = self.db.sample_history(user.id).await?;
        Ok(Access::Granted(samples.into_iter().map(HistoryPoint::from).collect()))
    }

    /// Manager view of one employee: the most recent samples, newest first.
    /// `None` when the user does not exist.
    pub async fn employee_history(
        &self,
        viewer: &Viewer,
        username: &str,
    ) -> Result<Access<Option<Vec<HistoryPoint>>>> {
        if viewer.role != Role::Manager {
            return Ok(Access::Unauthorized);
        }

        let Some(user) = self.db.find_user(username).await? else {
            return Ok(Access::Granted(None));
        };

        let samples = self.db.recent_samples(user.id, RECENT_SAMPLES_LIMIT).await?;
        Ok(Access::Granted(Some(
            samples.into_iter().map(HistoryPoint::from).collect(),
        )))
    }

    pub async fn teams(&self, viewer: &Viewer) -> Result<Access<Vec<TeamMembers>>> {
        if viewer.role != Role::Manager {
            return Ok(Access::Unauthorized);
        }
        Ok(Access::Granted(self.db.list_teams().await?))
    }

    pub async fn users(&self, viewer: &Viewer) -> Result<Access<BTreeMap<String, UserSummary>>> {
        if viewer.role != Role::Manager {
            return Ok(Access::Unauthorized);
        }

        let users = self
            .db
            .list_users()
            .await?
            .into_iter()
            .map(|user| {
                (
                    user.username,
                    UserSummary {
                        role: user.role,
                        full_name: user.full_name,
                        team_id: user.team_id,
                    },
                )
            })
            .collect();
        Ok(Access::Granted(users))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::db::NewUser;

    async fn setup() -> (tempfile::TempDir, Database, Dashboard) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("cogni.sqlite3")).unwrap();
        db.ensure_default_manager().await.unwrap();
        for username in ["alice", "bob"] {
            db.create_user(NewUser {
                username: username.into(),
                role: Role::Employee,
                full_name: None,
                team_id: None,
            })
            .await
            .unwrap();
        }
        let dashboard = Dashboard::new(db.clone());
        (dir, db, dashboard)
    }

    async fn record(db: &Database, username: &str, hour: u32, stress: f64) {
        let user = db.find_user(username).await.unwrap().unwrap();
        db.insert_sample(&CognitiveSample {
            id: None,
            user_id: user.id,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, hour, 30, 15).unwrap(),
            stress,
            fatigue: 0.4,
            attention: 0.5,
            face_label: Some("neutral".into()),
            voice_label: Some("neu".into()),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn employees_only_see_themselves() {
        let (_dir, db, dashboard) = setup().await;
        record(&db, "bob", 9, 0.3).await;
        let alice = Viewer::new("alice", Role::Employee);

        assert_eq!(dashboard.latest_state(&alice, "bob").await.unwrap(), Access::Unauthorized);
        assert_eq!(dashboard.history(&alice, "bob").await.unwrap(), Access::Unauthorized);
        assert_eq!(dashboard.teams(&alice).await.unwrap(), Access::Unauthorized);
        assert_eq!(dashboard.users(&alice).await.unwrap(), Access::Unauthorized);
        assert_eq!(
            dashboard.employee_history(&alice, "alice").await.unwrap(),
            Access::Unauthorized
        );

        assert_eq!(
            dashboard.latest_state(&alice, "alice").await.unwrap(),
            Access::Granted(StateLookup::NoData)
        );
    }

    #[tokio::test]
    async fn latest_state_formats_clock_time() {
        let (_dir, db, dashboard) = setup().await;
        record(&db, "alice", 9, 0.3).await;
        record(&db, "alice", 11, 0.6).await;
        let manager = Viewer::new("manager", Role::Manager);

        let Access::Granted(StateLookup::Ready(state)) =
            dashboard.latest_state(&manager, "alice").await.unwrap()
        else {
            panic!("expected a ready state");
        };
        assert_eq!(state.time, "11:30:15");
        assert_eq!(state.stress, 0.6);

        assert_eq!(
            dashboard.latest_state(&manager, "ghost").await.unwrap(),
            Access::Granted(StateLookup::NotFound)
        );
    }

    #[tokio::test]
    async fn history_orders_oldest_first_and_manager_view_newest_first() {
        let (_dir, db, dashboard) = setup().await;
        record(&db, "alice", 10, 0.5).await;
        record(&db, "alice", 8, 0.1).await;
        let alice = Viewer::new("alice", Role::Employee);
        let manager = Viewer::new("manager", Role::Manager);

        let Access::Granted(points) = dashboard.history(&alice, "alice").await.unwrap() else {
            panic!("an employee may read their own history");
        };
        let times: Vec<&str> = points.iter().map(|p| p.time.as_str()).collect();
        assert_eq!(times, vec!["2024-05-01 08:30:15", "2024-05-01 10:30:15"]);

        let Access::Granted(Some(points)) =
            dashboard.employee_history(&manager, "alice").await.unwrap()
        else {
            panic!("manager view should find alice");
        };
        assert_eq!(points[0].stress, 0.5);

        assert_eq!(
            dashboard.history(&manager, "ghost").await.unwrap(),
            Access::Granted(Vec::new())
        );
        assert_eq!(
            dashboard.employee_history(&manager, "ghost").await.unwrap(),
            Access::Granted(None)
        );
    }

    #[tokio::test]
    async fn manager_lists_users_and_teams() {
        let (_dir, db, dashboard) = setup().await;
        db.create_team("Ops").await.unwrap();
        let manager = Viewer::new("manager", Role::Manager);

        let Access::Granted(users) = dashboard.users(&manager).await.unwrap() else {
            panic!("manager may list users");
        };
        assert_eq!(users.len(), 3);
        assert_eq!(users["manager"].role, Role::Manager);
        assert_eq!(users["alice"].role, Role::Employee);

        let Access::Granted(teams) = dashboard.teams(&manager).await.unwrap() else {
            panic!("manager may list teams");
        };
        assert_eq!(teams.len(), 1);
        assert!(teams[0].employees.is_empty());
    }
}
