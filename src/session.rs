//! Session lifecycle hooks: the only place that starts or stops capture tasks.

use anyhow::{bail, Result};
use log::info;
use tokio::task::JoinHandle;

use crate::{
    capture::CaptureRegistry,
    db::{Database, NewUser, Role, User},
};

#[derive(Clone)]
pub struct SessionHooks {
    registry: CaptureRegistry,
    db: Database,
}

impl SessionHooks {
    pub fn new(registry: CaptureRegistry, db: Database) -> Self {
        Self { registry, db }
    }

    /// Employees start sampling on login; managers never do.
    pub fn on_login(&self, username: &str, role: Role) -> bool {
        match role {
            Role::Employee => self.registry.start(username),
            Role::Manager => false,
        }
    }

    pub fn on_logout(&self, username: &str, role: Role) -> bool {
        match role {
            Role::Employee => self.registry.stop(username),
            Role::Manager => false,
        }
    }

    /// Like `on_logout`, but hands back the stopped loop so the caller can wait for it.
    pub fn logout(&self, username: &str, role: Role) -> Option<JoinHandle<()>> {
        match role {
            Role::Employee => self.registry.cancel(username),
            Role::Manager => None,
        }
    }

    pub fn on_account_deleted(&self, username: &str) -> bool {
        self.registry.stop(username)
    }

    /// Log in an existing account by name, returning it. Unknown users are rejected.
    pub async fn login(&self, username: &str) -> Result<User> {
        let Some(user) = self.db.find_user(username).await? else {
            bail!("unknown user {username}");
        };
        if self.on_login(&user.username, user.role) {
            info!("Employee {} logged in; capture started", user.username);
        }
        Ok(user)
    }

    pub async fn add_employee(
        &self,
        username: &str,
        full_name: Option<String>,
        team_id: Option<i64>,
    ) -> Result<User> {
        self.db
            .create_user(NewUser {
                username: username.to_string(),
                role: Role::Employee,
                full_name: full_name.filter(|name| !name.trim().is_empty()),
                team_id,
            })
            .await
    }

    /// Stop the user's capture, then delete the account and its samples.
    /// Returns `false` when the account did not exist.
    pub async fn delete_account(&self, username: &str) -> Result<bool> {
        self.on_account_deleted(username);
        let deleted = self.db.delete_user(username).await?;
        if deleted {
            info!("Deleted account {username}");
        }
        Ok(deleted)
    }

    pub fn registry(&self) -> &CaptureRegistry {
        &self.registry
    }
}
