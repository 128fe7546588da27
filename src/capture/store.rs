use anyhow::Result;
use async_trait::async_trait;

use crate::db::{CognitiveSample, Database, User};

/// The two store operations a capture task depends on.
///
/// Both are called from many tasks at once; every call is its own unit of work and a
/// failure must come back as an `Err`, never as a panic.
#[async_trait]
pub trait CaptureStore: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<User>>;

    async fn insert_sample(&self, sample: &CognitiveSample) -> Result<()>;
}

#[async_trait]
impl CaptureStore for Database {
    async fn find_user(&self, username: &str) -> Result<Option<User>> {
        Database::find_user(self, username).await
    }

    async fn insert_sample(&self, sample: &CognitiveSample) -> Result<()> {
        Database::insert_sample(self, sample).await.map(|_| ())
    }
}
