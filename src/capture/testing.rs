//! In-memory doubles for exercising capture tasks without SQLite.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use super::{producers::SignalProducer, store::CaptureStore};
use crate::db::{CognitiveSample, Role, User};

pub struct FixedProducer {
    pub label: &'static str,
    pub fallback: &'static str,
    pub delay: Duration,
}

impl FixedProducer {
    pub fn new(label: &'static str, fallback: &'static str) -> Self {
        Self {
            label,
            fallback,
            delay: Duration::ZERO,
        }
    }

    /// Block for `delay` on every capture, like a slow sensor.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl SignalProducer for FixedProducer {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn fallback_label(&self) -> &'static str {
        self.fallback
    }

    fn capture(&self) -> String {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.label.to_string()
    }
}

pub struct PanickingProducer {
    pub fallback: &'static str,
}

impl SignalProducer for PanickingProducer {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn fallback_label(&self) -> &'static str {
        self.fallback
    }

    fn capture(&self) -> String {
        panic!("sensor unavailable");
    }
}

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, User>>,
    samples: Mutex<Vec<CognitiveSample>>,
    fail_next_inserts: AtomicUsize,
    fail_next_lookups: AtomicUsize,
    insert_attempts: AtomicUsize,
    lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn with_employees(usernames: &[&str]) -> Self {
        let store = Self::default();
        for username in usernames {
            store.add_employee(username);
        }
        store
    }

    pub fn add_employee(&self, username: &str) {
        let mut users = self.users.lock().unwrap();
        let id = users.len() as i64 + 1;
        users.insert(
            username.to_string(),
            User {
                id,
                username: username.to_string(),
                role: Role::Employee,
                full_name: None,
                team_id: None,
                created_at: Utc::now(),
            },
        );
    }

    pub fn remove_user(&self, username: &str) {
        self.users.lock().unwrap().remove(username);
    }

    pub fn fail_next_inserts(&self, count: usize) {
        self.fail_next_inserts.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_lookups(&self, count: usize) {
        self.fail_next_lookups.store(count, Ordering::SeqCst);
    }

    pub fn samples(&self) -> Vec<CognitiveSample> {
        self.samples.lock().unwrap().clone()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl CaptureStore for MemoryStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fail_next_lookups) {
            return Err(anyhow!("database is locked"));
        }
        Ok(self.users.lock().unwrap().get(username).cloned())
    }

    async fn insert_sample(&self, sample: &CognitiveSample) -> Result<()> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fail_next_inserts) {
            return Err(anyhow!("disk I/O error"));
        }
        self.samples.lock().unwrap().push(sample.clone());
        Ok(())
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
