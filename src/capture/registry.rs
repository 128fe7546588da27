use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
};

use anyhow::{Context, Result};
use log::info;
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{
    config::CaptureConfig,
    fusion::{FusionPolicy, WeightedFusion},
    loop_worker::{capture_loop, CaptureContext},
    producers::{SignalProducer, SimulatedFace, SimulatedVoice},
    store::CaptureStore,
};

type TaskMap = Mutex<HashMap<String, CaptureTask>>;

/// One user's running capture loop.
pub struct CaptureTask {
    id: u64,
    username: String,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl CaptureTask {
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Request the loop to stop and hand back its join handle.
    pub fn cancel(self) -> JoinHandle<()> {
        self.cancel_token.cancel();
        self.handle
    }
}

/// A task's claim on its registry entry, used when the loop ends on its own.
pub(crate) struct TaskSlot {
    tasks: Weak<TaskMap>,
    username: String,
    id: u64,
}

impl TaskSlot {
    /// Remove the entry only if it still belongs to this task; a later `start` for the
    /// same username owns a different id.
    pub(crate) fn release(&self) {
        let Some(tasks) = self.tasks.upgrade() else {
            return;
        };
        let mut guard = lock_tasks(&tasks);
        if guard.get(&self.username).map(|task| task.id) == Some(self.id) {
            guard.remove(&self.username);
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(username: &str) -> Self {
        Self {
            tasks: Weak::new(),
            username: username.to_string(),
            id: 0,
        }
    }
}

fn lock_tasks(tasks: &TaskMap) -> MutexGuard<'_, HashMap<String, CaptureTask>> {
    match tasks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct RegistryInner {
    tasks: Arc<TaskMap>,
    next_id: AtomicU64,
    store: Arc<dyn CaptureStore>,
    face: Arc<dyn SignalProducer>,
    voice: Arc<dyn SignalProducer>,
    fusion: Arc<dyn FusionPolicy>,
    config: CaptureConfig,
    runtime: Handle,
}

/// Process-wide registry of per-user capture tasks.
///
/// Cloning yields another handle to the same registry. `start` and `stop` are
/// synchronous, never wait on a loop, and may be called from any thread once the
/// registry has been built inside a tokio runtime.
#[derive(Clone)]
pub struct CaptureRegistry {
    inner: Arc<RegistryInner>,
}

impl CaptureRegistry {
    /// Registry with the simulated producers and table-driven fusion.
    pub fn new(store: Arc<dyn CaptureStore>, config: CaptureConfig) -> Result<Self> {
        let fusion = WeightedFusion::new(config.jitter);
        Self::with_components(
            store,
            Arc::new(SimulatedFace::default()),
            Arc::new(SimulatedVoice::default()),
            Arc::new(fusion),
            config,
        )
    }

    pub fn with_components(
        store: Arc<dyn CaptureStore>,
        face: Arc<dyn SignalProducer>,
        voice: Arc<dyn SignalProducer>,
        fusion: Arc<dyn FusionPolicy>,
        config: CaptureConfig,
    ) -> Result<Self> {
        let runtime =
            Handle::try_current().context("capture registry must be created inside a tokio runtime")?;

        Ok(Self {
            inner: Arc::new(RegistryInner {
                tasks: Arc::new(Mutex::new(HashMap::new())),
                next_id: AtomicU64::new(1),
                store,
                face,
                voice,
                fusion,
                config,
                runtime,
            }),
        })
    }

    /// Start sampling for `username`. Returns `false` if a task was already running.
    pub fn start(&self, username: &str) -> bool {
        let inner = &self.inner;
        let mut tasks = lock_tasks(&inner.tasks);
        if tasks.contains_key(username) {
            return false;
        }

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel_token = CancellationToken::new();
        let ctx = CaptureContext {
            username: username.to_string(),
            store: Arc::clone(&inner.store),
            face: Arc::clone(&inner.face),
            voice: Arc::clone(&inner.voice),
            fusion: Arc::clone(&inner.fusion),
            config: inner.config.clone(),
            cancel_token: cancel_token.clone(),
            slot: TaskSlot {
                tasks: Arc::downgrade(&inner.tasks),
                username: username.to_string(),
                id,
            },
        };

        // Spawned while holding the lock so a loop that ends immediately cannot try to
        // release its entry before it is inserted.
        let handle = inner.runtime.spawn(capture_loop(ctx));
        tasks.insert(
            username.to_string(),
            CaptureTask {
                id,
                username: username.to_string(),
                cancel_token,
                handle,
            },
        );

        info!("Registered capture task for {username}");
        true
    }

    /// Stop sampling for `username` without waiting for the loop to exit.
    /// Returns `false` if no task was registered.
    pub fn stop(&self, username: &str) -> bool {
        self.cancel(username).is_some()
    }

    /// Stop sampling for `username` and hand back the loop's join handle, for callers
    /// that want to wait until it has exited.
    pub fn cancel(&self, username: &str) -> Option<JoinHandle<()>> {
        let task = lock_tasks(&self.inner.tasks).remove(username)?;
        info!("Stop requested for capture task of {username}");
        Some(task.cancel())
    }

    /// Cancel every registered task; used at shutdown.
    pub fn stop_all(&self) -> Vec<JoinHandle<()>> {
        let drained: Vec<CaptureTask> = lock_tasks(&self.inner.tasks)
            .drain()
            .map(|(_, task)| task)
            .collect();

        if !drained.is_empty() {
            info!("Stopping {} capture task(s)", drained.len());
        }
        drained
            .into_iter()
            .map(|task| {
                log::debug!("Stop requested for capture task of {}", task.username());
                task.cancel()
            })
            .collect()
    }

    pub fn is_active(&self, username: &str) -> bool {
        lock_tasks(&self.inner.tasks).contains_key(username)
    }

    pub fn len(&self) -> usize {
        lock_tasks(&self.inner.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.inner.config
    }
}
