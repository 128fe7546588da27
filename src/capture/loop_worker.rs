use std::sync::Arc;

use chrono::Utc;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::db::CognitiveSample;

use super::{
    config::CaptureConfig, fusion::FusionPolicy, producers::SignalProducer,
    registry::TaskSlot, store::CaptureStore,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_debug, log_error, log_info, log_warn};

/// Everything one capture task needs, owned by the task.
pub(crate) struct CaptureContext {
    pub username: String,
    pub store: Arc<dyn CaptureStore>,
    pub face: Arc<dyn SignalProducer>,
    pub voice: Arc<dyn SignalProducer>,
    pub fusion: Arc<dyn FusionPolicy>,
    pub config: CaptureConfig,
    pub cancel_token: CancellationToken,
    pub slot: TaskSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Running,
    Stopping,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    Recorded,
    Dropped,
    Skipped,
    UserMissing,
}

pub(crate) async fn capture_loop(ctx: CaptureContext) {
    log_info!("capture started for {}", ctx.username);

    let mut state = LoopState::Running;
    while state == LoopState::Running {
        let tick_start = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => None,
            outcome = run_tick(&ctx) => Some(outcome),
        };

        match outcome {
            None => {
                state = LoopState::Stopping;
                break;
            }
            Some(TickOutcome::UserMissing) => {
                state = LoopState::Terminated;
                break;
            }
            Some(outcome) => log_debug!("capture tick for {}: {:?}", ctx.username, outcome),
        }

        state = wait_for_next_tick(&ctx, tick_start).await;
    }

    match state {
        LoopState::Terminated => {
            log_info!("user {} no longer exists; capture ending", ctx.username);
            ctx.slot.release();
        }
        _ => log_info!("capture stopped for {}", ctx.username),
    }
}

async fn run_tick(ctx: &CaptureContext) -> TickOutcome {
    let user = match ctx.store.find_user(&ctx.username).await {
        Ok(Some(user)) => user,
        Ok(None) => return TickOutcome::UserMissing,
        Err(err) => {
            log_error!("user lookup failed for {}: {err:?}", ctx.username);
            return TickOutcome::Skipped;
        }
    };

    let timestamp = Utc::now();
    let (face, voice) = acquire_signals(ctx).await;
    let fused = ctx.fusion.fuse(Some(&face), Some(&voice));

    let sample = CognitiveSample {
        id: None,
        user_id: user.id,
        timestamp,
        stress: fused.stress,
        fatigue: fused.fatigue,
        attention: fused.attention,
        face_label: Some(face),
        voice_label: Some(voice),
    };

    match ctx.store.insert_sample(&sample).await {
        Ok(()) => TickOutcome::Recorded,
        Err(err) => {
            log_error!("failed to persist sample for {}: {err:?}", ctx.username);
            TickOutcome::Dropped
        }
    }
}

/// Run both producers on the blocking pool in parallel. A producer that panics or
/// overruns the capture timeout contributes its fallback label.
async fn acquire_signals(ctx: &CaptureContext) -> (String, String) {
    let face = Arc::clone(&ctx.face);
    let voice = Arc::clone(&ctx.voice);

    let face_task = tokio::task::spawn_blocking(move || face.capture());
    let voice_task = tokio::task::spawn_blocking(move || voice.capture());

    let (face_label, voice_label) = tokio::join!(
        bounded(ctx, face_task, ctx.face.as_ref()),
        bounded(ctx, voice_task, ctx.voice.as_ref()),
    );
    (face_label, voice_label)
}

async fn bounded(
    ctx: &CaptureContext,
    task: tokio::task::JoinHandle<String>,
    producer: &dyn SignalProducer,
) -> String {
    match timeout(ctx.config.capture_timeout, task).await {
        Ok(Ok(label)) => label,
        Ok(Err(err)) => {
            log_warn!(
                "{} producer failed for {}: {err}; using {}",
                producer.name(),
                ctx.username,
                producer.fallback_label()
            );
            producer.fallback_label().to_string()
        }
        Err(_) => {
            log_warn!(
                "{} producer timed out (> {:?}) for {}; using {}",
                producer.name(),
                ctx.config.capture_timeout,
                ctx.username,
                producer.fallback_label()
            );
            producer.fallback_label().to_string()
        }
    }
}

/// Sleep until one period after `tick_start`, waking as soon as the task is cancelled.
async fn wait_for_next_tick(ctx: &CaptureContext, tick_start: Instant) -> LoopState {
    let next_tick = tick_start + ctx.config.period;

    tokio::select! {
        biased;
        _ = ctx.cancel_token.cancelled() => LoopState::Stopping,
        _ = sleep_until(next_tick) => LoopState::Running,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::capture::{
        fusion::WeightedFusion,
        testing::{wait_until, FixedProducer, MemoryStore, PanickingProducer},
    };

    fn context(store: Arc<MemoryStore>, face: Arc<dyn SignalProducer>, period: Duration) -> CaptureContext {
        CaptureContext {
            username: "alice".into(),
            store,
            face,
            voice: Arc::new(FixedProducer::new("angry", "neu")),
            fusion: Arc::new(WeightedFusion::deterministic()),
            config: CaptureConfig {
                period,
                capture_timeout: Duration::from_millis(500),
                jitter: 0.0,
            },
            cancel_token: CancellationToken::new(),
            slot: TaskSlot::detached("alice"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tick_records_fused_sample() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let ctx = context(
            store.clone(),
            Arc::new(FixedProducer::new("angry", "neutral")),
            Duration::from_secs(60),
        );

        assert_eq!(run_tick(&ctx).await, TickOutcome::Recorded);

        let samples = store.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].user_id, 1);
        assert_eq!(samples[0].stress, 0.9);
        assert_eq!(samples[0].fatigue, 0.6);
        assert_eq!(samples[0].attention, 0.25);
        assert_eq!(samples[0].face_label.as_deref(), Some("angry"));
        assert_eq!(samples[0].voice_label.as_deref(), Some("angry"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_producer_falls_back_to_default_label() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let ctx = context(
            store.clone(),
            Arc::new(PanickingProducer { fallback: "neutral" }),
            Duration::from_secs(60),
        );

        assert_eq!(run_tick(&ctx).await, TickOutcome::Recorded);
        assert_eq!(store.samples()[0].face_label.as_deref(), Some("neutral"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn store_failures_do_not_end_the_loop() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        store.fail_next_inserts(1);
        store.fail_next_lookups(1);
        let ctx = context(
            store.clone(),
            Arc::new(FixedProducer::new("calm", "neutral")),
            Duration::from_millis(20),
        );
        let token = ctx.cancel_token.clone();
        let handle = tokio::spawn(capture_loop(ctx));

        // tick 1: lookup fails, tick 2: insert fails, tick 3+: recorded
        assert!(wait_until(Duration::from_secs(5), || store.sample_count() >= 2).await);
        assert!(store.insert_attempts() >= 3);
        assert!(store.lookups() >= 4);
        assert!(!handle.is_finished());

        token.cancel();
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_user_terminates_without_sampling() {
        let store = Arc::new(MemoryStore::default());
        let ctx = context(
            store.clone(),
            Arc::new(FixedProducer::new("calm", "neutral")),
            Duration::from_secs(60),
        );

        timeout(Duration::from_secs(1), capture_loop(ctx)).await.unwrap();
        assert_eq!(store.insert_attempts(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_before_first_tick_touches_nothing() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let ctx = context(
            store.clone(),
            Arc::new(FixedProducer::new("calm", "neutral")),
            Duration::from_secs(60),
        );
        ctx.cancel_token.cancel();

        timeout(Duration::from_secs(1), capture_loop(ctx)).await.unwrap();
        assert_eq!(store.lookups(), 0);
        assert_eq!(store.insert_attempts(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_interrupts_slow_producers() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let ctx = context(
            store.clone(),
            Arc::new(FixedProducer::new("calm", "neutral").with_delay(Duration::from_millis(400))),
            Duration::from_secs(60),
        );
        let token = ctx.cancel_token.clone();
        let handle = tokio::spawn(capture_loop(ctx));

        assert!(wait_until(Duration::from_secs(5), || store.lookups() == 1).await);
        token.cancel();

        timeout(Duration::from_millis(200), handle).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.insert_attempts(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_interrupts_long_wait() {
        let store = Arc::new(MemoryStore::with_employees(&["alice"]));
        let ctx = context(
            store.clone(),
            Arc::new(FixedProducer::new("calm", "neutral")),
            Duration::from_secs(60),
        );
        let token = ctx.cancel_token.clone();
        let handle = tokio::spawn(capture_loop(ctx));

        assert!(wait_until(Duration::from_secs(5), || store.sample_count() == 1).await);
        token.cancel();

        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(store.sample_count(), 1);
    }
}
