use std::time::Duration;

use super::fusion::DEFAULT_JITTER;

/// Timing and noise parameters shared by every capture task.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target spacing between the starts of two consecutive ticks.
    pub period: Duration,

    /// Upper bound on acquiring both signals in one tick.
    pub capture_timeout: Duration,

    /// Half-width of the uniform noise added to stress and fatigue.
    pub jitter: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            capture_timeout: Duration::from_secs(10),
            jitter: DEFAULT_JITTER,
        }
    }
}
