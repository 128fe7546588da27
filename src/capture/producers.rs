use std::{thread, time::Duration};

use rand::{seq::SliceRandom, Rng};

use super::fusion::{DEFAULT_FACE_LABEL, DEFAULT_VOICE_LABEL};

/// A sensor that yields one discrete emotion label per call.
///
/// Calls block for the acquisition time and run on the blocking pool. Implementations
/// must not panic; a failed acquisition should return [`SignalProducer::fallback_label`].
/// The capture loop still substitutes the fallback if a call panics or overruns the
/// capture timeout.
pub trait SignalProducer: Send + Sync {
    fn name(&self) -> &'static str;

    fn fallback_label(&self) -> &'static str;

    fn capture(&self) -> String;
}

const SIMULATED_ACQUISITION: Duration = Duration::from_millis(200);

const FACE_MILD: [&str; 3] = ["happy", "calm", "surprise"];
const FACE_NEGATIVE: [&str; 4] = ["sad", "angry", "fear", "disgust"];
const VOICE_OTHER: [&str; 3] = ["happy", "stress", "angry"];

/// Stand-in face sensor: mostly "neutral", sometimes a mild or negative expression.
#[derive(Debug, Clone)]
pub struct SimulatedFace {
    delay: Duration,
}

impl SimulatedFace {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedFace {
    fn default() -> Self {
        Self::new(SIMULATED_ACQUISITION)
    }
}

impl SignalProducer for SimulatedFace {
    fn name(&self) -> &'static str {
        "face"
    }

    fn fallback_label(&self) -> &'static str {
        DEFAULT_FACE_LABEL
    }

    fn capture(&self) -> String {
        thread::sleep(self.delay);

        let mut rng = rand::thread_rng();
        let roll: f64 = rng.gen();
        let label = if roll < 0.6 {
            DEFAULT_FACE_LABEL
        } else if roll < 0.8 {
            FACE_MILD.choose(&mut rng).copied().unwrap_or(DEFAULT_FACE_LABEL)
        } else {
            FACE_NEGATIVE.choose(&mut rng).copied().unwrap_or(DEFAULT_FACE_LABEL)
        };
        label.to_string()
    }
}

/// Stand-in voice sensor biased towards "neu" and "calm".
#[derive(Debug, Clone)]
pub struct SimulatedVoice {
    delay: Duration,
}

impl SimulatedVoice {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedVoice {
    fn default() -> Self {
        Self::new(SIMULATED_ACQUISITION)
    }
}

impl SignalProducer for SimulatedVoice {
    fn name(&self) -> &'static str {
        "voice"
    }

    fn fallback_label(&self) -> &'static str {
        DEFAULT_VOICE_LABEL
    }

    fn capture(&self) -> String {
        thread::sleep(self.delay);

        let mut rng = rand::thread_rng();
        let roll: f64 = rng.gen();
        let label = if roll < 0.65 {
            DEFAULT_VOICE_LABEL
        } else if roll < 0.85 {
            "calm"
        } else {
            VOICE_OTHER.choose(&mut rng).copied().unwrap_or(DEFAULT_VOICE_LABEL)
        };
        label.to_string()
    }
}
