//! Fuses a face label and a voice label into a stress/fatigue/attention estimate.
//!
//! Each label is looked up in a stress table and a fatigue table; the two readings are
//! averaged, perturbed by a small uniform jitter, clamped to `[0, 1]` and rounded to two
//! decimals. Attention is derived from the clamped stress and fatigue.

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FACE_LABEL: &str = "neutral";
pub const DEFAULT_VOICE_LABEL: &str = "neu";
pub const DEFAULT_JITTER: f64 = 0.05;

const UNKNOWN_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CognitiveState {
    pub stress: f64,
    pub fatigue: f64,
    pub attention: f64,
}

/// Maps a pair of emotion labels to a cognitive state. Implementations must accept any
/// input, including missing labels, and never fail.
pub trait FusionPolicy: Send + Sync {
    fn fuse(&self, face: Option<&str>, voice: Option<&str>) -> CognitiveState;
}

/// Table-driven fusion with optional uniform jitter.
#[derive(Debug, Clone, Copy)]
pub struct WeightedFusion {
    jitter: f64,
}

impl WeightedFusion {
    pub fn new(jitter: f64) -> Self {
        let jitter = if jitter.is_finite() { jitter.abs() } else { 0.0 };
        Self { jitter }
    }

    /// Fusion without noise, for reproducible output.
    pub fn deterministic() -> Self {
        Self::new(0.0)
    }
}

impl Default for WeightedFusion {
    fn default() -> Self {
        Self::new(DEFAULT_JITTER)
    }
}

impl FusionPolicy for WeightedFusion {
    fn fuse(&self, face: Option<&str>, voice: Option<&str>) -> CognitiveState {
        fuse(face, voice, self.jitter)
    }
}

pub fn fuse(face: Option<&str>, voice: Option<&str>, jitter: f64) -> CognitiveState {
    let noise = if jitter > 0.0 {
        let mut rng = rand::thread_rng();
        (
            rng.gen_range(-jitter..=jitter),
            rng.gen_range(-jitter..=jitter),
        )
    } else {
        (0.0, 0.0)
    };

    combine(face, voice, noise)
}

fn combine(face: Option<&str>, voice: Option<&str>, noise: (f64, f64)) -> CognitiveState {
    let face = normalize(face, DEFAULT_FACE_LABEL);
    let voice = normalize(voice, DEFAULT_VOICE_LABEL);

    let stress = (stress_weight(&face) + stress_weight(&voice)) / 2.0 + noise.0;
    let fatigue = (fatigue_weight(&face) + fatigue_weight(&voice)) / 2.0 + noise.1;

    let stress = stress.clamp(0.0, 1.0);
    let fatigue = fatigue.clamp(0.0, 1.0);
    let attention = (1.0 - (stress + fatigue) / 2.0).clamp(0.0, 1.0);

    CognitiveState {
        stress: round2(stress),
        fatigue: round2(fatigue),
        attention: round2(attention),
    }
}

fn normalize(label: Option<&str>, default: &str) -> String {
    match label {
        Some(raw) if !raw.is_empty() => raw.to_lowercase(),
        _ => default.to_string(),
    }
}

fn stress_weight(label: &str) -> f64 {
    match label {
        "angry" => 0.9,
        "fear" => 0.8,
        "sad" | "disgust" => 0.7,
        "neutral" | "neu" => 0.3,
        "happy" | "calm" => 0.2,
        "surprise" => 0.5,
        _ => UNKNOWN_WEIGHT,
    }
}

fn fatigue_weight(label: &str) -> f64 {
    match label {
        "sad" => 0.8,
        "fear" => 0.7,
        "angry" => 0.6,
        "disgust" => 0.5,
        "neutral" | "neu" => 0.4,
        "surprise" | "calm" => 0.3,
        "happy" => 0.2,
        _ => UNKNOWN_WEIGHT,
    }
}

/// Round to two decimals from the exact binary value: 0.7249999... becomes 0.72, not
/// the 0.73 that scaling by 100 first would give.
fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}
