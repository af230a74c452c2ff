use serde::{Deserialize, Serialize};

/// Name reported for faces that match no enrolled identity.
pub const UNKNOWN: &str = "Unknown";

/// Bounding box for a detected face, with optional facial landmarks.
///
/// Coordinates are in source-frame pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Centre of the box in frame coordinates.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Fixed-length face descriptor produced by an encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
    /// Model version that produced this descriptor (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Euclidean distance between two descriptors.
    ///
    /// Descriptors of different lengths come from different encoders and are
    /// never comparable: the distance is infinite.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An enrolled person and every descriptor recorded for them, in enrollment order.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub name: String,
    pub descriptors: Vec<Descriptor>,
}

/// A face found in one frame. Never persisted.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub region: BoundingBox,
    pub descriptor: Descriptor,
}

/// Acceptance rules for a nearest-descriptor match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// Maximum distance (inclusive) for a candidate to count as a match.
    pub threshold: f32,
    /// Distance mapped to zero confidence. 2.0 is the largest possible
    /// distance between two L2-normalised descriptors.
    pub distance_scale: f32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            threshold: 1.10,
            distance_scale: 2.0,
        }
    }
}

impl MatchPolicy {
    /// `1 - normalized_distance`, clamped to [0, 1].
    pub fn confidence(&self, distance: f32) -> f32 {
        if self.distance_scale <= 0.0 {
            return if distance <= 0.0 { 1.0 } else { 0.0 };
        }
        (1.0 - distance / self.distance_scale).clamp(0.0, 1.0)
    }
}

/// Outcome of matching one descriptor against the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Matched identity; `None` means unknown.
    pub identity: Option<String>,
    /// Confidence in [0, 1]; 0.0 for unknown faces.
    pub confidence: f32,
}

impl MatchResult {
    pub fn unknown() -> Self {
        Self {
            identity: None,
            confidence: 0.0,
        }
    }

    pub fn known(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            identity: Some(name.into()),
            confidence,
        }
    }

    /// Identity name, or `"Unknown"`.
    pub fn name(&self) -> &str {
        self.identity.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn is_known(&self) -> bool {
        self.identity.is_some()
    }
}

/// Strategy for comparing a probe descriptor against the enrolled identities.
pub trait Matcher {
    fn compare(&self, probe: &Descriptor, gallery: &[Identity], policy: &MatchPolicy) -> MatchResult;
}

/// Linear nearest-distance matcher.
///
/// Scans every descriptor of every identity and keeps the global minimum.
/// Ties keep the earliest identity in enrollment order.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn compare(&self, probe: &Descriptor, gallery: &[Identity], policy: &MatchPolicy) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, identity) in gallery.iter().enumerate() {
            for candidate in &identity.descriptors {
                let distance = probe.distance(candidate);
                if !distance.is_finite() {
                    continue;
                }
                if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                    best = Some((i, distance));
                }
            }
        }

        match best {
            Some((idx, distance)) if distance <= policy.threshold => {
                MatchResult::known(gallery[idx].name.clone(), policy.confidence(distance))
            }
            _ => MatchResult::unknown(),
        }
    }
}
