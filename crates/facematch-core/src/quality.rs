//! Capture quality feedback for registration samples.
//!
//! Scores one detection on three axes (distance, lighting, angle) and
//! combines them into a weighted 0–100 score. All cutoffs are empirical
//! and live in [`QualityConfig`] so deployments can tune them.

use crate::types::BoundingBox;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Face area / frame area below which the face is too far away.
    pub min_face_ratio: f32,
    /// Face area / frame area above which the face is too close.
    pub max_face_ratio: f32,
    /// Mean face brightness (0–255) below which lighting is too dark.
    pub min_brightness: f32,
    /// Mean face brightness (0–255) above which lighting is too bright.
    pub max_brightness: f32,
    /// Nose offset from the eye midpoint, relative to eye distance, above
    /// which the head counts as turned.
    pub max_turn_ratio: f32,
    pub distance_weight: f32,
    pub lighting_weight: f32,
    pub angle_weight: f32,
    /// Samples scoring below this are not used for registration.
    pub min_overall_score: u8,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_face_ratio: 0.05,
            max_face_ratio: 0.6,
            min_brightness: 60.0,
            max_brightness: 200.0,
            max_turn_ratio: 0.25,
            distance_weight: 0.4,
            lighting_weight: 0.3,
            angle_weight: 0.3,
            min_overall_score: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceLabel {
    TooFar,
    Good,
    TooClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingLabel {
    TooDark,
    Good,
    TooBright,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleLabel {
    Frontal,
    Turned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub distance: DistanceLabel,
    pub lighting: LightingLabel,
    pub angle: AngleLabel,
    /// Weighted average of the per-axis scores, 0–100.
    pub overall_score: u8,
}

impl QualityReport {
    pub fn is_acceptable(&self, config: &QualityConfig) -> bool {
        self.overall_score >= config.min_overall_score
    }
}

/// Score one detection. `brightness` is the mean luma of the face region,
/// if the caller has pixel data; unknown brightness scores as good.
pub fn assess(
    face: &BoundingBox,
    frame_width: u32,
    frame_height: u32,
    brightness: Option<f32>,
    config: &QualityConfig,
) -> QualityReport {
    let (distance, distance_score) = score_distance(face, frame_width, frame_height, config);
    let (lighting, lighting_score) = score_lighting(brightness, config);
    let (angle, angle_score) = score_angle(face, config);

    let total_weight = config.distance_weight + config.lighting_weight + config.angle_weight;
    let overall = if total_weight > 0.0 {
        (distance_score * config.distance_weight
            + lighting_score * config.lighting_weight
            + angle_score * config.angle_weight)
            / total_weight
    } else {
        0.0
    };

    QualityReport {
        distance,
        lighting,
        angle,
        overall_score: overall.round().clamp(0.0, 100.0) as u8,
    }
}

fn score_distance(
    face: &BoundingBox,
    frame_width: u32,
    frame_height: u32,
    config: &QualityConfig,
) -> (DistanceLabel, f32) {
    let frame_area = frame_width as f32 * frame_height as f32;
    if frame_area <= 0.0 {
        return (DistanceLabel::TooFar, 0.0);
    }
    let ratio = face.area() / frame_area;

    if ratio < config.min_face_ratio {
        (DistanceLabel::TooFar, falloff(ratio, config.min_face_ratio))
    } else if ratio > config.max_face_ratio {
        (DistanceLabel::TooClose, falloff(config.max_face_ratio, ratio))
    } else {
        (DistanceLabel::Good, 100.0)
    }
}

fn score_lighting(brightness: Option<f32>, config: &QualityConfig) -> (LightingLabel, f32) {
    let Some(b) = brightness else {
        return (LightingLabel::Good, 100.0);
    };

    if b < config.min_brightness {
        (LightingLabel::TooDark, falloff(b, config.min_brightness))
    } else if b > config.max_brightness {
        (
            LightingLabel::TooBright,
            falloff(255.0 - b, 255.0 - config.max_brightness),
        )
    } else {
        (LightingLabel::Good, 100.0)
    }
}

fn score_angle(face: &BoundingBox, config: &QualityConfig) -> (AngleLabel, f32) {
    let Some([left_eye, right_eye, nose, _, _]) = face.landmarks else {
        return (AngleLabel::Frontal, 100.0);
    };

    let eye_distance = (right_eye.0 - left_eye.0).abs();
    if eye_distance <= f32::EPSILON {
        return (AngleLabel::Turned, 0.0);
    }
    let mid_x = (left_eye.0 + right_eye.0) / 2.0;
    let offset = (nose.0 - mid_x).abs() / eye_distance;

    if offset > config.max_turn_ratio {
        (AngleLabel::Turned, falloff(config.max_turn_ratio, offset))
    } else {
        (AngleLabel::Frontal, 100.0)
    }
}

/// 100 * actual / limit, for an axis that degrades linearly past its limit.
fn falloff(actual: f32, limit: f32) -> f32 {
    if limit <= 0.0 {
        return 0.0;
    }
    (100.0 * actual / limit).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRONTAL: [(f32, f32); 5] = [
        (260.0, 200.0),
        (380.0, 200.0),
        (320.0, 250.0),
        (270.0, 300.0),
        (370.0, 300.0),
    ];

    fn face(width: f32, height: f32, landmarks: Option<[(f32, f32); 5]>) -> BoundingBox {
        BoundingBox { x: 220.0, y: 140.0, width, height, confidence: 0.99, landmarks }
    }

    #[test]
    fn test_good_capture_scores_full() {
        let config = QualityConfig::default();
        let report = assess(&face(200.0, 200.0, Some(FRONTAL)), 640, 480, Some(128.0), &config);
        assert_eq!(report.distance, DistanceLabel::Good);
        assert_eq!(report.lighting, LightingLabel::Good);
        assert_eq!(report.angle, AngleLabel::Frontal);
        assert_eq!(report.overall_score, 100);
        assert!(report.is_acceptable(&config));
    }

    #[test]
    fn test_small_face_is_too_far() {
        let config = QualityConfig::default();
        // 40x40 on 640x480 → ratio ≈ 0.0052
        let report = assess(&face(40.0, 40.0, None), 640, 480, None, &config);
        assert_eq!(report.distance, DistanceLabel::TooFar);
        assert!(report.overall_score < 100);
    }

    #[test]
    fn test_huge_face_is_too_close() {
        let config = QualityConfig::default();
        let report = assess(&face(600.0, 470.0, None), 640, 480, None, &config);
        assert_eq!(report.distance, DistanceLabel::TooClose);
    }

    #[test]
    fn test_dark_and_turned_rejected() {
        let config = QualityConfig::default();
        let turned = [
            (260.0, 200.0),
            (380.0, 200.0),
            (400.0, 250.0),
            (270.0, 300.0),
            (370.0, 300.0),
        ];
        let report = assess(&face(200.0, 200.0, Some(turned)), 640, 480, Some(10.0), &config);
        assert_eq!(report.lighting, LightingLabel::TooDark);
        assert_eq!(report.angle, AngleLabel::Turned);
        assert!(!report.is_acceptable(&config), "score {}", report.overall_score);
    }

    #[test]
    fn test_overexposed() {
        let config = QualityConfig::default();
        let report = assess(&face(200.0, 200.0, None), 640, 480, Some(250.0), &config);
        assert_eq!(report.lighting, LightingLabel::TooBright);
    }

    #[test]
    fn test_zero_sized_frame() {
        let config = QualityConfig::default();
        let report = assess(&face(10.0, 10.0, None), 0, 0, None, &config);
        assert_eq!(report.distance, DistanceLabel::TooFar);
    }

    #[test]
    fn test_config_from_partial_toml() {
        let config: QualityConfig = toml::from_str("min_overall_score = 75\nmax_turn_ratio = 0.1").unwrap();
        assert_eq!(config.min_overall_score, 75);
        assert!((config.max_turn_ratio - 0.1).abs() < 1e-6);
        assert!((config.min_face_ratio - 0.05).abs() < 1e-6);
    }
}
