use std::{cmp::Ordering, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    LandmarkDetector,
    common::{self, CropRegion, HANDPOSE_INPUT_SIZE},
    palm::{PalmDetector, PalmDetectorConfig, crop_from_palm, iou},
};
use crate::{
    config::{DetectorConfig, ModelPaths},
    model_download::{ModelKind, ensure_model_ready_with_progress},
    types::{Frame, HandObservation, Handedness, NormalizedLandmark},
};

/// Two detections of the same hand overlap at least this much.
const DUPLICATE_HAND_IOU: f32 = 0.5;

/// MediaPipe palm detector followed by the handpose estimator, both on
/// ONNX Runtime.
///
/// Outside static image mode the detector follows hands from frame to frame:
/// the crops around last frame's landmarks replace palm detection while the
/// configured number of hands is still in view.
pub struct OrtHandDetector {
    handpose: Session,
    palm_detector: PalmDetector,
    config: DetectorConfig,
    tracked: Vec<CropRegion>,
}

struct EstimatedHand {
    raw: Vec<[f32; 3]>,
    projected: Vec<(f32, f32)>,
    side: f32,
    score: f32,
    handedness: f32,
}

impl EstimatedHand {
    fn bounds(&self) -> [f32; 4] {
        self.projected.iter().fold(
            [f32::MAX, f32::MAX, f32::MIN, f32::MIN],
            |acc, (x, y)| [acc[0].min(*x), acc[1].min(*y), acc[2].max(*x), acc[3].max(*y)],
        )
    }

    fn into_observation(self, width: u32, height: u32) -> HandObservation {
        let (w, h) = (width as f32, height as f32);
        let z_scale = self.side / HANDPOSE_INPUT_SIZE as f32 / w;
        let landmarks = self
            .projected
            .iter()
            .zip(&self.raw)
            .map(|((x, y), raw)| NormalizedLandmark::new(x / w, y / h, raw[2] * z_scale))
            .collect();

        HandObservation {
            landmarks,
            score: self.score,
            handedness: Handedness::from_score(self.handedness),
        }
    }
}

impl OrtHandDetector {
    pub fn new(config: DetectorConfig, models: &ModelPaths) -> Result<Self> {
        config.validate()?;
        if config.is_suspiciously_strict() {
            log::warn!(
                "detection confidence {} leaves almost no palm detections; \
                 pass a lower threshold (0.5-0.7 is typical) if no hands are found",
                config.detection_confidence
            );
        }

        ensure_model_ready_with_progress(ModelKind::HandposeEstimator, &models.handpose)?;
        ensure_model_ready_with_progress(ModelKind::PalmDetector, &models.palm)?;

        let handpose = load_session(&models.handpose)?;
        let palm_detector = PalmDetector::new(
            &models.palm,
            PalmDetectorConfig {
                score_threshold: config.detection_confidence,
                top_k: config.max_hands,
                ..PalmDetectorConfig::default()
            },
        )?;

        log::info!(
            "hand detector ready using {} and palm detector {} (max hands {}, static {})",
            models.handpose.display(),
            models.palm.display(),
            config.max_hands,
            config.static_image_mode
        );

        Ok(Self {
            handpose,
            palm_detector,
            config,
            tracked: Vec::new(),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Forgets hands followed from previous frames.
    pub fn reset_tracking(&mut self) {
        self.tracked.clear();
    }

    fn regions_for(&mut self, frame: &Frame) -> Result<Vec<CropRegion>> {
        let mut regions = if self.config.static_image_mode {
            Vec::new()
        } else {
            std::mem::take(&mut self.tracked)
        };

        if regions.len() < self.config.max_hands {
            let palms = self.palm_detector.detect(frame)?;
            log::debug!("palm detector found {} candidate(s)", palms.len());
            regions.extend(palms.iter().map(crop_from_palm));
        }

        Ok(regions)
    }

    fn estimate(&mut self, frame: &Frame, region: &CropRegion) -> Result<EstimatedHand> {
        let (input, transform) = common::prepare_rotated_crop(frame, region, HANDPOSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run handpose session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("handpose model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let raw = common::decode_landmarks(&flattened)?;

        let first_scalar = |idx: usize| -> f32 {
            if outputs.len() > idx {
                outputs[idx]
                    .try_extract_array::<f32>()
                    .ok()
                    .and_then(|arr| arr.iter().next().copied())
                    .unwrap_or(0.0)
            } else {
                0.0
            }
        };
        let score = first_scalar(1).clamp(0.0, 1.0);
        let handedness = first_scalar(2);

        Ok(EstimatedHand {
            projected: transform.project_all(&raw),
            raw,
            side: region.side,
            score,
            handedness,
        })
    }
}

impl LandmarkDetector for OrtHandDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<HandObservation>> {
        let regions = self.regions_for(frame)?;

        let mut hands = Vec::with_capacity(regions.len());
        for region in &regions {
            let hand = self.estimate(frame, region)?;
            if hand.score >= self.config.tracking_confidence {
                hands.push(hand);
            }
        }

        hands.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        let mut kept: Vec<EstimatedHand> = Vec::with_capacity(self.config.max_hands);
        for hand in hands {
            if kept.len() >= self.config.max_hands {
                break;
            }
            let bounds = hand.bounds();
            if kept
                .iter()
                .any(|other| iou(&bounds, &other.bounds()) >= DUPLICATE_HAND_IOU)
            {
                continue;
            }
            kept.push(hand);
        }

        if !self.config.static_image_mode {
            self.tracked = kept
                .iter()
                .filter_map(|hand| common::crop_from_landmarks(&hand.projected))
                .collect();
        }

        Ok(kept
            .into_iter()
            .map(|hand| hand.into_observation(frame.width, frame.height))
            .collect())
    }
}

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))
}
