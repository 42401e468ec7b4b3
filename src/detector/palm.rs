use std::{cmp::Ordering, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::common::{CropRegion, LetterboxInfo, PALM_INPUT_SIZE, prepare_frame_with_size, rotation_between};
use crate::types::Frame;

const PALM_LANDMARKS: usize = 7;
const PALM_WRIST: usize = 0;
const PALM_MIDDLE_MCP: usize = 2;

/// Feature map strides of the palm model's SSD heads. Consecutive layers with
/// the same stride share one grid.
const ANCHOR_STRIDES: [u32; 4] = [8, 16, 16, 16];
const ANCHORS_PER_LAYER: usize = 2;
const ANCHOR_OFFSET: f32 = 0.5;

#[derive(Clone, Debug)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub landmarks: Vec<(f32, f32)>,
    pub score: f32,
}

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 2,
        }
    }
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: generate_anchors(PALM_INPUT_SIZE),
            cfg,
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = prepare_frame_with_size(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let box_and_landmarks = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;

        decode_palm_outputs(
            box_and_landmarks
                .as_slice()
                .ok_or_else(|| anyhow!("palm boxes not contiguous"))?,
            box_and_landmarks.shape(),
            scores
                .as_slice()
                .ok_or_else(|| anyhow!("palm scores not contiguous"))?,
            scores.shape(),
            &self.anchors,
            &letterbox,
            &self.cfg,
        )
    }
}

/// SSD anchor centers, in normalized input coordinates, ordered row by row
/// and cell by cell the way the model emits its predictions.
pub fn generate_anchors(input_size: u32) -> Vec<[f32; 2]> {
    let mut anchors = Vec::new();
    let mut layer = 0;
    while layer < ANCHOR_STRIDES.len() {
        let stride = ANCHOR_STRIDES[layer];
        let mut per_cell = 0;
        while layer < ANCHOR_STRIDES.len() && ANCHOR_STRIDES[layer] == stride {
            per_cell += ANCHORS_PER_LAYER;
            layer += 1;
        }

        let grid = input_size.div_ceil(stride);
        for y in 0..grid {
            for x in 0..grid {
                let cx = (x as f32 + ANCHOR_OFFSET) / grid as f32;
                let cy = (y as f32 + ANCHOR_OFFSET) / grid as f32;
                anchors.extend(std::iter::repeat_n([cx, cy], per_cell));
            }
        }
    }
    anchors
}

fn decode_palm_outputs(
    box_landmark: &[f32],
    box_shape: &[usize],
    scores: &[f32],
    score_shape: &[usize],
    anchors: &[[f32; 2]],
    letterbox: &LetterboxInfo,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    if box_shape.len() < 3 {
        return Err(anyhow!(
            "unexpected palm box shape {:?}, need [batch, anchors, features]",
            box_shape
        ));
    }
    if score_shape.len() < 3 {
        return Err(anyhow!(
            "unexpected palm score shape {:?}, need [batch, anchors, 1]",
            score_shape
        ));
    }

    let anchor_dim = box_shape[box_shape.len() - 2];
    let feature_dim = box_shape[box_shape.len() - 1];
    let score_anchor_dim = score_shape[score_shape.len() - 2];
    let score_feature_dim = score_shape[score_shape.len() - 1];

    if feature_dim < 4 + PALM_LANDMARKS * 2 {
        return Err(anyhow!("palm box feature dimension too small: {feature_dim}"));
    }
    if anchor_dim != score_anchor_dim {
        return Err(anyhow!(
            "anchor dimension mismatch between boxes ({anchor_dim}) and scores ({score_anchor_dim})"
        ));
    }
    if box_landmark.len() < anchor_dim * feature_dim || scores.len() < anchor_dim * score_feature_dim
    {
        return Err(anyhow!("palm outputs shorter than their declared shapes"));
    }

    let pad_bias_x = letterbox.pad_x / letterbox.scale;
    let pad_bias_y = letterbox.pad_y / letterbox.scale;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let target_input = PALM_INPUT_SIZE as f32;

    let mut candidates = Vec::new();
    for (anchor_idx, anchor) in anchors.iter().enumerate().take(anchor_dim) {
        let score = sigmoid(scores[anchor_idx * score_feature_dim]);
        if score < cfg.score_threshold {
            continue;
        }

        let feature = &box_landmark[anchor_idx * feature_dim..(anchor_idx + 1) * feature_dim];
        let cx = feature[0] / target_input + anchor[0];
        let cy = feature[1] / target_input + anchor[1];
        let hw = feature[2] / target_input / 2.0;
        let hh = feature[3] / target_input / 2.0;

        let mut bbox = [
            (cx - hw) * scale - pad_bias_x,
            (cy - hh) * scale - pad_bias_y,
            (cx + hw) * scale - pad_bias_x,
            (cy + hh) * scale - pad_bias_y,
        ];
        if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
            continue;
        }
        clamp_box(&mut bbox, letterbox.orig_w, letterbox.orig_h);

        let landmarks = feature[4..4 + PALM_LANDMARKS * 2]
            .chunks_exact(2)
            .map(|p| {
                (
                    (p[0] / target_input + anchor[0]) * scale - pad_bias_x,
                    (p[1] / target_input + anchor[1]) * scale - pad_bias_y,
                )
            })
            .collect();

        candidates.push(PalmRegion {
            bbox,
            landmarks,
            score,
        });
    }

    let kept = nms(&candidates, cfg.nms_threshold, cfg.top_k);
    Ok(kept
        .into_iter()
        .filter_map(|idx| candidates.get(idx).cloned())
        .collect())
}

/// Rotated crop around a detected palm, wide enough to hold the fingers.
pub fn crop_from_palm(region: &PalmRegion) -> CropRegion {
    let center = if region.landmarks.is_empty() {
        (
            (region.bbox[0] + region.bbox[2]) * 0.5,
            (region.bbox[1] + region.bbox[3]) * 0.5,
        )
    } else {
        let (sum_x, sum_y) = region
            .landmarks
            .iter()
            .fold((0.0_f32, 0.0_f32), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        (
            sum_x / region.landmarks.len() as f32,
            sum_y / region.landmarks.len() as f32,
        )
    };

    let base_w = (region.bbox[2] - region.bbox[0]).abs();
    let base_h = (region.bbox[3] - region.bbox[1]).abs();
    let landmark_span = if region.landmarks.is_empty() {
        0.0
    } else {
        let (min_x, max_x, min_y, max_y) = region
            .landmarks
            .iter()
            .fold((f32::MAX, f32::MIN, f32::MAX, f32::MIN), |acc, (x, y)| {
                (acc.0.min(*x), acc.1.max(*x), acc.2.min(*y), acc.3.max(*y))
            });
        (max_x - min_x).max(max_y - min_y)
    };
    // Expand generously to avoid cropping fingers away.
    let side = base_w.max(base_h).max(landmark_span).max(80.0) * 2.4;

    let angle = match (
        region.landmarks.get(PALM_WRIST),
        region.landmarks.get(PALM_MIDDLE_MCP),
    ) {
        (Some(wrist), Some(mcp)) => rotation_between(*wrist, *mcp),
        _ => 0.0,
    };

    CropRegion {
        center,
        side,
        angle,
    }
}

fn nms(candidates: &[PalmRegion], threshold: f32, top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        candidates[*b]
            .score
            .partial_cmp(&candidates[*a].score)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    'outer: for &idx in &order {
        if keep.len() >= top_k {
            break;
        }
        for &k in &keep {
            if iou(&candidates[idx].bbox, &candidates[k].bbox) >= threshold {
                continue 'outer;
            }
        }
        keep.push(idx);
    }
    keep
}

pub(crate) fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn clamp_box(bbox: &mut [f32; 4], w: u32, h: u32) {
    let max_w = (w.saturating_sub(1)) as f32;
    let max_h = (h.saturating_sub(1)) as f32;
    bbox[0] = bbox[0].clamp(0.0, max_w);
    bbox[1] = bbox[1].clamp(0.0, max_h);
    bbox[2] = bbox[2].clamp(0.0, max_w);
    bbox[3] = bbox[3].clamp(0.0, max_h);
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEATURES: usize = 18;

    fn identity_letterbox(size: u32) -> LetterboxInfo {
        LetterboxInfo {
            scale: PALM_INPUT_SIZE as f32 / size as f32,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: size,
            orig_h: size,
        }
    }

    #[test]
    fn anchor_grid_matches_palm_model() {
        let anchors = generate_anchors(PALM_INPUT_SIZE);
        assert_eq!(anchors.len(), 2016);
        assert!((anchors[0][0] - 0.5 / 24.0).abs() < 1e-6);
        assert_eq!(anchors[0], anchors[1]);
        // First anchor of the 12x12 grid, six per cell.
        assert!((anchors[1152][0] - 0.5 / 12.0).abs() < 1e-6);
        assert_eq!(anchors[1152], anchors[1157]);
        assert_ne!(anchors[1152], anchors[1158]);
    }

    #[test]
    fn decodes_confident_anchor_and_suppresses_duplicate() {
        let anchors = generate_anchors(PALM_INPUT_SIZE);
        let n = anchors.len();
        let mut boxes = vec![0.0_f32; n * FEATURES];
        let mut scores = vec![-10.0_f32; n];

        // Cell (12, 12) of the stride-8 grid holds anchors 600 and 601.
        for (idx, logit) in [(600usize, 8.0_f32), (601, 4.0)] {
            scores[idx] = logit;
            boxes[idx * FEATURES + 2] = 19.2;
            boxes[idx * FEATURES + 3] = 19.2;
        }
        boxes[600 * FEATURES + 4 + PALM_MIDDLE_MCP * 2 + 1] = -19.2;

        let cfg = PalmDetectorConfig::default();
        let regions = decode_palm_outputs(
            &boxes,
            &[1, n, FEATURES],
            &scores,
            &[1, n, 1],
            &anchors,
            &identity_letterbox(192),
            &cfg,
        )
        .unwrap();

        assert_eq!(regions.len(), 1);
        let palm = &regions[0];
        assert!(palm.score > 0.99);
        assert!((palm.bbox[0] - 90.4).abs() < 1e-3);
        assert!((palm.bbox[2] - 109.6).abs() < 1e-3);
        assert_eq!(palm.landmarks.len(), PALM_LANDMARKS);
        assert!((palm.landmarks[PALM_MIDDLE_MCP].1 - 80.8).abs() < 1e-3);

        let crop = crop_from_palm(palm);
        assert!(crop.angle.abs() < 1e-6);
        assert!(crop.side >= 80.0 * 2.4);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let anchors = generate_anchors(PALM_INPUT_SIZE);
        let cfg = PalmDetectorConfig::default();
        let err = decode_palm_outputs(
            &[0.0; 36],
            &[1, 2, FEATURES],
            &[0.0; 3],
            &[1, 3, 1],
            &anchors,
            &identity_letterbox(192),
            &cfg,
        );
        assert!(err.is_err());
        assert!(
            decode_palm_outputs(&[], &[2, FEATURES], &[], &[1, 2, 1], &anchors, &identity_letterbox(192), &cfg)
                .is_err()
        );
    }

    #[test]
    fn nms_honors_top_k() {
        let region = |x: f32, score: f32| PalmRegion {
            bbox: [x, 0.0, x + 10.0, 10.0],
            landmarks: Vec::new(),
            score,
        };
        let candidates = vec![region(0.0, 0.6), region(50.0, 0.9), region(100.0, 0.7)];
        assert_eq!(nms(&candidates, 0.3, 2), vec![1, 2]);
        assert_eq!(nms(&candidates, 0.3, 5), vec![1, 2, 0]);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
        assert!((iou(&a, &[5.0, 0.0, 15.0, 10.0]) - 1.0 / 3.0).abs() < 1e-6);
    }
}
