use std::path::PathBuf;

use crate::{
    error::{HandError, Result},
    model_download::{default_handpose_estimator_model_path, default_palm_detector_model_path},
};

/// Palm scores at or above this are effectively unreachable after the sigmoid.
const STRICT_DETECTION_CONFIDENCE: f32 = 0.99;

/// Construction options for a hand landmark detector.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    /// Run palm detection on every frame instead of following hands found
    /// in the previous one.
    pub static_image_mode: bool,
    pub max_hands: usize,
    /// Minimum palm detection score. The default of 1.0 is kept from the
    /// original tool even though it rejects nearly every palm.
    pub detection_confidence: f32,
    /// Minimum landmark presence score for a hand to be reported.
    pub tracking_confidence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            static_image_mode: false,
            max_hands: 2,
            detection_confidence: 1.0,
            tracking_confidence: 0.5,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_hands == 0 {
            return Err(HandError::invalid("max_hands must be at least 1"));
        }
        check_unit("detection_confidence", self.detection_confidence)?;
        check_unit("tracking_confidence", self.tracking_confidence)?;
        Ok(())
    }

    pub fn is_suspiciously_strict(&self) -> bool {
        self.detection_confidence >= STRICT_DETECTION_CONFIDENCE
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(HandError::invalid(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

/// On-disk locations of the two ONNX models behind the bundled detector.
#[derive(Clone, Debug)]
pub struct ModelPaths {
    pub handpose: PathBuf,
    pub palm: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            handpose: default_handpose_estimator_model_path(),
            palm: default_palm_detector_model_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_constructor() {
        let cfg = DetectorConfig::default();
        assert!(!cfg.static_image_mode);
        assert_eq!(cfg.max_hands, 2);
        assert_eq!(cfg.detection_confidence, 1.0);
        assert_eq!(cfg.tracking_confidence, 0.5);
        assert!(cfg.validate().is_ok());
        assert!(cfg.is_suspiciously_strict());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cfg = DetectorConfig {
            max_hands: 0,
            ..DetectorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(HandError::InvalidInput(_))));

        let cfg = DetectorConfig {
            tracking_confidence: 1.5,
            ..DetectorConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = DetectorConfig {
            detection_confidence: f32::NAN,
            ..DetectorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn model_paths_live_under_models_dir() {
        let paths = ModelPaths::default();
        assert!(paths.handpose.starts_with("models"));
        assert!(paths.palm.starts_with("models"));
    }
}
