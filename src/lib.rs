//! Webcam hand tracking: frames go to a hand landmark model, and the 21
//! keypoints it returns per hand are turned into pixel positions, bounding
//! boxes, distances, and up/down finger states.

pub mod camera;
pub mod config;
pub mod detector;
pub mod error;
pub mod fingers;
pub mod geometry;
pub mod model_download;
pub mod overlay;
pub mod rgba_converter;
pub mod tracker;
pub mod types;

pub use config::{DetectorConfig, ModelPaths};
pub use detector::{LandmarkDetector, OrtHandDetector};
pub use error::HandError;
pub use fingers::{Finger, FingerStates, fingers_up};
pub use geometry::{BoundingBox, Measurement, bounding_box, distance, map_to_pixels};
pub use tracker::{HandTracker, find_distance, find_position};
pub use types::{Frame, HandObservation, Handedness, Landmark, NormalizedLandmark};
