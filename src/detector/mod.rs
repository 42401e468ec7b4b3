//! The landmark detector seam.
//!
//! Everything past this trait is a black box to the geometry code: a
//! detector takes one frame and hands back zero or more hands, each with 21
//! normalized keypoints in the model's fixed order.

pub mod common;
mod onnx;
pub mod palm;

use crate::types::{Frame, HandObservation};

pub use self::onnx::OrtHandDetector;

pub trait LandmarkDetector {
    /// Runs the model once on `frame`. No hand in view is an empty list,
    /// not an error.
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<HandObservation>>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<HandObservation>> {
        (**self).detect(frame)
    }
}
