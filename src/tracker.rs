//! Per-frame detection pass and the helpers a demo loop calls on its result.
//!
//! Nothing here outlives a frame: `find_hands` returns the detector's
//! observations and the caller passes them on explicitly.

use crate::{
    detector::LandmarkDetector,
    error::Result,
    geometry::{self, BoundingBox, Measurement},
    overlay,
    types::{Frame, HandObservation, Landmark},
};

pub struct HandTracker<D> {
    detector: D,
}

impl<D: LandmarkDetector> HandTracker<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Runs the detector once and returns its hands unchanged, optionally
    /// painting each hand's skeleton onto `frame`.
    pub fn find_hands(&mut self, frame: &mut Frame, draw: bool) -> anyhow::Result<Vec<HandObservation>> {
        let hands = self.detector.detect(frame)?;
        log::trace!("detector returned {} hand(s)", hands.len());

        if draw {
            for hand in &hands {
                match geometry::map_to_pixels(hand, frame.width, frame.height) {
                    Ok(landmarks) => {
                        let points: Vec<(i32, i32)> =
                            landmarks.iter().map(Landmark::position).collect();
                        overlay::draw_skeleton(frame, &points);
                    }
                    Err(err) => log::debug!("skipping skeleton overlay: {err}"),
                }
            }
        }

        Ok(hands)
    }
}

/// Pixel landmarks of hand `hand_no`, or an empty list when that hand was
/// not detected. With `draw`, marks every landmark and the padded box around
/// the hand.
pub fn find_position(
    frame: &mut Frame,
    hands: &[HandObservation],
    hand_no: usize,
    draw: bool,
) -> Result<Vec<Landmark>> {
    let Some(hand) = hands.get(hand_no) else {
        return Ok(Vec::new());
    };

    let landmarks = geometry::map_to_pixels(hand, frame.width, frame.height)?;
    if draw {
        let bbox = geometry::bounding_box(&landmarks, BoundingBox::DEFAULT_MARGIN)?;
        overlay::draw_bounding_box(frame, &bbox);
        overlay::draw_landmarks(frame, &landmarks);
    }
    Ok(landmarks)
}

/// Measures between landmarks `id1` and `id2` of one hand, optionally
/// drawing the segment and its midpoint.
pub fn find_distance(
    frame: &mut Frame,
    landmarks: &[Landmark],
    id1: usize,
    id2: usize,
    draw: bool,
) -> Result<Measurement> {
    let measurement = geometry::find_distance(landmarks, id1, id2)?;
    if draw {
        overlay::draw_measurement(frame, &landmarks[id1], &landmarks[id2], &measurement);
    }
    Ok(measurement)
}
