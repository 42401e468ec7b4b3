use std::time::Instant;

use crate::rgba_converter;

/// Number of keypoints the hand landmark model reports per hand.
pub const NUM_LANDMARKS: usize = 21;

/// Fingertip landmark ids: thumb, index, middle, ring, pinky.
pub const TIP_IDS: [usize; 5] = [
    landmark_id::THUMB_TIP,
    landmark_id::INDEX_FINGER_TIP,
    landmark_id::MIDDLE_FINGER_TIP,
    landmark_id::RING_FINGER_TIP,
    landmark_id::PINKY_TIP,
];

/// Landmark ids in the hand model's fixed ordering.
pub mod landmark_id {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_FINGER_MCP: usize = 5;
    pub const INDEX_FINGER_PIP: usize = 6;
    pub const INDEX_FINGER_DIP: usize = 7;
    pub const INDEX_FINGER_TIP: usize = 8;
    pub const MIDDLE_FINGER_MCP: usize = 9;
    pub const MIDDLE_FINGER_PIP: usize = 10;
    pub const MIDDLE_FINGER_DIP: usize = 11;
    pub const MIDDLE_FINGER_TIP: usize = 12;
    pub const RING_FINGER_MCP: usize = 13;
    pub const RING_FINGER_PIP: usize = 14;
    pub const RING_FINGER_DIP: usize = 15;
    pub const RING_FINGER_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;
}

/// One captured image, always stored as tightly packed RGBA.
#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn from_rgba(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Builds a frame from packed 3-channel RGB bytes.
    pub fn from_rgb(data: &[u8], width: u32, height: u32) -> anyhow::Result<Self> {
        let rgba = rgba_converter::raw_rgb_to_rgba(data, width, height)?;
        Ok(Self::from_rgba(rgba, width, height))
    }

    /// Builds a frame from packed 3-channel BGR bytes (the usual capture
    /// ordering), swapping red and blue on the way in.
    pub fn from_bgr(data: &[u8], width: u32, height: u32) -> anyhow::Result<Self> {
        let rgba = rgba_converter::raw_bgr_to_rgba(data, width, height)?;
        Ok(Self::from_rgba(rgba, width, height))
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 4;
        self.rgba
            .get(idx..idx + 4)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
    Unknown,
}

impl Handedness {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.5 {
            Handedness::Right
        } else if score > 0.0 {
            Handedness::Left
        } else {
            Handedness::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "left",
            Handedness::Right => "right",
            Handedness::Unknown => "unknown",
        }
    }
}

/// A detector-space keypoint; `x` and `y` are fractions of the image size.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl NormalizedLandmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// All landmarks for one detected hand in one frame.
#[derive(Clone, Debug)]
pub struct HandObservation {
    pub landmarks: Vec<NormalizedLandmark>,
    pub score: f32,
    pub handedness: Handedness,
}

impl HandObservation {
    pub fn new(landmarks: Vec<NormalizedLandmark>) -> Self {
        Self {
            landmarks,
            score: 1.0,
            handedness: Handedness::Unknown,
        }
    }
}

/// A landmark mapped into pixel space of the source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Landmark {
    pub id: usize,
    pub x: i32,
    pub y: i32,
}

impl Landmark {
    pub fn new(id: usize, x: i32, y: i32) -> Self {
        Self { id, x, y }
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tip_ids_follow_model_ordering() {
        assert_eq!(TIP_IDS, [4, 8, 12, 16, 20]);
        assert_eq!(landmark_id::PINKY_TIP + 1, NUM_LANDMARKS);
    }

    #[test]
    fn from_bgr_swaps_red_and_blue() {
        let bgr = [10u8, 20, 30, 40, 50, 60];
        let frame = Frame::from_bgr(&bgr, 2, 1).unwrap();
        assert_eq!(frame.pixel(0, 0), Some([30, 20, 10, 255]));
        assert_eq!(frame.pixel(1, 0), Some([60, 50, 40, 255]));
        assert_eq!(frame.pixel(2, 0), None);
    }

    #[test]
    fn from_rgb_rejects_short_buffer() {
        assert!(Frame::from_rgb(&[1, 2, 3], 2, 2).is_err());
    }

    #[test]
    fn handedness_from_score() {
        assert_eq!(Handedness::from_score(0.9), Handedness::Right);
        assert_eq!(Handedness::from_score(0.2), Handedness::Left);
        assert_eq!(Handedness::from_score(0.0), Handedness::Unknown);
    }
}
