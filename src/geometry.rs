//! Pixel-space geometry over hand landmarks.

use crate::{
    error::{HandError, Result},
    types::{HandObservation, Landmark, NUM_LANDMARKS, NormalizedLandmark},
};

/// Maps one normalized landmark to pixel coordinates.
///
/// Coordinates are truncated toward zero, so a landmark sitting exactly on
/// the right or bottom edge (`1.0`) maps to `width` / `height`. Points off
/// the image are kept as long as they fit in `i32` pixel space.
pub fn to_pixel(lm: &NormalizedLandmark, id: usize, width: u32, height: u32) -> Result<Landmark> {
    check_dimensions(width, height)?;
    if !lm.x.is_finite() || !lm.y.is_finite() {
        return Err(HandError::invalid(format!(
            "landmark {id} has non-finite coordinates ({}, {})",
            lm.x, lm.y
        )));
    }
    let x = scale_axis(lm.x, width)
        .ok_or_else(|| HandError::invalid(format!("landmark {id} x={} is out of pixel range", lm.x)))?;
    let y = scale_axis(lm.y, height)
        .ok_or_else(|| HandError::invalid(format!("landmark {id} y={} is out of pixel range", lm.y)))?;
    Ok(Landmark::new(id, x, y))
}

fn scale_axis(value: f32, extent: u32) -> Option<i32> {
    let scaled = (value as f64 * extent as f64).trunc();
    (scaled >= i32::MIN as f64 && scaled <= i32::MAX as f64).then_some(scaled as i32)
}

/// Maps a whole hand into pixel space, keeping landmark order as ids.
pub fn map_to_pixels(hand: &HandObservation, width: u32, height: u32) -> Result<Vec<Landmark>> {
    check_dimensions(width, height)?;
    check_count(hand.landmarks.len())?;
    hand.landmarks
        .iter()
        .enumerate()
        .map(|(id, lm)| to_pixel(lm, id, width, height))
        .collect()
}

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(HandError::invalid(format!(
            "image dimensions must be positive, got {width}x{height}"
        )));
    }
    Ok(())
}

pub(crate) fn check_count(len: usize) -> Result<()> {
    if len != NUM_LANDMARKS {
        return Err(HandError::invalid(format!(
            "expected {NUM_LANDMARKS} landmarks, got {len}"
        )));
    }
    Ok(())
}

/// Length of the segment between two landmarks and its midpoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub length: f64,
    pub midpoint: (i32, i32),
}

/// Euclidean distance between two pixel landmarks. The midpoint uses floor
/// division on each axis.
pub fn distance(a: &Landmark, b: &Landmark) -> Measurement {
    let dx = (b.x as f64) - (a.x as f64);
    let dy = (b.y as f64) - (a.y as f64);
    Measurement {
        length: dx.hypot(dy),
        midpoint: (
            (a.x as i64 + b.x as i64).div_euclid(2) as i32,
            (a.y as i64 + b.y as i64).div_euclid(2) as i32,
        ),
    }
}

/// Looks up two landmarks of one hand by id and measures between them.
pub fn find_distance(landmarks: &[Landmark], id1: usize, id2: usize) -> Result<Measurement> {
    let a = lookup(landmarks, id1)?;
    let b = lookup(landmarks, id2)?;
    Ok(distance(a, b))
}

fn lookup(landmarks: &[Landmark], id: usize) -> Result<&Landmark> {
    landmarks.get(id).ok_or_else(|| {
        HandError::invalid(format!(
            "landmark {id} out of range for hand with {} landmarks",
            landmarks.len()
        ))
    })
}

/// Axis-aligned box in pixel space, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    pub const DEFAULT_MARGIN: i32 = 20;

    /// Grows the box by `margin` on every side; a negative margin shrinks it.
    pub fn expand(&self, margin: i32) -> Self {
        Self {
            x_min: self.x_min.saturating_sub(margin),
            y_min: self.y_min.saturating_sub(margin),
            x_max: self.x_max.saturating_add(margin),
            y_max: self.y_max.saturating_add(margin),
        }
    }

    pub fn width(&self) -> i32 {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> i32 {
        self.y_max.saturating_sub(self.y_min)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }

    pub fn corners(&self) -> [(i32, i32); 4] {
        [
            (self.x_min, self.y_min),
            (self.x_max, self.y_min),
            (self.x_max, self.y_max),
            (self.x_min, self.y_max),
        ]
    }
}

/// Bounds every landmark of a hand in a single pass and pads the result by
/// `margin` pixels on each side.
pub fn bounding_box(landmarks: &[Landmark], margin: i32) -> Result<BoundingBox> {
    let Some(first) = landmarks.first() else {
        return Err(HandError::invalid(
            "cannot bound a hand observation with no landmarks",
        ));
    };

    let tight = landmarks.iter().skip(1).fold(
        BoundingBox {
            x_min: first.x,
            y_min: first.y,
            x_max: first.x,
            y_max: first.y,
        },
        |acc, lm| BoundingBox {
            x_min: acc.x_min.min(lm.x),
            y_min: acc.y_min.min(lm.y),
            x_max: acc.x_max.max(lm.x),
            y_max: acc.y_max.max(lm.y),
        },
    );

    Ok(tight.expand(margin))
}
