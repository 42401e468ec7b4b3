//! Drawing helpers that paint directly into a frame's RGBA buffer.

use crate::{
    geometry::{BoundingBox, Measurement},
    types::{Frame, Landmark},
};

pub const CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (5, 9),
    (9, 13),
    (13, 17),
];

const SKELETON_COLOR: [u8; 4] = [255, 255, 255, 255];
const JOINT_COLOR: [u8; 4] = [255, 0, 0, 255];
const SKELETON_THICKNESS: i32 = 2;
const JOINT_RADIUS: i32 = 3;

const LANDMARK_COLOR: [u8; 4] = [255, 0, 255, 255];
const LANDMARK_RADIUS: i32 = 10;
const BOX_COLOR: [u8; 4] = [0, 255, 0, 255];
const BOX_THICKNESS: i32 = 2;
const ENDPOINT_RADIUS: i32 = 15;
const SEGMENT_COLOR: [u8; 4] = [255, 0, 225, 255];
const MIDPOINT_COLOR: [u8; 4] = [255, 0, 0, 255];

/// Bones and joints of one hand.
pub fn draw_skeleton(frame: &mut Frame, points: &[(i32, i32)]) {
    if points.len() < 2 {
        return;
    }

    for &(a, b) in CONNECTIONS {
        if let (Some(pa), Some(pb)) = (points.get(a), points.get(b)) {
            draw_line(frame, *pa, *pb, SKELETON_COLOR, SKELETON_THICKNESS);
        }
    }
    for &p in points {
        draw_circle(frame, p, JOINT_RADIUS, JOINT_COLOR);
    }
}

/// A filled dot on every pixel-space landmark.
pub fn draw_landmarks(frame: &mut Frame, landmarks: &[Landmark]) {
    for lm in landmarks {
        draw_circle(frame, lm.position(), LANDMARK_RADIUS, LANDMARK_COLOR);
    }
}

pub fn draw_bounding_box(frame: &mut Frame, bbox: &BoundingBox) {
    let corners = bbox.corners();
    for i in 0..corners.len() {
        let next = corners[(i + 1) % corners.len()];
        draw_line(frame, corners[i], next, BOX_COLOR, BOX_THICKNESS);
    }
}

/// Both endpoints, the segment between them, and its midpoint.
pub fn draw_measurement(frame: &mut Frame, a: &Landmark, b: &Landmark, m: &Measurement) {
    draw_circle(frame, a.position(), ENDPOINT_RADIUS, LANDMARK_COLOR);
    draw_circle(frame, b.position(), ENDPOINT_RADIUS, LANDMARK_COLOR);
    draw_line(frame, a.position(), b.position(), SEGMENT_COLOR, 2);
    draw_circle(frame, m.midpoint, ENDPOINT_RADIUS, MIDPOINT_COLOR);
}

fn draw_line(frame: &mut Frame, p0: (i32, i32), p1: (i32, i32), color: [u8; 4], thickness: i32) {
    let radius = ((thickness.max(1) - 1) / 2) as i64;
    let (w, h) = (frame.width as i64, frame.height as i64);
    let (mut x0, mut y0) = (p0.0 as i64, p0.1 as i64);
    let (x1, y1) = (p1.0 as i64, p1.1 as i64);

    // Entirely beside the frame on one side: nothing to rasterize.
    if (x0.max(x1) + radius < 0)
        || (y0.max(y1) + radius < 0)
        || (x0.min(x1) - radius >= w)
        || (y0.min(y1) - radius >= h)
    {
        return;
    }

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_pixel_safe(frame, x0, y0, color);
        if radius > 0 {
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                        put_pixel_safe(frame, x0 + ox, y0 + oy, color);
                    }
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(frame: &mut Frame, center: (i32, i32), radius: i32, color: [u8; 4]) {
    let (cx, cy) = (center.0 as i64, center.1 as i64);
    let r = radius as i64;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                put_pixel_safe(frame, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel_safe(frame: &mut Frame, x: i64, y: i64, color: [u8; 4]) {
    if x < 0 || y < 0 || x >= frame.width as i64 || y >= frame.height as i64 {
        return;
    }
    let idx = ((y as usize) * (frame.width as usize) + x as usize) * 4;
    if let Some(px) = frame.rgba.get_mut(idx..idx + 4) {
        px.copy_from_slice(&color);
    }
}
