use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, NUM_LANDMARKS, landmark_id};

pub const HANDPOSE_INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;

/// Crop side relative to the larger extent of the previous frame's landmarks.
const LANDMARK_CROP_SCALE: f32 = 2.0;
const MIN_CROP_SIDE: f32 = 32.0;

#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// Square, rotated region of the source frame fed to the handpose model.
#[derive(Clone, Debug, PartialEq)]
pub struct CropRegion {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
}

#[derive(Clone, Debug)]
pub struct CropTransform {
    pub region: CropRegion,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.width == 0 || frame.height == 0 {
        return Err(anyhow!(
            "frame has empty dimensions {}x{}",
            frame.width,
            frame.height
        ));
    }
    if frame.rgba.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Resizes the frame into a `target_size` square, keeping aspect ratio and
/// padding the short side with black, and normalizes to `[0, 1]` RGB.
pub fn prepare_frame_with_size(
    frame: &Frame,
    target_size: u32,
) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = ((frame.width as f32 * scale).round().max(1.0) as u32).min(target_size);
    let new_h = ((frame.height as f32 * scale).round().max(1.0) as u32).min(target_size);

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size - new_w) / 2) as usize;
    let pad_y = ((target_size - new_h) / 2) as usize;
    let mut canvas = vec![0u8; (target_size as usize) * (target_size as usize) * 4];
    let dst_stride = target_size as usize * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, 3),
        normalized,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

pub fn decode_landmarks(flat: &[f32]) -> Result<Vec<[f32; 3]>> {
    if flat.len() < NUM_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_LANDMARKS * 3
        ));
    }

    Ok(flat
        .chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect())
}

/// Samples a rotated square crop of the frame into an NHWC tensor.
pub fn prepare_rotated_crop(
    frame: &Frame,
    region: &CropRegion,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let half = output_size as f32 / 2.0;
    let scale = region.side / output_size as f32;
    let (sin, cos) = region.angle.sin_cos();

    let data: Vec<f32> = (0..output_size)
        .into_par_iter()
        .flat_map_iter(|y| {
            let dy = (y as f32 + 0.5 - half) * scale;
            (0..output_size).flat_map(move |x| {
                let dx = (x as f32 + 0.5 - half) * scale;
                let src_x = region.center.0 + dx * cos - dy * sin;
                let src_y = region.center.1 + dx * sin + dy * cos;
                sample_rgb(frame, src_x, src_y)
            })
        })
        .collect();

    let array =
        Array4::<f32>::from_shape_vec((1, output_size as usize, output_size as usize, 3), data)
            .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;

    let transform = CropTransform {
        region: region.clone(),
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((array, transform))
}

impl CropTransform {
    /// Maps a point in crop pixel space back onto the source frame.
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.region.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.region.angle.sin_cos();
        let ox = self.region.center.0 + dx * cos - dy * sin;
        let oy = self.region.center.1 + dx * sin + dy * cos;
        (
            ox.clamp(0.0, (self.orig_w.saturating_sub(1)) as f32),
            oy.clamp(0.0, (self.orig_h.saturating_sub(1)) as f32),
        )
    }

    pub fn project_all(&self, landmarks: &[[f32; 3]]) -> Vec<(f32, f32)> {
        landmarks
            .iter()
            .map(|[x, y, _z]| self.project(*x, *y))
            .collect()
    }
}

/// Rotation that turns the `from -> to` direction into "straight up" in
/// the crop.
pub fn rotation_between(from: (f32, f32), to: (f32, f32)) -> f32 {
    let vx = to.0 - from.0;
    let vy = to.1 - from.1;
    if vx.abs() < 1e-6 && vy.abs() < 1e-6 {
        return 0.0;
    }
    vx.atan2(-vy)
}

/// Crop for the next frame, derived from landmarks found in this one.
pub fn crop_from_landmarks(points: &[(f32, f32)]) -> Option<CropRegion> {
    if points.len() < NUM_LANDMARKS {
        return None;
    }

    let (min_x, max_x, min_y, max_y) = points
        .iter()
        .fold((f32::MAX, f32::MIN, f32::MAX, f32::MIN), |acc, (x, y)| {
            (acc.0.min(*x), acc.1.max(*x), acc.2.min(*y), acc.3.max(*y))
        });
    let side = ((max_x - min_x).max(max_y - min_y) * LANDMARK_CROP_SCALE).max(MIN_CROP_SIDE);

    Some(CropRegion {
        center: ((min_x + max_x) * 0.5, (min_y + max_y) * 0.5),
        side,
        angle: rotation_between(
            points[landmark_id::WRIST],
            points[landmark_id::MIDDLE_FINGER_MCP],
        ),
    })
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0, 0.0, 0.0];
    }
    let x0 = x.floor();
    let y0 = y.floor();

    let (w, h) = (frame.width as i32, frame.height as i32);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let ix = cx as i32;
        let iy = cy as i32;
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0, 0.0, 0.0];
        }
        let idx = ((iy as usize) * (frame.width as usize) + ix as usize) * 4;
        match frame.rgba.get(idx..idx + 3) {
            Some(px) => [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ],
            None => [0.0, 0.0, 0.0],
        }
    };

    let fx = x - x0;
    let fy = y - y0;
    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let rgba = (0..width * height)
            .flat_map(|_| [rgb[0], rgb[1], rgb[2], 255])
            .collect();
        Frame::from_rgba(rgba, width, height)
    }

    #[test]
    fn letterbox_pads_short_side() {
        let frame = solid_frame(64, 32, [255, 255, 255]);
        let (input, letterbox) = prepare_frame_with_size(&frame, 16).unwrap();
        assert_eq!(input.shape(), &[1, 16, 16, 3]);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 4.0);
        assert!((letterbox.scale - 0.25).abs() < 1e-6);
        // Padding rows are black, content rows are white.
        assert_eq!(input[[0, 0, 8, 0]], 0.0);
        assert!((input[[0, 8, 8, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let mut frame = solid_frame(4, 4, [0, 0, 0]);
        frame.rgba.pop();
        assert!(prepare_frame_with_size(&frame, 16).is_err());
        let region = CropRegion {
            center: (2.0, 2.0),
            side: 4.0,
            angle: 0.0,
        };
        assert!(prepare_rotated_crop(&frame, &region, 8).is_err());
    }

    #[test]
    fn decode_requires_full_hand() {
        assert!(decode_landmarks(&[0.0; 62]).is_err());
        let flat: Vec<f32> = (0..66).map(|v| v as f32).collect();
        let lms = decode_landmarks(&flat).unwrap();
        assert_eq!(lms.len(), NUM_LANDMARKS);
        assert_eq!(lms[1], [3.0, 4.0, 5.0]);
    }

    #[test]
    fn unrotated_crop_projects_center_to_center() {
        let frame = solid_frame(100, 80, [0, 255, 0]);
        let region = CropRegion {
            center: (50.0, 40.0),
            side: 40.0,
            angle: 0.0,
        };
        let (input, transform) = prepare_rotated_crop(&frame, &region, 20).unwrap();
        assert_eq!(input.shape(), &[1, 20, 20, 3]);
        assert!((input[[0, 10, 10, 1]] - 1.0).abs() < 1e-6);

        let (cx, cy) = transform.project(10.0, 10.0);
        assert!((cx - 50.0).abs() < 1e-4 && (cy - 40.0).abs() < 1e-4);
        let (x0, y0) = transform.project(0.0, 0.0);
        assert!((x0 - 30.0).abs() < 1e-4 && (y0 - 20.0).abs() < 1e-4);
    }

    #[test]
    fn rotation_points_wrist_to_finger_upward() {
        assert!(rotation_between((0.0, 10.0), (0.0, 0.0)).abs() < 1e-6);
        assert!((rotation_between((0.0, 0.0), (10.0, 0.0)) - FRAC_PI_2).abs() < 1e-6);
        assert_eq!(rotation_between((3.0, 3.0), (3.0, 3.0)), 0.0);
    }

    #[test]
    fn landmark_crop_surrounds_hand() {
        let mut points = vec![(100.0_f32, 100.0_f32); NUM_LANDMARKS];
        points[landmark_id::WRIST] = (100.0, 160.0);
        points[landmark_id::MIDDLE_FINGER_TIP] = (100.0, 40.0);
        points[landmark_id::THUMB_TIP] = (60.0, 120.0);

        let crop = crop_from_landmarks(&points).unwrap();
        assert_eq!(crop.center, (80.0, 100.0));
        assert!((crop.side - 240.0).abs() < 1e-4);
        assert!(crop.angle.abs() < 1e-6);
        assert!(crop_from_landmarks(&points[..5]).is_none());
    }
}
