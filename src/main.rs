use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Parser;
use image::RgbaImage;

use hand_tracker::{
    DetectorConfig, Frame, HandObservation, HandTracker, ModelPaths, OrtHandDetector,
    camera::{FrameSource, ImageFileSource},
    find_distance, find_position, fingers_up,
    types::landmark_id,
};

/// Consecutive camera read failures tolerated before giving up.
const MAX_READ_FAILURES: u32 = 30;
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "hand-tracker")]
#[command(about = "Track hands from a webcam or images and overlay landmarks", long_about = None)]
#[command(version)]
struct Cli {
    /// Camera index to capture from
    #[arg(long, default_value_t = 0)]
    camera: u32,

    /// Read these images instead of a camera
    #[arg(long, num_args = 1..)]
    input: Vec<PathBuf>,

    /// Write annotated frames here as PNG
    #[arg(long, short)]
    output_dir: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Maximum number of hands to report per frame
    #[arg(long, default_value_t = 2)]
    max_hands: usize,

    /// Minimum palm detection score
    #[arg(long, default_value_t = 1.0)]
    detection_confidence: f32,

    /// Minimum landmark presence score
    #[arg(long, default_value_t = 0.5)]
    tracking_confidence: f32,

    /// Run palm detection on every frame
    #[arg(long)]
    static_image_mode: bool,

    /// Skip all overlays
    #[arg(long)]
    no_draw: bool,

    #[arg(long)]
    handpose_model: Option<PathBuf>,

    #[arg(long)]
    palm_model: Option<PathBuf>,
}

impl Cli {
    fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            static_image_mode: self.static_image_mode,
            max_hands: self.max_hands,
            detection_confidence: self.detection_confidence,
            tracking_confidence: self.tracking_confidence,
        }
    }

    fn model_paths(&self) -> ModelPaths {
        let defaults = ModelPaths::default();
        ModelPaths {
            handpose: self.handpose_model.clone().unwrap_or(defaults.handpose),
            palm: self.palm_model.clone().unwrap_or(defaults.palm),
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let detector = OrtHandDetector::new(cli.detector_config(), &cli.model_paths())?;
    let mut tracker = HandTracker::new(detector);
    let mut source = open_source(&cli)?;

    if let Some(dir) = &cli.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    }

    let draw = !cli.no_draw;
    let mut frame_no: u64 = 0;
    let mut read_failures: u32 = 0;
    let mut last_tick = Instant::now();

    while cli.max_frames.is_none_or(|max| frame_no < max) {
        let mut frame = match source.read() {
            Ok(Some(frame)) => {
                read_failures = 0;
                frame
            }
            Ok(None) => break,
            Err(err) => {
                log::warn!("frame read failed: {err:?}");
                read_failures += 1;
                match read_failure_action(read_failures, !cli.input.is_empty()) {
                    ReadAction::Retry => {
                        thread::sleep(READ_RETRY_DELAY);
                        continue;
                    }
                    ReadAction::Stop => break,
                    ReadAction::GiveUp => {
                        anyhow::bail!("camera failed {read_failures} reads in a row")
                    }
                }
            }
        };

        let hands = match tracker.find_hands(&mut frame, draw) {
            Ok(hands) => hands,
            Err(err) => {
                log::warn!("hand detection failed: {err:?}");
                Vec::new()
            }
        };
        if let Err(err) = report_first_hand(&mut frame, &hands, draw) {
            log::warn!("skipping hand measurements for frame {frame_no}: {err}");
        }

        let now = Instant::now();
        let elapsed = now.duration_since(last_tick).as_secs_f64();
        last_tick = now;
        if elapsed > 0.0 {
            log::info!("frame {frame_no}: {} hand(s), {:.0} fps", hands.len(), 1.0 / elapsed);
        }

        if let Some(dir) = &cli.output_dir {
            let path = dir.join(format!("frame_{frame_no:05}.png"));
            if let Err(err) = save_frame(&frame, &path) {
                log::warn!("{err:?}");
            }
        }
        frame_no += 1;
    }

    log::info!("processed {frame_no} frame(s)");
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum ReadAction {
    Retry,
    Stop,
    GiveUp,
}

/// A bad image file ends the run; a camera gets a bounded number of retries.
fn read_failure_action(consecutive_failures: u32, reading_files: bool) -> ReadAction {
    if reading_files {
        ReadAction::Stop
    } else if consecutive_failures >= MAX_READ_FAILURES {
        ReadAction::GiveUp
    } else {
        ReadAction::Retry
    }
}

/// Logs the thumb tip, finger states and thumb-index distance of hand 0.
fn report_first_hand(frame: &mut Frame, hands: &[HandObservation], draw: bool) -> Result<()> {
    let landmarks = find_position(frame, hands, 0, draw)?;
    let Some(thumb_tip) = landmarks.get(landmark_id::THUMB_TIP) else {
        return Ok(());
    };
    log::info!("landmark 4 at ({}, {})", thumb_tip.x, thumb_tip.y);

    let fingers = fingers_up(&landmarks)?;
    let pinch = find_distance(
        frame,
        &landmarks,
        landmark_id::THUMB_TIP,
        landmark_id::INDEX_FINGER_TIP,
        draw,
    )?;
    log::info!(
        "fingers {:?} ({} up), thumb-index distance {:.1}px",
        fingers.as_bits(),
        fingers.count_up(),
        pinch.length
    );
    Ok(())
}

fn open_source(cli: &Cli) -> Result<Box<dyn FrameSource>> {
    if !cli.input.is_empty() {
        return Ok(Box::new(ImageFileSource::new(cli.input.clone())));
    }
    open_camera(cli.camera)
}

#[cfg(feature = "camera-nokhwa")]
fn open_camera(index: u32) -> Result<Box<dyn FrameSource>> {
    match hand_tracker::camera::available_cameras() {
        Ok(devices) => {
            for device in devices {
                log::info!("camera {}: {}", device.index, device.label);
            }
        }
        Err(err) => log::warn!("failed to list cameras: {err:?}"),
    }
    Ok(Box::new(hand_tracker::camera::CameraSource::open(index)?))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn open_camera(_index: u32) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("built without camera support; pass --input <image>")
}

fn save_frame(frame: &Frame, path: &Path) -> Result<()> {
    let image = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .context("frame buffer does not match its dimensions")?;
    image
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hand_tracker::{HandError, NormalizedLandmark, types::NUM_LANDMARKS};

    #[test]
    fn camera_failures_are_bounded() {
        assert_eq!(read_failure_action(1, false), ReadAction::Retry);
        assert_eq!(read_failure_action(MAX_READ_FAILURES - 1, false), ReadAction::Retry);
        assert_eq!(read_failure_action(MAX_READ_FAILURES, false), ReadAction::GiveUp);
        assert_eq!(read_failure_action(1, true), ReadAction::Stop);
    }

    #[test]
    fn bad_landmarks_are_reported_not_fatal() {
        let mut frame = Frame::from_rgba(vec![0; 64 * 64 * 4], 64, 64);
        let mut hand = HandObservation::new(vec![NormalizedLandmark::new(0.5, 0.5, 0.0); NUM_LANDMARKS]);
        hand.landmarks[8].x = f32::NAN;

        let err = report_first_hand(&mut frame, &[hand], true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HandError>(),
            Some(HandError::InvalidInput(_))
        ));
        assert!(report_first_hand(&mut frame, &[], true).is_ok());
    }
}
