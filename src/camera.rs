//! Frame sources: a live webcam (behind the `camera-nokhwa` feature) and a
//! list of image files.

use std::{collections::VecDeque, path::PathBuf};

use anyhow::{Context, Result};

use crate::types::Frame;

pub trait FrameSource {
    /// Blocks until the next frame is available. `Ok(None)` means the source
    /// is exhausted.
    fn read(&mut self) -> Result<Option<Frame>>;
}

/// Replays still images from disk, one per `read`.
pub struct ImageFileSource {
    paths: VecDeque<PathBuf>,
}

impl ImageFileSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageFileSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .with_context(|| format!("failed to open image {}", path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        log::debug!("loaded {} ({width}x{height})", path.display());
        Ok(Some(Frame::from_rgba(image.into_raw(), width, height)))
    }
}

#[cfg(feature = "camera-nokhwa")]
pub use self::webcam::{CameraDevice, CameraSource, available_cameras};

#[cfg(feature = "camera-nokhwa")]
mod webcam {
    use anyhow::{Result, anyhow};
    use nokhwa::{
        Camera,
        pixel_format::RgbFormat,
        query,
        utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    };

    use super::FrameSource;
    use crate::{
        rgba_converter::{self, PixelFormat},
        types::Frame,
    };

    // Prefer pixel formats that are widely supported on macOS (the built-in cameras
    // often reject YUYV even though Nokhwa reports it).
    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::RAWRGB,
        FrameFormat::RAWBGR,
        FrameFormat::GRAY,
        FrameFormat::YUYV,
        FrameFormat::NV12,
        FrameFormat::MJPEG,
    ];

    fn requested_formats() -> [RequestedFormat<'static>; 3] {
        [
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestFrameRate,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    fn pixel_format(format: FrameFormat) -> PixelFormat {
        match format {
            FrameFormat::NV12 => PixelFormat::Nv12,
            FrameFormat::YUYV => PixelFormat::Yuyv,
            FrameFormat::MJPEG => PixelFormat::Mjpeg,
            FrameFormat::RAWRGB => PixelFormat::Rgb,
            FrameFormat::RAWBGR => PixelFormat::Bgr,
            FrameFormat::GRAY => PixelFormat::Gray,
        }
    }

    #[derive(Clone, Debug)]
    pub struct CameraDevice {
        pub index: u32,
        pub label: String,
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>> {
        let cameras = query(ApiBackend::Auto)?;
        Ok(cameras
            .into_iter()
            .filter_map(|info| {
                let index = info.index().as_index().ok()?;
                Some(CameraDevice {
                    index,
                    label: info.human_name(),
                })
            })
            .collect())
    }

    /// A webcam read synchronously, one frame per `read`.
    pub struct CameraSource {
        camera: Camera,
    }

    impl CameraSource {
        pub fn open(index: u32) -> Result<Self> {
            let index = CameraIndex::Index(index);
            let mut last_err = None;

            for requested in requested_formats() {
                match Camera::new(index.clone(), requested) {
                    Ok(mut camera) => match camera.open_stream() {
                        Ok(()) => {
                            log::info!(
                                "opened camera {} at {:?}",
                                camera.info().human_name(),
                                camera.camera_format()
                            );
                            return Ok(Self { camera });
                        }
                        Err(err) => last_err = Some(err.into()),
                    },
                    Err(err) => last_err = Some(err.into()),
                }
            }

            Err(last_err
                .unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
        }
    }

    impl FrameSource for CameraSource {
        fn read(&mut self) -> Result<Option<Frame>> {
            let buffer = self.camera.frame()?;
            let resolution = buffer.resolution();
            let converted = rgba_converter::convert(
                pixel_format(buffer.source_frame_format()),
                buffer.buffer(),
                resolution.width_x,
                resolution.height_y,
            )?;
            Ok(Some(Frame::from_rgba(
                converted.rgba,
                converted.width,
                converted.height,
            )))
        }
    }

    impl Drop for CameraSource {
        fn drop(&mut self) {
            if let Err(err) = self.camera.stop_stream() {
                log::warn!("failed to stop camera stream: {err:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_source_reads_each_file_once() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("red.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([255, 0, 0, 255])).save(&path)?;

        let mut source = ImageFileSource::new([&path]);
        assert_eq!(source.remaining(), 1);
        let frame = source.read()?.expect("one frame queued");
        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(frame.pixel(2, 1), Some([255, 0, 0, 255]));
        assert!(source.read()?.is_none());
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut source = ImageFileSource::new(["/definitely/not/here.png"]);
        assert!(source.read().is_err());
    }
}
