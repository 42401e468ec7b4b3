//! Color-space conversion of raw capture buffers into the RGBA layout the
//! rest of the crate works on.

use std::convert::TryFrom;

use anyhow::{Result, anyhow};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

/// Pixel layouts a frame source may hand us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Gray,
    Yuyv,
    Nv12,
    Mjpeg,
}

#[derive(Debug)]
pub struct RgbaFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub fn convert(format: PixelFormat, data: &[u8], width: u32, height: u32) -> Result<RgbaFrame> {
    let rgba = match format {
        PixelFormat::Nv12 => nv12_to_rgba(data, width, height)?,
        PixelFormat::Yuyv => yuyv_to_rgba(data, width, height)?,
        PixelFormat::Mjpeg => return mjpeg_to_rgba(data),
        PixelFormat::Rgb => raw_rgb_to_rgba(data, width, height)?,
        PixelFormat::Bgr => raw_bgr_to_rgba(data, width, height)?,
        PixelFormat::Gray => gray_to_rgba(data, width, height)?,
    };

    Ok(RgbaFrame {
        rgba,
        width,
        height,
    })
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;

    if data.len() < y_plane_len + uv_plane_len {
        return Err(anyhow!(
            "NV12 buffer too small: got {}, expected {}",
            data.len(),
            y_plane_len + uv_plane_len
        ));
    }

    let mut rgba = vec![0u8; y_plane_len * 4];
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 2;
    if data.len() < expected_len {
        return Err(anyhow!(
            "YUYV buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgba = vec![0u8; (width as usize * height as usize) * 4];
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

// MJPEG carries its own dimensions, so they win over whatever the source reported.
fn mjpeg_to_rgba(data: &[u8]) -> Result<RgbaFrame> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder returned no header info"))?;
    let width = u32::from(info.width);
    let height = u32::from(info.height);
    let expected_len = usize::try_from(width)
        .and_then(|w| usize::try_from(height).map(|h| w * h * 4))
        .map_err(|_| anyhow!("MJPEG dimensions do not fit usize"))?;
    if rgba.len() < expected_len {
        return Err(anyhow!(
            "MJPEG decode produced too few bytes: got {}, expected {}",
            rgba.len(),
            expected_len
        ));
    }

    Ok(RgbaFrame {
        rgba,
        width,
        height,
    })
}

pub fn raw_rgb_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    rgb_like_to_rgba(data, width, height, false)
}

pub fn raw_bgr_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    rgb_like_to_rgba(data, width, height, true)
}

fn rgb_like_to_rgba(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 3;
    if data.len() < expected_len {
        return Err(anyhow!(
            "RGB buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgba = vec![0u8; (width as usize * height as usize) * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            if swap_rb {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
            } else {
                dst[..3].copy_from_slice(src);
            }
            dst[3] = 255;
        });

    Ok(rgba)
}

fn gray_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize;
    if data.len() < expected_len {
        return Err(anyhow!(
            "GRAY buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgba = vec![0u8; expected_len * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_iter().copied())
        .for_each(|(dst, value)| {
            dst[..3].fill(value);
            dst[3] = 255;
        });

    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_passes_channels_through() {
        let out = convert(PixelFormat::Rgb, &[1, 2, 3, 4, 5, 6], 2, 1).unwrap();
        assert_eq!(out.rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
        assert_eq!((out.width, out.height), (2, 1));
    }

    #[test]
    fn bgr_is_reordered_to_rgb() {
        let out = convert(PixelFormat::Bgr, &[0, 0, 200], 1, 1).unwrap();
        assert_eq!(out.rgba, vec![200, 0, 0, 255]);
    }

    #[test]
    fn gray_fills_all_channels() {
        let out = convert(PixelFormat::Gray, &[7, 9], 2, 1).unwrap();
        assert_eq!(out.rgba, vec![7, 7, 7, 255, 9, 9, 9, 255]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(convert(PixelFormat::Rgb, &[0; 5], 2, 1).is_err());
        assert!(convert(PixelFormat::Yuyv, &[0; 3], 2, 1).is_err());
        assert!(convert(PixelFormat::Nv12, &[0; 4], 2, 2).is_err());
    }

    #[test]
    fn garbage_mjpeg_fails() {
        assert!(convert(PixelFormat::Mjpeg, &[0, 1, 2, 3], 0, 0).is_err());
    }
}
