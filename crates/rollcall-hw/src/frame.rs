//! Frame type and pixel conversions: YUYV/GREY to RGB, BGR swap, downscale.

use image::imageops::{self, FilterType};
use image::RgbImage;

/// Channel order of a 3-byte-per-pixel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorLayout {
    Rgb,
    Bgr,
}

/// A captured colour frame, 3 bytes per pixel.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: ColorLayout,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Copy of this frame in RGB order.
    pub fn to_rgb(&self) -> Frame {
        let mut out = self.clone();
        if self.layout == ColorLayout::Bgr {
            for px in out.data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            out.layout = ColorLayout::Rgb;
        }
        out
    }

    /// RGB copy scaled by `factor` (each side at least 1 px).
    pub fn downscaled_rgb(&self, factor: f32) -> Result<Frame, FrameError> {
        let rgb = self.to_rgb();
        let width = ((self.width as f32 * factor).round() as u32).max(1);
        let height = ((self.height as f32 * factor).round() as u32).max(1);
        if width == self.width && height == self.height {
            return Ok(rgb);
        }

        let actual = rgb.data.len();
        let img = RgbImage::from_raw(self.width, self.height, rgb.data).ok_or(
            FrameError::InvalidLength {
                expected: Self::expected_len(self.width, self.height),
                actual,
            },
        )?;
        let small = imageops::resize(&img, width, height, FilterType::Triangle);

        Ok(Frame {
            data: small.into_raw(),
            width,
            height,
            layout: ColorLayout::Rgb,
            timestamp: self.timestamp,
            sequence: self.sequence,
        })
    }
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    // BT.601 limited range, integer approximation.
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    [
        clamp_u8((298 * c + 409 * e + 128) >> 8),
        clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp_u8((298 * c + 516 * d + 128) >> 8),
    ]
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V], both pixels sharing U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

/// Replicate an 8-bit grayscale buffer into RGB.
pub fn grey_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize;
    if gray.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: gray.len(),
        });
    }
    Ok(gray[..expected].iter().flat_map(|&p| [p, p, p]).collect())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, layout: ColorLayout, data: Vec<u8>) -> Frame {
        Frame {
            data,
            width,
            height,
            layout,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    #[test]
    fn test_yuyv_white_and_black() {
        // 2x1 image: white pixel then black pixel, neutral chroma
        let yuyv = vec![235, 128, 16, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![255, 255, 255, 0, 0, 0]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128];
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_grey_to_rgb() {
        let rgb = grey_to_rgb(&[7, 200], 2, 1).unwrap();
        assert_eq!(rgb, vec![7, 7, 7, 200, 200, 200]);
    }

    #[test]
    fn test_bgr_to_rgb_swaps_channels() {
        let f = frame(1, 1, ColorLayout::Bgr, vec![1, 2, 3]);
        let rgb = f.to_rgb();
        assert_eq!(rgb.data, vec![3, 2, 1]);
        assert_eq!(rgb.layout, ColorLayout::Rgb);
    }

    #[test]
    fn test_downscale_quarter() {
        let f = frame(8, 4, ColorLayout::Rgb, vec![90; 8 * 4 * 3]);
        let small = f.downscaled_rgb(0.25).unwrap();
        assert_eq!((small.width, small.height), (2, 1));
        assert_eq!(small.data.len(), 2 * 3);
        assert!(small.data.iter().all(|&p| p == 90));
    }

    #[test]
    fn test_downscale_rejects_short_buffer() {
        let f = frame(8, 4, ColorLayout::Rgb, vec![0; 10]);
        assert!(f.downscaled_rgb(0.5).is_err());
    }
}
