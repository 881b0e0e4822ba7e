//! Grayscale frame type and patch preparation — crop, area resize,
//! histogram equalization, dark detection.

use crate::region::FaceRect;
use std::path::Path;

/// Pixels below this value count towards the dark bucket.
const DARK_PIXEL_CEILING: u8 = 32;

/// A grayscale frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes), row-major.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

/// Decode an image file of any supported format to 8-bit grayscale.
pub fn load_gray(path: impl AsRef<Path>) -> Result<Frame, FrameError> {
    let path = path.as_ref();
    let luma = image::open(path)?.to_luma8();
    let (width, height) = luma.dimensions();
    tracing::debug!(path = %path.display(), width, height, "loaded image");
    Frame::new(luma.into_raw(), width, height, 0)
}

/// Check if a frame is dark.
///
/// Returns true if more than `threshold_pct` of pixels fall below 32.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < DARK_PIXEL_CEILING).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

/// Global histogram equalization, in place.
///
/// Maps each level through the normalized CDF so the output spans 0–255.
/// A single-level image is left untouched.
pub fn equalize_hist(gray: &mut [u8]) {
    if gray.is_empty() {
        return;
    }

    let mut hist = [0u32; 256];
    for &p in gray.iter() {
        hist[p as usize] += 1;
    }

    let total = gray.len() as u64;
    let cdf_min = hist.iter().copied().find(|&c| c > 0).map_or(0, u64::from);
    if total == cdf_min {
        return;
    }
    let denom = (total - cdf_min) as f64;

    let mut lut = [0u8; 256];
    let mut cdf = 0u64;
    for (level, &count) in hist.iter().enumerate() {
        cdf += u64::from(count);
        let scaled = (cdf.saturating_sub(cdf_min) as f64 / denom * 255.0).round();
        lut[level] = scaled.clamp(0.0, 255.0) as u8;
    }

    for p in gray.iter_mut() {
        *p = lut[*p as usize];
    }
}

/// Crop `rect` out of `frame` and resample it to `size`×`size` by area
/// averaging.
///
/// Each output pixel is the coverage-weighted mean of the source pixels
/// under its footprint. The rect is clamped to the frame first.
pub fn crop_resize_area(
    frame: &Frame,
    rect: &FaceRect,
    size: u32,
) -> Result<Vec<u8>, FrameError> {
    if size == 0 {
        return Err(FrameError::EmptyRegion(format!("target size 0 for {rect}")));
    }
    let roi = rect.clamp_to(frame.width, frame.height).ok_or_else(|| {
        FrameError::EmptyRegion(format!("{rect} outside {}x{}", frame.width, frame.height))
    })?;

    let w = frame.width as usize;
    let out_size = size as usize;
    let scale_x = roi.width as f64 / size as f64;
    let scale_y = roi.height as f64 / size as f64;

    let x_spans: Vec<Vec<(usize, f64)>> = (0..out_size)
        .map(|ox| coverage(ox, scale_x, roi.x as usize, roi.width as usize))
        .collect();

    let mut out = Vec::with_capacity(out_size * out_size);
    for oy in 0..out_size {
        let y_span = coverage(oy, scale_y, roi.y as usize, roi.height as usize);
        for x_span in &x_spans {
            let mut acc = 0.0f64;
            let mut weight = 0.0f64;
            for &(sy, wy) in &y_span {
                let row = sy * w;
                for &(sx, wx) in x_span {
                    let wgt = wx * wy;
                    acc += f64::from(frame.data[row + sx]) * wgt;
                    weight += wgt;
                }
            }
            let value = if weight > 0.0 { acc / weight } else { 0.0 };
            out.push(value.round().clamp(0.0, 255.0) as u8);
        }
    }

    Ok(out)
}

/// Source pixels (absolute index, overlap) covered by output cell `o`.
fn coverage(o: usize, scale: f64, origin: usize, extent: usize) -> Vec<(usize, f64)> {
    let start = o as f64 * scale;
    let end = (o + 1) as f64 * scale;
    let first = start.floor() as usize;
    let last = (end.ceil() as usize).min(extent).max(first + 1);

    (first..last)
        .filter(|&i| i < extent)
        .map(|i| {
            let overlap = (end.min((i + 1) as f64) - start.max(i as f64)).max(0.0);
            (origin + i, overlap)
        })
        .filter(|&(_, overlap)| overlap > 0.0)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("empty face region: {0}")]
    EmptyRegion(String),
    #[error("image decode: {0}")]
    Image(#[from] image::ImageError),
}
