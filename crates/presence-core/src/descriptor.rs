//! Local binary pattern (LBP) histogram descriptor.
//!
//! Every interior pixel is encoded by comparing its eight neighbours to
//! its own intensity, and the 256-bin histogram of those codes is
//! L2-normalized into a [`Descriptor`].

use crate::types::{Descriptor, DESCRIPTOR_LEN};
use thiserror::Error;

/// Patch side length of the reference configuration.
pub const DEFAULT_PATCH_SIZE: u32 = 100;

/// Smallest side that still leaves an interior pixel.
const MIN_PATCH_DIM: u32 = 3;

/// Neighbour offsets (dx, dy), clockwise from top-left. The first entry
/// lands in the most significant bit of the code.
const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1), // top-left
    (0, -1),  // top
    (1, -1),  // top-right
    (1, 0),   // right
    (1, 1),   // bottom-right
    (0, 1),   // bottom
    (-1, 1),  // bottom-left
    (-1, 0),  // left
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("invalid patch: {0}")]
    InvalidInput(String),
    #[error("descriptor must have {expected} bins, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Raw LBP code histogram over the interior of a `width`×`height` patch.
///
/// The outermost ring of pixels is skipped. Identical input always yields
/// an identical histogram.
pub fn lbp_histogram(
    patch: &[u8],
    width: u32,
    height: u32,
) -> Result<[u32; DESCRIPTOR_LEN], DescriptorError> {
    if width < MIN_PATCH_DIM || height < MIN_PATCH_DIM {
        return Err(DescriptorError::InvalidInput(format!(
            "patch must be at least {MIN_PATCH_DIM}x{MIN_PATCH_DIM}, got {width}x{height}"
        )));
    }

    let w = width as usize;
    let h = height as usize;
    let expected = w.checked_mul(h).ok_or_else(|| {
        DescriptorError::InvalidInput(format!("patch dimensions {width}x{height} overflow"))
    })?;
    if patch.len() != expected {
        return Err(DescriptorError::InvalidInput(format!(
            "expected {expected} bytes for {width}x{height}, got {}",
            patch.len()
        )));
    }

    let mut hist = [0u32; DESCRIPTOR_LEN];

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = patch[y * w + x];
            let code = NEIGHBOURS.iter().fold(0u8, |code, &(dx, dy)| {
                let nx = x.wrapping_add_signed(dx);
                let ny = y.wrapping_add_signed(dy);
                (code << 1) | u8::from(patch[ny * w + nx] >= center)
            });
            hist[code as usize] += 1;
        }
    }

    Ok(hist)
}

/// Extract an L2-normalized LBP descriptor from a grayscale patch.
///
/// A histogram with zero norm stays all zeros; that is a valid, if
/// degenerate, descriptor rather than an error.
pub fn extract(patch: &[u8], width: u32, height: u32) -> Result<Descriptor, DescriptorError> {
    let hist = lbp_histogram(patch, width, height)?;

    // Counts are integers, so the squared norm is exact in f64.
    let norm = hist
        .iter()
        .map(|&c| f64::from(c) * f64::from(c))
        .sum::<f64>()
        .sqrt();

    let values = if norm > 0.0 {
        hist.iter().map(|&c| (f64::from(c) / norm) as f32).collect()
    } else {
        vec![0.0; DESCRIPTOR_LEN]
    };

    tracing::trace!(width, height, norm, "extracted LBP descriptor");

    Ok(Descriptor::from_raw(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    const SIZE: u32 = DEFAULT_PATCH_SIZE;

    fn patch_from(f: impl Fn(usize, usize) -> u8, w: u32, h: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity((w * h) as usize);
        for y in 0..h as usize {
            for x in 0..w as usize {
                out.push(f(x, y));
            }
        }
        out
    }

    #[test]
    fn test_uniform_patch_is_unit_vector_at_255() {
        let patch = vec![128u8; (SIZE * SIZE) as usize];
        let d = extract(&patch, SIZE, SIZE).unwrap();
        for (i, &v) in d.values().iter().enumerate() {
            if i == 255 {
                assert_eq!(v, 1.0);
            } else {
                assert_eq!(v, 0.0, "bin {i} should be empty");
            }
        }
    }

    #[test]
    fn test_uniform_patch_counts_interior_only() {
        let patch = vec![7u8; (SIZE * SIZE) as usize];
        let hist = lbp_histogram(&patch, SIZE, SIZE).unwrap();
        assert_eq!(hist[255], (SIZE - 2) * (SIZE - 2));
        assert_eq!(hist.iter().sum::<u32>(), (SIZE - 2) * (SIZE - 2));
    }

    #[test]
    fn test_neighbour_order_msb_first() {
        // Center 100; top-left, top-right, bottom-right, bottom-left brighter.
        #[rustfmt::skip]
        let patch = [
            200, 0,   200,
            0,   100, 0,
            200, 0,   200,
        ];
        let hist = lbp_histogram(&patch, 3, 3).unwrap();
        assert_eq!(hist[0b1010_1010], 1);
        assert_eq!(hist.iter().sum::<u32>(), 1);
    }

    #[test]
    fn test_single_neighbour_bits() {
        // Only the left neighbour reaches the center value → least significant bit.
        #[rustfmt::skip]
        let patch = [
            0,  0,  0,
            50, 50, 0,
            0,  0,  0,
        ];
        let hist = lbp_histogram(&patch, 3, 3).unwrap();
        assert_eq!(hist[1], 1);
    }

    #[test]
    fn test_horizontal_gradient_code() {
        // Left column darker, same column equal, right column brighter:
        // TL=0 T=1 TR=1 R=1 BR=1 B=1 BL=0 L=0.
        let patch = patch_from(|x, _| (x * 2) as u8, SIZE, SIZE);
        let hist = lbp_histogram(&patch, SIZE, SIZE).unwrap();
        assert_eq!(hist[0b0111_1100], (SIZE - 2) * (SIZE - 2));
    }

    #[test]
    fn test_extract_is_deterministic() {
        let patch = patch_from(|x, y| ((x * 31 + y * 17) % 251) as u8, SIZE, SIZE);
        let a = extract(&patch, SIZE, SIZE).unwrap();
        let b = extract(&patch, SIZE, SIZE).unwrap();
        let a_bits: Vec<u32> = a.values().iter().map(|v| v.to_bits()).collect();
        let b_bits: Vec<u32> = b.values().iter().map(|v| v.to_bits()).collect();
        assert_eq!(a_bits, b_bits);
    }

    #[test]
    fn test_extract_is_unit_norm() {
        let patch = patch_from(|x, y| ((x * x + 3 * y) % 256) as u8, SIZE, SIZE);
        let d = extract(&patch, SIZE, SIZE).unwrap();
        let sum_sq: f32 = d.values().iter().map(|v| v * v).sum();
        assert_abs_diff_eq!(sum_sq, 1.0, epsilon = 1e-5);
        assert!(d.values().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_non_square_patch() {
        let patch = vec![10u8; 5 * 4];
        let hist = lbp_histogram(&patch, 5, 4).unwrap();
        assert_eq!(hist[255], 3 * 2);
    }

    #[rstest]
    #[case(2, 2)]
    #[case(2, 100)]
    #[case(100, 1)]
    #[case(0, 0)]
    fn test_undersized_patch_rejected(#[case] w: u32, #[case] h: u32) {
        let patch = vec![0u8; (w * h) as usize];
        assert!(matches!(
            extract(&patch, w, h),
            Err(DescriptorError::InvalidInput(_))
        ));
    }

    #[rstest]
    #[case(SIZE as usize * SIZE as usize - 1)]
    #[case(SIZE as usize * SIZE as usize + 1)]
    #[case(0)]
    fn test_length_mismatch_rejected(#[case] len: usize) {
        let patch = vec![0u8; len];
        assert!(matches!(
            extract(&patch, SIZE, SIZE),
            Err(DescriptorError::InvalidInput(_))
        ));
    }
}
