//! presence-frame — Turns camera frames into face patches.
//!
//! Everything between a grayscale frame plus a detector rectangle and
//! the fixed-size patch the recognition core consumes: largest-face
//! selection, crop with area resampling, histogram equalization,
//! dark-frame rejection and frame sampling.

pub mod frame;
pub mod region;
pub mod sampler;

pub use frame::{crop_resize_area, equalize_hist, is_dark_frame, load_gray, Frame, FrameError};
pub use region::{largest_face, FaceRect};
pub use sampler::FrameSampler;
