// THEORY:
// The `Preprocessor` reduces a raw frame to the form the change estimators want:
// usually a single luminance channel, lightly smoothed so that sensor noise does
// not survive as speckle in the difference image.
//
// Key principles:
// 1.  **Pure**: `reduce` is a function of the frame and the options only.
// 2.  **Deterministic luminance**: gray conversion uses the Rec. 601 luma
//     weights in fixed-point integer arithmetic, so the same RGB triple always
//     maps to the same gray level on every platform.
// 3.  **No out-of-bounds reads**: smoothing is `imageproc`'s separable
//     convolution, which replicates edge samples instead of reading past the
//     frame.
// 4.  **Validated kernels**: a `Smoothing` can only be built with an odd kernel
//     size >= 1, so `reduce` itself can never fail.

use crate::core_modules::frame::{ChannelLayout, Frame};
use crate::error::ConfigError;
use image::{ImageBuffer, Luma, Pixel, Rgb};
use imageproc::filter::separable_filter_equal;
use serde::{Deserialize, Serialize};

/// Rec. 601 luma weights scaled by 1000.
const LUMA_WEIGHTS: [u32; 3] = [299, 587, 114];

/// The smoothing kernel shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingKind {
    Box,
    Gaussian,
}

#[derive(Deserialize)]
struct RawSmoothing {
    kind: SmoothingKind,
    kernel_size: u32,
}

/// A validated smoothing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSmoothing")]
pub struct Smoothing {
    kind: SmoothingKind,
    kernel_size: u32,
}

impl TryFrom<RawSmoothing> for Smoothing {
    type Error = ConfigError;

    fn try_from(raw: RawSmoothing) -> Result<Self, Self::Error> {
        Smoothing::new(raw.kind, raw.kernel_size)
    }
}

impl Smoothing {
    /// Fails with `InvalidKernelSize` unless `kernel_size` is odd and at least 1.
    pub fn new(kind: SmoothingKind, kernel_size: u32) -> Result<Self, ConfigError> {
        if kernel_size == 0 || kernel_size % 2 == 0 {
            return Err(ConfigError::InvalidKernelSize(kernel_size));
        }
        Ok(Self { kind, kernel_size })
    }

    pub fn gaussian(kernel_size: u32) -> Result<Self, ConfigError> {
        Self::new(SmoothingKind::Gaussian, kernel_size)
    }

    pub fn box_filter(kernel_size: u32) -> Result<Self, ConfigError> {
        Self::new(SmoothingKind::Box, kernel_size)
    }

    pub fn kind(&self) -> SmoothingKind {
        self.kind
    }

    pub fn kernel_size(&self) -> u32 {
        self.kernel_size
    }

    /// Normalized 1D weights. Gaussian sigma is derived from the kernel size the
    /// same way common vision libraries do when sigma is left unspecified.
    fn weights(&self) -> Vec<f32> {
        let size = self.kernel_size as usize;
        match self.kind {
            SmoothingKind::Box => vec![1.0 / size as f32; size],
            SmoothingKind::Gaussian => {
                let sigma = 0.3 * ((self.kernel_size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
                let centre = (size / 2) as f64;
                let raw: Vec<f64> = (0..size)
                    .map(|i| {
                        let d = i as f64 - centre;
                        (-(d * d) / (2.0 * sigma * sigma)).exp()
                    })
                    .collect();
                let sum: f64 = raw.iter().sum();
                raw.into_iter().map(|w| (w / sum) as f32).collect()
            }
        }
    }
}

/// What `reduce` does to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    /// Collapse RGB frames to one luminance channel.
    pub grayscale: bool,
    /// Optional blur applied after the gray conversion.
    pub smoothing: Option<Smoothing>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            grayscale: true,
            smoothing: None,
        }
    }
}

/// Rec. 601 luma of one RGB triple, rounded to nearest.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let weighted =
        LUMA_WEIGHTS[0] * r as u32 + LUMA_WEIGHTS[1] * g as u32 + LUMA_WEIGHTS[2] * b as u32;
    ((weighted + 500) / 1000) as u8
}

/// Collapses an RGB frame to gray. Gray frames are returned unchanged.
pub fn to_gray(frame: &Frame) -> Frame {
    match frame.layout() {
        ChannelLayout::Gray => frame.clone(),
        ChannelLayout::Rgb => {
            let data = frame
                .as_bytes()
                .chunks_exact(3)
                .map(|px| luma(px[0], px[1], px[2]))
                .collect();
            Frame::from_raw_parts(frame.width(), frame.height(), ChannelLayout::Gray, data)
        }
    }
}

/// Separable convolution of every channel with edge replication.
pub fn smooth(frame: &Frame, smoothing: &Smoothing) -> Frame {
    if smoothing.kernel_size == 1 || frame.is_empty() {
        return frame.clone();
    }

    let weights = smoothing.weights();
    let data = match frame.layout() {
        ChannelLayout::Gray => convolve::<Luma<f32>>(frame, &weights),
        ChannelLayout::Rgb => convolve::<Rgb<f32>>(frame, &weights),
    };
    match data {
        Some(data) => Frame::from_raw_parts(frame.width(), frame.height(), frame.layout(), data),
        None => frame.clone(),
    }
}

/// Filters in `f32` and rounds once at the end, so the 8-bit output carries
/// no truncation from the intermediate pass.
fn convolve<P>(frame: &Frame, weights: &[f32]) -> Option<Vec<u8>>
where
    P: Pixel<Subpixel = f32>,
{
    let samples: Vec<f32> = frame.as_bytes().iter().map(|&v| v as f32).collect();
    let image = ImageBuffer::<P, Vec<f32>>::from_raw(frame.width(), frame.height(), samples)?;
    let filtered = separable_filter_equal(&image, weights);
    Some(
        filtered
            .into_raw()
            .into_iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect(),
    )
}

/// Applies the configured reductions in order: gray conversion, then smoothing.
pub fn reduce(frame: &Frame, options: &PreprocessOptions) -> Frame {
    let reduced = if options.grayscale {
        to_gray(frame)
    } else {
        frame.clone()
    };
    match &options.smoothing {
        Some(smoothing) => smooth(&reduced, smoothing),
        None => reduced,
    }
}
