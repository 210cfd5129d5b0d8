// THEORY:
// The `BinarySegmenter` turns a graded `ChangeMap` into a hard foreground /
// background decision, then tidies the result with a morphological close so a
// single moving object that the difference image broke into fragments becomes
// one connected region again.
//
// 1.  **Inclusive threshold**: a pixel whose change is `>= threshold` is
//     foreground. Raising the threshold can only shrink the foreground set.
// 2.  **Square structuring element**: dilation and erosion use the chessboard
//     (L-infinity) norm, which is exactly a `k x k` square element.
// 3.  **Pure**: nothing here remembers anything between calls.

use crate::core_modules::change_estimator::ChangeMap;
use crate::core_modules::geometry::Rect;
use crate::error::ConfigError;
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Largest closing element the morphology backend supports (radius 255).
pub const MAX_CLOSE_KERNEL: u32 = 511;

/// A two-valued image: `FOREGROUND` or `BACKGROUND` at every pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    /// Normalizes any gray image into a mask: non-zero becomes foreground.
    pub fn from_image(image: GrayImage) -> Self {
        let mut image = image;
        image
            .pixels_mut()
            .for_each(|p| p.0[0] = if p.0[0] > 0 { FOREGROUND } else { BACKGROUND });
        Self(image)
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        Self(GrayImage::from_fn(width, height, |x, y| {
            Luma([if f(x, y) { FOREGROUND } else { BACKGROUND }])
        }))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y).0[0] == FOREGROUND
    }

    pub fn foreground_count(&self) -> u64 {
        self.0.as_raw().iter().filter(|&&v| v == FOREGROUND).count() as u64
    }

    /// Foreground pixels inside `rect`, clipped to the mask.
    pub fn count_in(&self, rect: Rect) -> u64 {
        let bounds = Rect::new(0, 0, self.width(), self.height());
        let Some(clip) = rect.intersection(&bounds) else {
            return 0;
        };
        (clip.y..clip.bottom())
            .map(|y| {
                (clip.x..clip.right())
                    .filter(|&x| self.is_foreground(x, y))
                    .count() as u64
            })
            .sum()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_image(self) -> GrayImage {
        self.0
    }
}

/// Validates a closing kernel: odd, at least 1, and within backend limits.
pub fn check_close_kernel(kernel_size: u32) -> Result<(), ConfigError> {
    if kernel_size == 0 || kernel_size % 2 == 0 || kernel_size > MAX_CLOSE_KERNEL {
        return Err(ConfigError::InvalidCloseKernel(kernel_size));
    }
    Ok(())
}

/// Marks every pixel with change `>= threshold` as foreground.
pub fn segment(map: &ChangeMap, threshold: u8) -> BinaryMask {
    let image = map.as_image();
    BinaryMask(GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([if image.get_pixel(x, y).0[0] >= threshold {
            FOREGROUND
        } else {
            BACKGROUND
        }])
    }))
}

/// Dilates with a `kernel_size` square, then erodes with the same square when
/// `erode_after` is set. `kernel_size` must have passed `check_close_kernel`.
pub fn morphological_close(mask: &BinaryMask, kernel_size: u32, erode_after: bool) -> BinaryMask {
    let radius = (kernel_size / 2).min(u8::MAX as u32) as u8;
    if radius == 0 {
        return mask.clone();
    }
    let dilated = dilate(&mask.0, Norm::LInf, radius);
    if !erode_after {
        return BinaryMask(dilated);
    }
    BinaryMask(erode(&dilated, Norm::LInf, radius))
}
