// THEORY:
// The `Frame` module is the most fundamental unit of the vision system. A `Frame`
// is a "dumb" data container: an owned, row-major buffer of 8-bit samples with
// either one (gray) or three (RGB) channels per pixel. It knows how to describe
// itself and how to hand out views of its samples, but it performs no analysis.
//
// Key principles:
// 1.  **Immutable once built**: every stage takes a `&Frame` and returns a new
//     one. Nothing downstream ever mutates a frame that another stage can see.
// 2.  **Source agnostic**: frames are built from raw bytes or from `image`
//     buffers. Where they came from (file, decoder, camera) is not recorded.
// 3.  **Shape as identity**: a pipeline locks onto the `FrameShape` of the first
//     frame it sees, so the shape is its own small value type.

use crate::core_modules::geometry::Rect;
use crate::error::VisionError;
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How many samples make up one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    Gray,
    Rgb,
}

impl ChannelLayout {
    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Gray => 1,
            ChannelLayout::Rgb => 3,
        }
    }
}

/// Dimensions plus channel layout. Two frames are compatible iff their shapes match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
    pub layout: ChannelLayout,
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = match self.layout {
            ChannelLayout::Gray => "gray",
            ChannelLayout::Rgb => "rgb",
        };
        write!(f, "{}x{} {}", self.width, self.height, layout)
    }
}

/// An owned 2D array of 8-bit samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The width of the frame in pixels.
    width: u32,
    /// The height of the frame in pixels.
    height: u32,
    /// Samples per pixel.
    layout: ChannelLayout,
    /// Row-major samples, `width * height * layout.channels()` long.
    data: Vec<u8>,
}

impl Frame {
    /// Wraps a raw sample buffer, checking that its length matches the shape.
    pub fn new(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        data: Vec<u8>,
    ) -> Result<Self, VisionError> {
        let expected = width as usize * height as usize * layout.channels();
        if data.len() != expected {
            return Err(VisionError::MalformedBuffer {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// Internal constructor for stages that already produced a correctly sized buffer.
    pub(crate) fn from_raw_parts(width: u32, height: u32, layout: ChannelLayout, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * layout.channels());
        Self {
            width,
            height,
            layout,
            data,
        }
    }

    /// A frame where every sample holds `value`.
    pub fn filled(width: u32, height: u32, layout: ChannelLayout, value: u8) -> Self {
        Self {
            width,
            height,
            layout,
            data: vec![value; width as usize * height as usize * layout.channels()],
        }
    }

    /// Builds a frame by evaluating `sample(x, y, channel)` for every sample.
    pub fn from_fn(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        mut sample: impl FnMut(u32, u32, usize) -> u8,
    ) -> Self {
        let channels = layout.channels();
        let mut data = Vec::with_capacity(width as usize * height as usize * channels);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    data.push(sample(x, y, c));
                }
            }
        }
        Self {
            width,
            height,
            layout,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape {
            width: self.width,
            height: self.height,
            layout: self.layout,
        }
    }

    /// True when the frame has no pixels at all.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// The samples of pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let channels = self.channels();
        let start = (y as usize * self.width as usize + x as usize) * channels;
        &self.data[start..start + channels]
    }

    /// One row of samples.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * self.channels();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Copies out the sub-region `rect`. The rectangle must lie inside the frame.
    pub fn crop(&self, rect: Rect) -> Frame {
        debug_assert!(rect.fits_within(self.width, self.height));
        let channels = self.channels();
        let mut data = Vec::with_capacity(rect.area() as usize * channels);
        for y in rect.y..rect.bottom() {
            let row = self.row(y);
            data.extend_from_slice(&row[rect.x as usize * channels..rect.right() as usize * channels]);
        }
        Frame {
            width: rect.width,
            height: rect.height,
            layout: self.layout,
            data,
        }
    }

    /// Gray frames convert losslessly; RGB frames return `None`.
    pub fn to_gray_image(&self) -> Option<GrayImage> {
        match self.layout {
            ChannelLayout::Gray => GrayImage::from_raw(self.width, self.height, self.data.clone()),
            ChannelLayout::Rgb => None,
        }
    }
}

impl From<GrayImage> for Frame {
    fn from(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Frame {
            width,
            height,
            layout: ChannelLayout::Gray,
            data: image.into_raw(),
        }
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Frame {
            width,
            height,
            layout: ChannelLayout::Rgb,
            data: image.into_raw(),
        }
    }
}
