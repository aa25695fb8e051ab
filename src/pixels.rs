//! Pixel format descriptors passed through to the foreign module.
//!
//! The foreign engine owns the meaning of these values. The bridge only needs to know how many
//! bytes a pixel occupies so it can size the transfer buffer, and that [`ColorType::Unknown`]
//! never produces data.

use std::fmt::{Display, Formatter};

/// Describes how a pixel's color components are laid out in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ColorType {
    /// Invalid or unspecified format. Reads with this format yield no data.
    #[default]
    Unknown,
    /// Single alpha channel, one byte per pixel.
    Alpha8,
    /// Red, green, blue and alpha, one byte each.
    Rgba8888,
    /// Blue, green, red and alpha, one byte each.
    Bgra8888,
}

impl ColorType {
    /// Number of bytes a single pixel takes in a buffer of this format.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ColorType::Unknown => 0,
            ColorType::Alpha8 => 1,
            ColorType::Rgba8888 | ColorType::Bgra8888 => 4,
        }
    }

    pub fn is_alpha_only(&self) -> bool {
        matches!(self, ColorType::Alpha8)
    }
}

impl Display for ColorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorType::Unknown => write!(f, "Unknown"),
            ColorType::Alpha8 => write!(f, "ALPHA_8"),
            ColorType::Rgba8888 => write!(f, "RGBA_8888"),
            ColorType::Bgra8888 => write!(f, "BGRA_8888"),
        }
    }
}

/// Describes how the alpha channel relates to the color channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AlphaType {
    #[default]
    Unknown,
    /// Every pixel is fully opaque.
    Opaque,
    /// Color channels are already multiplied by alpha.
    Premultiplied,
    /// Color channels are stored independent of alpha.
    Unpremultiplied,
}

/// A transfer too large to address in host memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("pixel buffer of {requested} bytes does not fit in memory")]
pub struct LayoutOverflow {
    /// Bytes the transfer would need
    pub requested: u128,
}

/// Byte layout of one pixel transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelLayout {
    /// Bytes between the start of two consecutive rows
    pub row_bytes: usize,
    /// Total bytes of the transfer (`row_bytes * height`)
    pub length: usize,
}

impl PixelLayout {
    /// Computes the tightly packed layout for a `width` x `height` read in `color`.
    ///
    /// Returns `None` for [`ColorType::Unknown`], which never carries data. Sizes that do not fit
    /// into `usize` are reported as [`LayoutOverflow`].
    pub fn for_format(color: ColorType, width: u32, height: u32) -> Option<Result<Self, LayoutOverflow>> {
        if color == ColorType::Unknown {
            return None;
        }

        let row_bytes = width as u128 * color.bytes_per_pixel() as u128;
        let length = row_bytes * height as u128;

        let layout = match (usize::try_from(row_bytes), usize::try_from(length)) {
            (Ok(row_bytes), Ok(length)) => Ok(PixelLayout { row_bytes, length }),
            _ => Err(LayoutOverflow { requested: length }),
        };

        Some(layout)
    }
}
