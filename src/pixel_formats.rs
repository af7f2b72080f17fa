// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pixel formats that may cross a process boundary.
//!
//! Unlike a rendering API, a transfer protocol has to put the format on the wire, so formats are
//! a closed enum rather than one type per format.  The set is small: anything a
//! producer wants to hand off must be something every consumer can sample from.

/// Format of a transferable surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4-channel 8-bit normalized.
    Rgba8Unorm,
    /// 4-channel 8-bit normalized with sRGB encoding.
    Rgba8UnormSrgb,
    /// 4-channel 8-bit normalized with sRGB encoding, BGRA order.
    Bgra8UnormSrgb,
    /// Single channel 8-bit normalized.
    R8Unorm,
    /// 4-channel half-precision float.
    Rgba16Float,
    /// 4-channel single-precision float.
    Rgba32Float,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> u8 {
        match self {
            PixelFormat::Rgba8Unorm | PixelFormat::Rgba8UnormSrgb | PixelFormat::Bgra8UnormSrgb => 4,
            PixelFormat::R8Unorm => 1,
            PixelFormat::Rgba16Float => 8,
            PixelFormat::Rgba32Float => 16,
        }
    }
}

/// Dimensions of a surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Size { width, height }
    }

    /// Unpadded byte length of a surface of this size in `format`, or `None` if it doesn't fit
    /// in the address space.
    pub fn byte_len(self, format: PixelFormat) -> Option<usize> {
        usize::try_from(self.width)
            .ok()?
            .checked_mul(usize::try_from(self.height).ok()?)?
            .checked_mul(format.bytes_per_pixel() as usize)
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Size { width, height }
    }
}
