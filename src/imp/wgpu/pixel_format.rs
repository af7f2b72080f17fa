// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::pixel_formats::PixelFormat;

pub trait WgpuPixelFormat {
    fn wgpu_format(self) -> wgpu::TextureFormat;
}

impl WgpuPixelFormat for PixelFormat {
    fn wgpu_format(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            PixelFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            PixelFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
            PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            PixelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        }
    }
}
