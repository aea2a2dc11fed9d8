//! Format registry for the supported chroma-subsampled planar formats.
//!
//! All geometry here is byte geometry: a plane's width is the number of bytes in
//! one of its rows. For NV12 the interleaved chroma plane therefore keeps the full
//! luma width (half as many CbCr pairs, two bytes each).

use crate::error::{Result, YuvTexError};
use ash::vk;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Maximum number of planes of any supported format.
pub const MAX_PLANES: usize = 3;

/// Multi-plane 8-bit YCbCr formats that can be uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// 3-plane 4:2:0 (YU12 / I420): Y, then Cb, then Cr at half resolution.
    Yu12,
    /// 2-plane 4:2:0 (NV12): Y, then interleaved CbCr at half height.
    Nv12,
    /// 3-plane 4:2:2 (422P): Y, then Cb, then Cr at half width.
    Yuv422p,
}

/// Width and height of a single plane, in bytes per row and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneExtent {
    pub width: u32,
    pub height: u32,
}

impl PlaneExtent {
    /// Number of bytes the plane occupies when tightly packed.
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl ImageFormat {
    /// Every supported format, in declaration order.
    pub const ALL: [ImageFormat; 3] = [ImageFormat::Yu12, ImageFormat::Nv12, ImageFormat::Yuv422p];

    /// The Vulkan format backing this layout.
    pub fn to_device_format(self) -> vk::Format {
        match self {
            ImageFormat::Yu12 => vk::Format::G8_B8_R8_3PLANE_420_UNORM,
            ImageFormat::Nv12 => vk::Format::G8_B8R8_2PLANE_420_UNORM,
            ImageFormat::Yuv422p => vk::Format::G8_B8_R8_3PLANE_422_UNORM,
        }
    }

    /// Number of planes (2 or 3).
    pub fn plane_count(self) -> usize {
        match self {
            ImageFormat::Yu12 => 3,
            ImageFormat::Nv12 => 2,
            ImageFormat::Yuv422p => 3,
        }
    }

    /// Size in bytes of a tightly packed frame.
    ///
    /// Fails with [`YuvTexError::DeviceImageCreationFailed`] when the size does not
    /// fit in host memory.
    pub fn total_byte_size(self, width: u32, height: u32) -> Result<usize> {
        let luma_size = width as u64 * height as u64;
        let size = match self {
            ImageFormat::Yu12 | ImageFormat::Nv12 => luma_size.checked_mul(3).map(|n| n / 2),
            ImageFormat::Yuv422p => luma_size.checked_mul(2),
        };
        size.and_then(|n| usize::try_from(n).ok()).ok_or_else(|| {
            YuvTexError::DeviceImageCreationFailed(format!(
                "{} frame {}x{} is too large to address",
                self, width, height
            ))
        })
    }

    /// Horizontal and vertical subsampling divisors of a plane.
    pub fn subsampling(self, plane: usize) -> Result<(u32, u32)> {
        let divisors = match (self, plane) {
            (_, 0) => Some((1, 1)),
            (ImageFormat::Yu12, 1 | 2) => Some((2, 2)),
            (ImageFormat::Nv12, 1) => Some((1, 2)),
            (ImageFormat::Yuv422p, 1 | 2) => Some((2, 1)),
            _ => None,
        };
        divisors.ok_or(YuvTexError::InvalidPlane {
            plane,
            plane_count: self.plane_count(),
        })
    }

    /// Geometry of one plane for a frame of `base_width` x `base_height` pixels.
    ///
    /// Odd base dimensions are truncated by the integer division.
    pub fn plane_geometry(self, base_width: u32, base_height: u32, plane: usize) -> Result<PlaneExtent> {
        let (div_x, div_y) = self.subsampling(plane)?;
        Ok(PlaneExtent {
            width: base_width / div_x,
            height: base_height / div_y,
        })
    }

    /// Bytes occupied by one plane in the tightly packed source.
    pub fn plane_byte_size(self, base_width: u32, base_height: u32, plane: usize) -> Result<usize> {
        Ok(self.plane_geometry(base_width, base_height, plane)?.byte_size())
    }

    /// Offset of a plane within the tightly packed source (planes stored back to back).
    pub fn plane_source_offset(self, base_width: u32, base_height: u32, plane: usize) -> Result<usize> {
        // Validate the index itself before summing the planes before it.
        self.subsampling(plane)?;
        (0..plane).try_fold(0usize, |offset, p| {
            Ok(offset + self.plane_byte_size(base_width, base_height, p)?)
        })
    }

    /// Aspect flag addressing a plane of the device image.
    pub fn plane_aspect(self, plane: usize) -> Result<vk::ImageAspectFlags> {
        self.subsampling(plane)?;
        Ok(match plane {
            0 => vk::ImageAspectFlags::PLANE_0,
            1 => vk::ImageAspectFlags::PLANE_1,
            _ => vk::ImageAspectFlags::PLANE_2,
        })
    }

    /// Fourcc-style name of the format.
    pub fn fourcc(self) -> &'static str {
        match self {
            ImageFormat::Yu12 => "YU12",
            ImageFormat::Nv12 => "NV12",
            ImageFormat::Yuv422p => "422P",
        }
    }

    /// Whether a subsampled plane loses a row or column to truncation.
    pub fn truncates(self, width: u32, height: u32) -> bool {
        (0..self.plane_count()).any(|plane| match self.subsampling(plane) {
            Ok((div_x, div_y)) => width % div_x != 0 || height % div_y != 0,
            Err(_) => false,
        })
    }

    pub(crate) fn warn_on_truncation(self, width: u32, height: u32) {
        if self.truncates(width, height) {
            warn!(
                "{} frame {}x{} has odd dimensions, chroma planes are truncated",
                self, width, height
            );
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fourcc())
    }
}

impl FromStr for ImageFormat {
    type Err = YuvTexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "YU12" | "I420" => Ok(ImageFormat::Yu12),
            "NV12" => Ok(ImageFormat::Nv12),
            "422P" => Ok(ImageFormat::Yuv422p),
            _ => Err(YuvTexError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl TryFrom<vk::Format> for ImageFormat {
    type Error = YuvTexError;

    fn try_from(format: vk::Format) -> Result<Self> {
        ImageFormat::ALL
            .into_iter()
            .find(|f| f.to_device_format() == format)
            .ok_or_else(|| YuvTexError::UnsupportedFormat(format!("{:?}", format)))
    }
}
