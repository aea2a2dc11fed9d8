//! Multi-plane images uploaded from host memory.
//!
//! An [`Image`] is a linear-tiled Vulkan image in one of the [`ImageFormat`]s, backed
//! by host-visible memory that the planes are written into directly, with no staging
//! buffer and no command submission. The image is left in `VK_IMAGE_LAYOUT_UNDEFINED`
//! (its initial layout); transitioning it before sampling is up to the render loop.

mod binder;
pub mod copy;

pub use binder::BindStrategy;

use crate::device::ImageDevice;
use crate::error::{Result, YuvTexError};
use crate::format::{ImageFormat, PlaneExtent, MAX_PLANES};
use crate::sampler::YcbcrSampler;
use crate::vulkan::VulkanContext;
use arrayvec::ArrayVec;
use ash::vk;
use binder::PendingResources;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Dimensions, format and binding strategy of an image to upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct ImageConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Planar layout of the source bytes and the device image.
    pub format: ImageFormat,
    /// Back each plane with its own allocation.
    pub disjoint: bool,
}

impl ImageConfig {
    /// Create a configuration using one combined allocation.
    pub fn new(width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            width,
            height,
            format,
            disjoint: false,
        }
    }

    /// Set whether each plane gets its own allocation.
    pub fn with_disjoint(mut self, disjoint: bool) -> Self {
        self.disjoint = disjoint;
        self
    }

    /// Binding strategy selected by [`Self::disjoint`].
    pub fn strategy(&self) -> BindStrategy {
        BindStrategy::from_disjoint(self.disjoint)
    }

    /// Bytes of a tightly packed source frame.
    pub fn frame_size(&self) -> Result<usize> {
        self.format.total_byte_size(self.width, self.height)
    }

    /// Geometry of one plane.
    pub fn plane_geometry(&self, plane: usize) -> Result<PlaneExtent> {
        self.format.plane_geometry(self.width, self.height, plane)
    }
}

/// A multi-plane image with its backing memory.
///
/// Owns the image handle and one allocation per plane (disjoint) or a single
/// allocation (combined). [`Image::finish`] releases them; it runs on drop too.
pub struct Image<D: ImageDevice = VulkanContext> {
    device: D,
    width: u32,
    height: u32,
    format: ImageFormat,
    strategy: BindStrategy,
    image: vk::Image,
    memories: ArrayVec<vk::DeviceMemory, MAX_PLANES>,
    layouts: ArrayVec<vk::SubresourceLayout, MAX_PLANES>,
}

impl<D: ImageDevice> Image<D> {
    /// Create an image from a tightly packed frame in host memory.
    ///
    /// `raw_bytes` holds plane 0, then plane 1 (then plane 2), each row-major with no
    /// padding, and must be at least [`ImageConfig::frame_size`] bytes long.
    /// On any failure every resource created so far is released before returning.
    pub fn init_from_memory(device: D, raw_bytes: &[u8], config: ImageConfig) -> Result<Self> {
        let ImageConfig {
            width,
            height,
            format,
            ..
        } = config;
        let strategy = config.strategy();

        if width == 0 || height == 0 {
            return Err(YuvTexError::DeviceImageCreationFailed(format!(
                "invalid extent {}x{}",
                width, height
            )));
        }
        let expected = config.frame_size()?;
        if raw_bytes.len() < expected {
            return Err(YuvTexError::InputTooSmall {
                expected,
                actual: raw_bytes.len(),
            });
        }
        format.warn_on_truncation(width, height);

        let vk_format = format.to_device_format();
        check_format_features(&device, format, strategy)?;

        let create_info = vk::ImageCreateInfo::default()
            .flags(strategy.image_create_flags())
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk_format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::LINEAR)
            .usage(vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.create_image(&create_info) }
            .map_err(|e| YuvTexError::DeviceImageCreationFailed(format!("{}: {}", format, e)))?;
        debug!("Created {} image {}x{} ({:?})", format, width, height, strategy);

        let mut pending = PendingResources::new(&device, image);

        let requirements = binder::query_requirements(&device, image, format, strategy)?;
        pending.allocate(&requirements)?;

        let mut layouts = ArrayVec::new();
        for plane in 0..format.plane_count() {
            let extent = format.plane_geometry(width, height, plane)?;
            let aspect = format.plane_aspect(plane)?;
            let layout = unsafe { device.subresource_layout(pending.image(), aspect) };
            debug!(
                "Plane {}: {}x{} bytes, offset {}, row pitch {}, size {}",
                plane, extent.width, extent.height, layout.offset, layout.row_pitch, layout.size
            );
            copy::check_layout(&layout, extent.width, extent.height)?;

            let offset = format.plane_source_offset(width, height, plane)?;
            let src = &raw_bytes[offset..offset + extent.byte_size()];
            let memory = pending.memories()[strategy.allocation_for_plane(plane)];
            copy::copy_plane(&device, memory, &layout, extent.width, extent.height, src)?;
            layouts.push(layout);
        }

        pending.bind(format, &requirements)?;
        let (image, memories) = pending.commit();

        info!(
            "Uploaded {} image {}x{} into {} allocation(s)",
            format,
            width,
            height,
            memories.len()
        );

        Ok(Self {
            device,
            width,
            height,
            format,
            strategy,
            image,
            memories,
            layouts,
        })
    }

    /// Create an image from a raw frame file.
    ///
    /// Reads exactly [`ImageConfig::frame_size`] bytes; a shorter file fails with
    /// [`YuvTexError::FileTooSmall`] before any device object is created.
    pub fn init_from_file(device: D, path: impl AsRef<Path>, config: ImageConfig) -> Result<Self> {
        let path = path.as_ref();
        let expected = config.frame_size()? as u64;

        let file = File::open(path)?;
        let actual = file.metadata()?.len();
        if actual < expected {
            return Err(YuvTexError::FileTooSmall { expected, actual });
        }

        let mut bytes = Vec::with_capacity(expected as usize);
        file.take(expected).read_to_end(&mut bytes)?;
        if (bytes.len() as u64) < expected {
            return Err(YuvTexError::FileTooSmall {
                expected,
                actual: bytes.len() as u64,
            });
        }
        debug!("Read {} bytes from {}", bytes.len(), path.display());

        Self::init_from_memory(device, &bytes, config)
    }

    /// Destroy the image and free its memory.
    ///
    /// Calling this again, or dropping the image afterwards, does nothing.
    pub fn finish(&mut self) {
        if self.image == vk::Image::null() && self.memories.is_empty() {
            return;
        }
        unsafe {
            if self.image != vk::Image::null() {
                self.device.destroy_image(self.image);
                self.image = vk::Image::null();
            }
            for memory in self.memories.drain(..) {
                self.device.free_memory(memory);
            }
        }
        debug!("Released {} image {}x{}", self.format, self.width, self.height);
    }

    /// Read one plane back, tightly packed, through a host mapping.
    pub fn read_plane(&self, plane: usize) -> Result<Vec<u8>> {
        let extent = self.format.plane_geometry(self.width, self.height, plane)?;
        let memory = self
            .memories
            .get(self.strategy.allocation_for_plane(plane))
            .copied()
            .ok_or_else(|| YuvTexError::MapFailed("image has been released".to_string()))?;
        copy::read_plane(&self.device, memory, &self.layouts[plane], extent.width, extent.height)
    }

    /// Create a conversion sampler for this image's format.
    pub fn create_sampler(&self) -> Result<YcbcrSampler<D>> {
        YcbcrSampler::new(self.device.clone(), self.format)
    }

    /// Get the underlying Vulkan image handle (null once finished).
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get the image dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get the image format.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Get the number of planes.
    pub fn plane_count(&self) -> usize {
        self.format.plane_count()
    }

    /// Get the memory binding strategy.
    pub fn strategy(&self) -> BindStrategy {
        self.strategy
    }

    /// Live allocations backing the image (empty once finished).
    pub fn memories(&self) -> &[vk::DeviceMemory] {
        &self.memories
    }

    /// Get the number of live allocations.
    pub fn allocation_count(&self) -> usize {
        self.memories.len()
    }

    /// Device-reported layout of a plane.
    pub fn plane_layout(&self, plane: usize) -> Result<vk::SubresourceLayout> {
        self.layouts
            .get(plane)
            .copied()
            .ok_or(YuvTexError::InvalidPlane {
                plane,
                plane_count: self.plane_count(),
            })
    }
}

impl<D: ImageDevice> Drop for Image<D> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl<D: ImageDevice> std::fmt::Debug for Image<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("strategy", &self.strategy)
            .field("image", &self.image)
            .field("memories", &self.memories)
            .finish()
    }
}

/// Refuse formats the device cannot sample from linear tiling, or bind disjointly.
fn check_format_features<D: ImageDevice>(
    device: &D,
    format: ImageFormat,
    strategy: BindStrategy,
) -> Result<()> {
    let features = device.linear_format_features(format.to_device_format());
    if !features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE) {
        return Err(YuvTexError::DeviceImageCreationFailed(format!(
            "{} cannot be sampled with linear tiling on this device",
            format
        )));
    }
    if strategy == BindStrategy::Disjoint && !features.contains(vk::FormatFeatureFlags::DISJOINT) {
        return Err(YuvTexError::DeviceImageCreationFailed(format!(
            "{} does not support disjoint planes with linear tiling on this device",
            format
        )));
    }
    Ok(())
}
