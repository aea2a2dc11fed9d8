//! The device seam.
//!
//! Image and sampler construction only talk to the GPU through [`ImageDevice`].
//! [`crate::VulkanContext`] forwards each call to ash; tests use an in-memory fake.

#[cfg(test)]
pub(crate) mod fake;

use ash::prelude::VkResult;
use ash::vk;
use std::ffi::c_void;

/// Vulkan entry points needed to build multi-plane images and YCbCr samplers.
///
/// Implementations are cheap to clone; clones refer to the same logical device.
///
/// # Safety
///
/// The `unsafe` methods forward to Vulkan. Callers must pass handles created by
/// the same device and must not use a handle after destroying or freeing it.
pub trait ImageDevice: Clone {
    /// Index of the host-visible, host-coherent memory type used for every allocation.
    fn host_visible_memory_type(&self) -> u32;

    /// Format features the device reports for linear tiling of `format`.
    fn linear_format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags;

    /// Create an image.
    unsafe fn create_image(&self, create_info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image>;

    /// Destroy an image.
    unsafe fn destroy_image(&self, image: vk::Image);

    /// Memory requirement of the whole image, or of one plane of a disjoint image.
    unsafe fn image_memory_requirements(
        &self,
        image: vk::Image,
        plane: Option<vk::ImageAspectFlags>,
    ) -> vk::MemoryRequirements;

    /// Layout of one plane of a linear image.
    unsafe fn subresource_layout(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    ) -> vk::SubresourceLayout;

    /// Allocate device memory.
    unsafe fn allocate_memory(
        &self,
        allocate_info: &vk::MemoryAllocateInfo<'_>,
    ) -> VkResult<vk::DeviceMemory>;

    /// Free device memory.
    unsafe fn free_memory(&self, memory: vk::DeviceMemory);

    /// Map a range of an allocation into host memory.
    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void>;

    /// Unmap an allocation.
    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory);

    /// Bind memory to an image in a single call.
    unsafe fn bind_image_memory2(&self, bind_infos: &[vk::BindImageMemoryInfo<'_>]) -> VkResult<()>;

    /// Create a YCbCr conversion.
    unsafe fn create_sampler_ycbcr_conversion(
        &self,
        create_info: &vk::SamplerYcbcrConversionCreateInfo<'_>,
    ) -> VkResult<vk::SamplerYcbcrConversion>;

    /// Destroy a YCbCr conversion.
    unsafe fn destroy_sampler_ycbcr_conversion(&self, conversion: vk::SamplerYcbcrConversion);

    /// Create a sampler.
    unsafe fn create_sampler(&self, create_info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler>;

    /// Destroy a sampler.
    unsafe fn destroy_sampler(&self, sampler: vk::Sampler);
}
