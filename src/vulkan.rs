//! Vulkan context wrapping a ready logical device.
//!
//! Instance and device creation belong to the caller. The context only records the
//! handles, the memory properties, and the host-visible memory type that every
//! image allocation is made from, and forwards [`ImageDevice`] calls to ash.

use crate::device::ImageDevice;
use crate::error::{Result, YuvTexError};
use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{c_void, CStr};
use tracing::{debug, info};

/// Inner struct holding the borrowed Vulkan handles.
struct VulkanContextInner {
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue_family_index: u32,
    queue: vk::Queue,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device_properties: vk::PhysicalDeviceProperties,
    host_visible_memory_type: u32,
}

/// Holds the Vulkan device used to create images and samplers.
///
/// This type is cheaply cloneable - clones share the same underlying handles.
/// The caller keeps ownership of the instance and device: they are not destroyed
/// when the last clone is dropped, and must outlive every image and sampler.
#[derive(Clone)]
pub struct VulkanContext {
    inner: std::sync::Arc<VulkanContextInner>,
}

impl VulkanContext {
    /// Wrap a ready logical device.
    ///
    /// The device must have been created with the `samplerYcbcrConversion` feature
    /// enabled (Vulkan 1.1+). Queue 0 of `queue_family_index` is used as the queue
    /// handed to render-loop collaborators.
    pub fn new(
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family_index: u32,
    ) -> Result<Self> {
        let device_properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let device_name = unsafe { CStr::from_ptr(device_properties.device_name.as_ptr()) }
            .to_string_lossy()
            .to_string();

        let host_visible_memory_type = find_memory_type(
            &memory_properties,
            u32::MAX,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .ok_or_else(|| {
            YuvTexError::MemoryAllocationFailed(format!(
                "{} exposes no host-visible coherent memory type",
                device_name
            ))
        })?;

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        info!("Using device: {}", device_name);
        debug!(
            "Host-visible memory type {} (flags {:?})",
            host_visible_memory_type,
            memory_properties.memory_types[host_visible_memory_type as usize].property_flags
        );

        Ok(Self {
            inner: std::sync::Arc::new(VulkanContextInner {
                instance,
                physical_device,
                device,
                queue_family_index,
                queue,
                memory_properties,
                device_properties,
                host_visible_memory_type,
            }),
        })
    }

    /// Use a caller-chosen memory type for allocations instead of the detected one.
    ///
    /// The type must be host-visible and host-coherent: planes are written through a
    /// mapping and never flushed.
    pub fn with_host_visible_memory_type(self, memory_type_index: u32) -> Result<Self> {
        check_host_memory_type(&self.inner.memory_properties, memory_type_index)?;

        let inner = &self.inner;
        Ok(Self {
            inner: std::sync::Arc::new(VulkanContextInner {
                instance: inner.instance.clone(),
                physical_device: inner.physical_device,
                device: inner.device.clone(),
                queue_family_index: inner.queue_family_index,
                queue: inner.queue,
                memory_properties: inner.memory_properties,
                device_properties: inner.device_properties,
                host_visible_memory_type: memory_type_index,
            }),
        })
    }

    /// Get the Vulkan instance.
    pub fn instance(&self) -> &ash::Instance {
        &self.inner.instance
    }

    /// Get the Vulkan device.
    pub fn device(&self) -> &ash::Device {
        &self.inner.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.inner.physical_device
    }

    /// Get the physical device properties.
    pub fn device_properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.inner.device_properties
    }

    /// Queue family the images are created for.
    pub fn queue_family_index(&self) -> u32 {
        self.inner.queue_family_index
    }

    /// Queue 0 of [`Self::queue_family_index`].
    pub fn queue(&self) -> vk::Queue {
        self.inner.queue
    }

    /// Find a memory type that satisfies the requirements.
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        find_memory_type(&self.inner.memory_properties, type_filter, properties)
    }
}

/// Find the first memory type allowed by `type_filter` that has all of `properties`.
pub fn find_memory_type(
    memory_props: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_props.memory_type_count).find(|&i| {
        (type_filter & (1 << i)) != 0
            && memory_props.memory_types[i as usize]
                .property_flags
                .contains(properties)
    })
}

/// Check that `memory_type_index` names a host-visible, host-coherent memory type.
pub fn check_host_memory_type(
    memory_props: &vk::PhysicalDeviceMemoryProperties,
    memory_type_index: u32,
) -> Result<()> {
    let required = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    if memory_type_index >= memory_props.memory_type_count {
        return Err(YuvTexError::MemoryAllocationFailed(format!(
            "memory type {} out of range ({} types)",
            memory_type_index, memory_props.memory_type_count
        )));
    }
    let flags = memory_props.memory_types[memory_type_index as usize].property_flags;
    if !flags.contains(required) {
        return Err(YuvTexError::MemoryAllocationFailed(format!(
            "memory type {} ({:?}) is not host-visible and host-coherent",
            memory_type_index, flags
        )));
    }
    Ok(())
}

impl ImageDevice for VulkanContext {
    fn host_visible_memory_type(&self) -> u32 {
        self.inner.host_visible_memory_type
    }

    fn linear_format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        unsafe {
            self.inner
                .instance
                .get_physical_device_format_properties(self.inner.physical_device, format)
        }
        .linear_tiling_features
    }

    unsafe fn create_image(&self, create_info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        self.inner.device.create_image(create_info, None)
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        self.inner.device.destroy_image(image, None);
    }

    unsafe fn image_memory_requirements(
        &self,
        image: vk::Image,
        plane: Option<vk::ImageAspectFlags>,
    ) -> vk::MemoryRequirements {
        let mut plane_info = vk::ImagePlaneMemoryRequirementsInfo::default();
        let mut info = vk::ImageMemoryRequirementsInfo2::default().image(image);
        if let Some(aspect) = plane {
            plane_info = plane_info.plane_aspect(aspect);
            info = info.push_next(&mut plane_info);
        }

        let mut requirements = vk::MemoryRequirements2::default();
        self.inner
            .device
            .get_image_memory_requirements2(&info, &mut requirements);
        requirements.memory_requirements
    }

    unsafe fn subresource_layout(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    ) -> vk::SubresourceLayout {
        let subresource = vk::ImageSubresource {
            aspect_mask: aspect,
            mip_level: 0,
            array_layer: 0,
        };
        self.inner
            .device
            .get_image_subresource_layout(image, subresource)
    }

    unsafe fn allocate_memory(
        &self,
        allocate_info: &vk::MemoryAllocateInfo<'_>,
    ) -> VkResult<vk::DeviceMemory> {
        self.inner.device.allocate_memory(allocate_info, None)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.inner.device.free_memory(memory, None);
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        self.inner
            .device
            .map_memory(memory, offset, size, vk::MemoryMapFlags::empty())
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        self.inner.device.unmap_memory(memory);
    }

    unsafe fn bind_image_memory2(&self, bind_infos: &[vk::BindImageMemoryInfo<'_>]) -> VkResult<()> {
        self.inner.device.bind_image_memory2(bind_infos)
    }

    unsafe fn create_sampler_ycbcr_conversion(
        &self,
        create_info: &vk::SamplerYcbcrConversionCreateInfo<'_>,
    ) -> VkResult<vk::SamplerYcbcrConversion> {
        self.inner
            .device
            .create_sampler_ycbcr_conversion(create_info, None)
    }

    unsafe fn destroy_sampler_ycbcr_conversion(&self, conversion: vk::SamplerYcbcrConversion) {
        self.inner
            .device
            .destroy_sampler_ycbcr_conversion(conversion, None);
    }

    unsafe fn create_sampler(&self, create_info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler> {
        self.inner.device.create_sampler(create_info, None)
    }

    unsafe fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.inner.device.destroy_sampler(sampler, None);
    }
}
