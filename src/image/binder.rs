//! Memory binder.
//!
//! Requirements are queried in the shape the binding strategy binds (one per plane
//! for disjoint images, one for the whole image otherwise), allocated from the
//! host-visible memory type, and bound in a single `vkBindImageMemory2` call.
//! Everything created along the way is owned by [`PendingResources`] until the
//! bind succeeds.

use crate::device::ImageDevice;
use crate::error::{Result, YuvTexError};
use crate::format::{ImageFormat, MAX_PLANES};
use arrayvec::ArrayVec;
use ash::vk;
use tracing::{debug, warn};

/// How memory is bound to the planes of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindStrategy {
    /// One allocation per plane (`VK_IMAGE_CREATE_DISJOINT_BIT`).
    Disjoint,
    /// One allocation shared by all planes at driver-chosen offsets.
    #[default]
    Combined,
}

impl BindStrategy {
    /// Strategy for the `disjoint` flag.
    pub fn from_disjoint(disjoint: bool) -> Self {
        if disjoint {
            BindStrategy::Disjoint
        } else {
            BindStrategy::Combined
        }
    }

    /// Image creation flags the strategy needs.
    pub fn image_create_flags(self) -> vk::ImageCreateFlags {
        match self {
            BindStrategy::Disjoint => vk::ImageCreateFlags::DISJOINT,
            BindStrategy::Combined => vk::ImageCreateFlags::empty(),
        }
    }

    /// Number of allocations an image of `format` ends up owning.
    pub fn allocation_count(self, format: ImageFormat) -> usize {
        match self {
            BindStrategy::Disjoint => format.plane_count(),
            BindStrategy::Combined => 1,
        }
    }

    /// Index into the allocation list holding `plane`.
    pub fn allocation_for_plane(self, plane: usize) -> usize {
        match self {
            BindStrategy::Disjoint => plane,
            BindStrategy::Combined => 0,
        }
    }
}

/// Memory requirements in the shape a strategy binds.
#[derive(Debug, Clone)]
pub(crate) struct Requirements {
    strategy: BindStrategy,
    entries: ArrayVec<vk::MemoryRequirements, MAX_PLANES>,
}

impl Requirements {
    pub fn strategy(&self) -> BindStrategy {
        self.strategy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Query the image's memory requirements for `strategy`.
pub(crate) fn query_requirements<D: ImageDevice>(
    device: &D,
    image: vk::Image,
    format: ImageFormat,
    strategy: BindStrategy,
) -> Result<Requirements> {
    let mut entries = ArrayVec::new();
    match strategy {
        BindStrategy::Disjoint => {
            for plane in 0..format.plane_count() {
                let aspect = format.plane_aspect(plane)?;
                let requirement = unsafe { device.image_memory_requirements(image, Some(aspect)) };
                debug!(
                    "Plane {} requires {} bytes (alignment {}, type bits {:#x})",
                    plane, requirement.size, requirement.alignment, requirement.memory_type_bits
                );
                entries.push(requirement);
            }
        }
        BindStrategy::Combined => {
            let requirement = unsafe { device.image_memory_requirements(image, None) };
            debug!(
                "Image requires {} bytes (alignment {}, type bits {:#x})",
                requirement.size, requirement.alignment, requirement.memory_type_bits
            );
            entries.push(requirement);
        }
    }
    Ok(Requirements { strategy, entries })
}

/// An image and the allocations made for it, not yet handed to an [`crate::Image`].
///
/// Dropping it without [`PendingResources::commit`] frees every allocation and
/// destroys the image.
pub(crate) struct PendingResources<'a, D: ImageDevice> {
    device: &'a D,
    image: vk::Image,
    memories: ArrayVec<vk::DeviceMemory, MAX_PLANES>,
    committed: bool,
}

impl<'a, D: ImageDevice> PendingResources<'a, D> {
    pub fn new(device: &'a D, image: vk::Image) -> Self {
        Self {
            device,
            image,
            memories: ArrayVec::new(),
            committed: false,
        }
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn memories(&self) -> &[vk::DeviceMemory] {
        &self.memories
    }

    /// Allocate one host-visible block per requirement.
    pub fn allocate(&mut self, requirements: &Requirements) -> Result<()> {
        let memory_type_index = self.device.host_visible_memory_type();
        for (index, requirement) in requirements.entries.iter().enumerate() {
            let label = match requirements.strategy {
                BindStrategy::Disjoint => format!("plane {}", index),
                BindStrategy::Combined => "image".to_string(),
            };

            if requirement.memory_type_bits & (1 << memory_type_index) == 0 {
                return Err(YuvTexError::MemoryRequirementIncompatible {
                    plane: label,
                    memory_type_bits: requirement.memory_type_bits,
                    memory_type_index,
                });
            }

            let alloc_info = vk::MemoryAllocateInfo::default()
                .allocation_size(requirement.size)
                .memory_type_index(memory_type_index);
            let memory = unsafe { self.device.allocate_memory(&alloc_info) }
                .map_err(|e| YuvTexError::MemoryAllocationFailed(format!("{}: {}", label, e)))?;
            debug!("Allocated {} bytes for {}", requirement.size, label);
            self.memories.push(memory);
        }
        Ok(())
    }

    /// Bind every allocation in one call.
    pub fn bind(&self, format: ImageFormat, requirements: &Requirements) -> Result<()> {
        let strategy = requirements.strategy();
        let expected = strategy.allocation_count(format);
        if requirements.len() != expected || self.memories.len() != expected {
            return Err(YuvTexError::PlaneLayoutMismatch(format!(
                "{:?} binding of {} needs {} allocations, have {} requirements and {} allocations",
                strategy,
                format,
                expected,
                requirements.len(),
                self.memories.len()
            )));
        }

        let result = match strategy {
            BindStrategy::Disjoint => {
                let mut plane_infos = ArrayVec::<vk::BindImagePlaneMemoryInfo, MAX_PLANES>::new();
                for plane in 0..expected {
                    plane_infos.push(
                        vk::BindImagePlaneMemoryInfo::default()
                            .plane_aspect(format.plane_aspect(plane)?),
                    );
                }
                let bind_infos: ArrayVec<vk::BindImageMemoryInfo, MAX_PLANES> = plane_infos
                    .iter_mut()
                    .zip(self.memories.iter())
                    .map(|(plane_info, &memory)| {
                        vk::BindImageMemoryInfo::default()
                            .image(self.image)
                            .memory(memory)
                            .memory_offset(0)
                            .push_next(plane_info)
                    })
                    .collect();
                unsafe { self.device.bind_image_memory2(&bind_infos) }
            }
            BindStrategy::Combined => {
                let bind_info = vk::BindImageMemoryInfo::default()
                    .image(self.image)
                    .memory(self.memories[0])
                    .memory_offset(0);
                unsafe { self.device.bind_image_memory2(std::slice::from_ref(&bind_info)) }
            }
        };

        result.map_err(|e| YuvTexError::BindFailed(e.to_string()))
    }

    /// Hand the image and its allocations over to the caller.
    pub fn commit(mut self) -> (vk::Image, ArrayVec<vk::DeviceMemory, MAX_PLANES>) {
        self.committed = true;
        (self.image, std::mem::take(&mut self.memories))
    }
}

impl<D: ImageDevice> Drop for PendingResources<'_, D> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        warn!(
            "Image construction failed, releasing image and {} allocation(s)",
            self.memories.len()
        );
        unsafe {
            self.device.destroy_image(self.image);
            for memory in self.memories.drain(..) {
                self.device.free_memory(memory);
            }
        }
    }
}
