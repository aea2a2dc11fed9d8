//! In-memory [`ImageDevice`] for tests.
//!
//! Allocations are plain byte vectors, so tests can read back exactly what the
//! copy engine wrote. Row pitch, memory type masks and failures are configurable.

use super::ImageDevice;
use crate::format::ImageFormat;
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::sync::{Arc, Mutex, MutexGuard};

/// Memory type index the fake reports as host-visible.
pub(crate) const HOST_VISIBLE_TYPE: u32 = 2;

#[derive(Debug, Clone)]
pub(crate) struct FakeImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub flags: vk::ImageCreateFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub bound: Vec<vk::DeviceMemory>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ConversionRecord {
    pub format: vk::Format,
    pub model: vk::SamplerYcbcrModelConversion,
    pub range: vk::SamplerYcbcrRange,
    pub x_chroma_offset: vk::ChromaLocation,
    pub y_chroma_offset: vk::ChromaLocation,
    pub chroma_filter: vk::Filter,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SamplerRecord {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_modes: [vk::SamplerAddressMode; 3],
    pub anisotropy_enable: bool,
    pub compare_enable: bool,
    pub min_lod: f32,
    pub max_lod: f32,
    pub conversion: Option<vk::SamplerYcbcrConversion>,
}

/// Knobs and counters of the fake device.
pub(crate) struct FakeState {
    next_handle: u64,
    pub row_alignment: u32,
    pub memory_type_bits: u32,
    pub incompatible_plane: Option<usize>,
    pub linear_features: vk::FormatFeatureFlags,
    pub fail_create_image: bool,
    pub fail_allocation_after: Option<usize>,
    pub fail_map: bool,
    pub fail_bind: bool,
    pub fail_sampler: bool,
    pub images: HashMap<u64, FakeImage>,
    pub memories: HashMap<u64, Vec<u8>>,
    pub mapped: HashSet<u64>,
    pub images_created: usize,
    pub allocations: usize,
    pub bind_calls: Vec<usize>,
    pub invalid_frees: usize,
    pub overlapping_maps: usize,
    pub conversions: HashSet<u64>,
    pub samplers: HashSet<u64>,
    pub last_conversion: Option<ConversionRecord>,
    pub last_sampler: Option<SamplerRecord>,
    pub calls: Vec<&'static str>,
}

#[derive(Clone)]
pub(crate) struct FakeDevice {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                next_handle: 1,
                row_alignment: 1,
                memory_type_bits: u32::MAX,
                incompatible_plane: None,
                linear_features: vk::FormatFeatureFlags::SAMPLED_IMAGE
                    | vk::FormatFeatureFlags::DISJOINT
                    | vk::FormatFeatureFlags::MIDPOINT_CHROMA_SAMPLES,
                fail_create_image: false,
                fail_allocation_after: None,
                fail_map: false,
                fail_bind: false,
                fail_sampler: false,
                images: HashMap::new(),
                memories: HashMap::new(),
                mapped: HashSet::new(),
                images_created: 0,
                allocations: 0,
                bind_calls: Vec::new(),
                invalid_frees: 0,
                overlapping_maps: 0,
                conversions: HashSet::new(),
                samplers: HashSet::new(),
                last_conversion: None,
                last_sampler: None,
                calls: Vec::new(),
            })),
        }
    }

    /// Pad every plane row to a multiple of `alignment` bytes.
    pub fn with_row_alignment(self, alignment: u32) -> Self {
        self.state().row_alignment = alignment;
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn memory_contents(&self, memory: vk::DeviceMemory) -> Vec<u8> {
        self.state().memories[&memory.as_raw()].clone()
    }

    pub fn live_images(&self) -> usize {
        self.state().images.len()
    }

    pub fn live_memories(&self) -> usize {
        self.state().memories.len()
    }

    fn plane_layouts(state: &FakeState, image: &FakeImage) -> Vec<vk::SubresourceLayout> {
        let disjoint = image.flags.contains(vk::ImageCreateFlags::DISJOINT);
        let mut offset = 0;
        (0..image.format.plane_count())
            .map(|plane| {
                let extent = image
                    .format
                    .plane_geometry(image.width, image.height, plane)
                    .unwrap();
                let align = state.row_alignment.max(1) as u64;
                let row_pitch = (extent.width as u64).div_ceil(align) * align;
                let size = row_pitch * extent.height as u64;
                let layout = vk::SubresourceLayout {
                    offset: if disjoint { 0 } else { offset },
                    size,
                    row_pitch,
                    array_pitch: 0,
                    depth_pitch: 0,
                };
                offset += size.div_ceil(align) * align;
                layout
            })
            .collect()
    }

    fn aspect_plane(aspect: vk::ImageAspectFlags) -> usize {
        if aspect == vk::ImageAspectFlags::PLANE_0 {
            0
        } else if aspect == vk::ImageAspectFlags::PLANE_1 {
            1
        } else {
            2
        }
    }

    fn next_handle(state: &mut FakeState) -> u64 {
        let handle = state.next_handle;
        state.next_handle += 1;
        handle
    }
}

impl ImageDevice for FakeDevice {
    fn host_visible_memory_type(&self) -> u32 {
        HOST_VISIBLE_TYPE
    }

    fn linear_format_features(&self, _format: vk::Format) -> vk::FormatFeatureFlags {
        self.state().linear_features
    }

    unsafe fn create_image(&self, create_info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        let mut state = self.state();
        state.calls.push("create_image");
        if state.fail_create_image {
            return Err(vk::Result::ERROR_FORMAT_NOT_SUPPORTED);
        }
        let format = ImageFormat::try_from(create_info.format)
            .map_err(|_| vk::Result::ERROR_FORMAT_NOT_SUPPORTED)?;
        let handle = Self::next_handle(&mut state);
        state.images.insert(
            handle,
            FakeImage {
                format,
                width: create_info.extent.width,
                height: create_info.extent.height,
                flags: create_info.flags,
                tiling: create_info.tiling,
                usage: create_info.usage,
                bound: Vec::new(),
            },
        );
        state.images_created += 1;
        Ok(vk::Image::from_raw(handle))
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        let mut state = self.state();
        state.calls.push("destroy_image");
        if state.images.remove(&image.as_raw()).is_none() {
            state.invalid_frees += 1;
        }
    }

    unsafe fn image_memory_requirements(
        &self,
        image: vk::Image,
        plane: Option<vk::ImageAspectFlags>,
    ) -> vk::MemoryRequirements {
        let state = self.state();
        let fake = &state.images[&image.as_raw()];
        let layouts = Self::plane_layouts(&state, fake);

        let (size, plane_index) = match plane {
            Some(aspect) => {
                let index = Self::aspect_plane(aspect);
                (layouts[index].size, Some(index))
            }
            None => {
                let last = layouts.last().unwrap();
                (last.offset + last.size, None)
            }
        };

        let memory_type_bits = match (state.incompatible_plane, plane_index) {
            (Some(bad), Some(index)) if bad == index => !(1 << HOST_VISIBLE_TYPE),
            (Some(_), None) => !(1 << HOST_VISIBLE_TYPE),
            _ => state.memory_type_bits,
        };

        vk::MemoryRequirements {
            size,
            alignment: state.row_alignment as u64,
            memory_type_bits,
        }
    }

    unsafe fn subresource_layout(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    ) -> vk::SubresourceLayout {
        let state = self.state();
        let fake = &state.images[&image.as_raw()];
        Self::plane_layouts(&state, fake)[Self::aspect_plane(aspect)]
    }

    unsafe fn allocate_memory(
        &self,
        allocate_info: &vk::MemoryAllocateInfo<'_>,
    ) -> VkResult<vk::DeviceMemory> {
        let mut state = self.state();
        state.calls.push("allocate_memory");
        if state.fail_allocation_after == Some(state.allocations) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        assert_eq!(allocate_info.memory_type_index, HOST_VISIBLE_TYPE);
        let handle = Self::next_handle(&mut state);
        state
            .memories
            .insert(handle, vec![0u8; allocate_info.allocation_size as usize]);
        state.allocations += 1;
        Ok(vk::DeviceMemory::from_raw(handle))
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state();
        state.calls.push("free_memory");
        if state.memories.remove(&memory.as_raw()).is_none() {
            state.invalid_frees += 1;
        }
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        let mut state = self.state();
        if state.fail_map {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        let raw = memory.as_raw();
        if !state.mapped.insert(raw) {
            state.overlapping_maps += 1;
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        let bytes = state.memories.get_mut(&raw).unwrap();
        assert!(offset + size <= bytes.len() as u64, "map range out of bounds");
        Ok(bytes.as_mut_ptr().add(offset as usize).cast())
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        self.state().mapped.remove(&memory.as_raw());
    }

    unsafe fn bind_image_memory2(&self, bind_infos: &[vk::BindImageMemoryInfo<'_>]) -> VkResult<()> {
        let mut state = self.state();
        state.calls.push("bind_image_memory2");
        state.bind_calls.push(bind_infos.len());
        if state.fail_bind {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        for info in bind_infos {
            if !info.p_next.is_null() {
                let plane = &*(info.p_next as *const vk::BindImagePlaneMemoryInfo);
                assert_eq!(plane.s_type, vk::StructureType::BIND_IMAGE_PLANE_MEMORY_INFO);
            }
            let image = state.images.get_mut(&info.image.as_raw()).unwrap();
            image.bound.push(info.memory);
        }
        Ok(())
    }

    unsafe fn create_sampler_ycbcr_conversion(
        &self,
        create_info: &vk::SamplerYcbcrConversionCreateInfo<'_>,
    ) -> VkResult<vk::SamplerYcbcrConversion> {
        let mut state = self.state();
        state.calls.push("create_conversion");
        state.last_conversion = Some(ConversionRecord {
            format: create_info.format,
            model: create_info.ycbcr_model,
            range: create_info.ycbcr_range,
            x_chroma_offset: create_info.x_chroma_offset,
            y_chroma_offset: create_info.y_chroma_offset,
            chroma_filter: create_info.chroma_filter,
        });
        let handle = Self::next_handle(&mut state);
        state.conversions.insert(handle);
        Ok(vk::SamplerYcbcrConversion::from_raw(handle))
    }

    unsafe fn destroy_sampler_ycbcr_conversion(&self, conversion: vk::SamplerYcbcrConversion) {
        let mut state = self.state();
        state.calls.push("destroy_conversion");
        if !state.conversions.remove(&conversion.as_raw()) {
            state.invalid_frees += 1;
        }
    }

    unsafe fn create_sampler(&self, create_info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler> {
        let mut state = self.state();
        state.calls.push("create_sampler");
        if state.fail_sampler {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let conversion = if create_info.p_next.is_null() {
            None
        } else {
            let info = &*(create_info.p_next as *const vk::SamplerYcbcrConversionInfo);
            assert_eq!(info.s_type, vk::StructureType::SAMPLER_YCBCR_CONVERSION_INFO);
            Some(info.conversion)
        };
        state.last_sampler = Some(SamplerRecord {
            mag_filter: create_info.mag_filter,
            min_filter: create_info.min_filter,
            address_modes: [
                create_info.address_mode_u,
                create_info.address_mode_v,
                create_info.address_mode_w,
            ],
            anisotropy_enable: create_info.anisotropy_enable == vk::TRUE,
            compare_enable: create_info.compare_enable == vk::TRUE,
            min_lod: create_info.min_lod,
            max_lod: create_info.max_lod,
            conversion,
        });
        let handle = Self::next_handle(&mut state);
        state.samplers.insert(handle);
        Ok(vk::Sampler::from_raw(handle))
    }

    unsafe fn destroy_sampler(&self, sampler: vk::Sampler) {
        let mut state = self.state();
        state.calls.push("destroy_sampler");
        if !state.samplers.remove(&sampler.as_raw()) {
            state.invalid_frees += 1;
        }
    }
}
