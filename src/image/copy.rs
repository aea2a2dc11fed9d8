//! Host copy engine.
//!
//! Moves one plane's bytes between a tightly packed host buffer and its mapped
//! location inside device memory, honouring the plane's row pitch.

use crate::device::ImageDevice;
use crate::error::{Result, YuvTexError};
use ash::vk;
use std::marker::PhantomData;

/// Check that a device-reported plane layout can hold `height` rows of `width` bytes.
pub fn check_layout(layout: &vk::SubresourceLayout, width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }
    let width = width as u64;
    if layout.row_pitch < width {
        return Err(YuvTexError::PlaneLayoutMismatch(format!(
            "row pitch {} is smaller than the plane width {}",
            layout.row_pitch, width
        )));
    }
    let needed = (height as u64 - 1) * layout.row_pitch + width;
    if layout.size < needed {
        return Err(YuvTexError::PlaneLayoutMismatch(format!(
            "plane size {} cannot hold {} rows at pitch {} ({} bytes needed)",
            layout.size, height, layout.row_pitch, needed
        )));
    }
    Ok(())
}

/// Copy a tightly packed plane into `dst`, a mapping that starts at the plane's offset.
pub fn copy_plane_into(
    dst: &mut [u8],
    layout: &vk::SubresourceLayout,
    width: u32,
    height: u32,
    src: &[u8],
) -> Result<()> {
    check_layout(layout, width, height)?;
    let row = width as usize;
    let rows = height as usize;
    let plane_size = row * rows;
    if src.len() < plane_size {
        return Err(YuvTexError::InputTooSmall {
            expected: plane_size,
            actual: src.len(),
        });
    }
    if plane_size == 0 {
        return Ok(());
    }

    if layout.row_pitch == width as u64 {
        let dst = dst.get_mut(..plane_size).ok_or_else(|| span_too_short(plane_size))?;
        dst.copy_from_slice(&src[..plane_size]);
        return Ok(());
    }

    let pitch = layout.row_pitch as usize;
    let span = (rows - 1) * pitch + row;
    if dst.len() < span {
        return Err(span_too_short(span));
    }
    for (y, src_row) in src[..plane_size].chunks_exact(row).enumerate() {
        let start = y * pitch;
        dst[start..start + row].copy_from_slice(src_row);
    }
    Ok(())
}

/// Read a plane back out of `src` into a tightly packed buffer.
pub fn read_plane_from(
    src: &[u8],
    layout: &vk::SubresourceLayout,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    check_layout(layout, width, height)?;
    let row = width as usize;
    let rows = height as usize;
    let mut out = Vec::with_capacity(row * rows);
    if row == 0 || rows == 0 {
        return Ok(out);
    }

    let pitch = layout.row_pitch as usize;
    let span = (rows - 1) * pitch + row;
    if src.len() < span {
        return Err(span_too_short(span));
    }
    for y in 0..rows {
        let start = y * pitch;
        out.extend_from_slice(&src[start..start + row]);
    }
    Ok(out)
}

fn span_too_short(needed: usize) -> YuvTexError {
    YuvTexError::PlaneLayoutMismatch(format!("mapped span shorter than {} bytes", needed))
}

/// A mapped plane range. Unmapped when dropped.
struct MappedPlane<'a, D: ImageDevice> {
    device: &'a D,
    memory: vk::DeviceMemory,
    ptr: *mut u8,
    len: usize,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a, D: ImageDevice> MappedPlane<'a, D> {
    fn map(device: &'a D, memory: vk::DeviceMemory, layout: &vk::SubresourceLayout) -> Result<Self> {
        let ptr = unsafe { device.map_memory(memory, layout.offset, layout.size) }
            .map_err(|e| YuvTexError::MapFailed(e.to_string()))?;
        Ok(Self {
            device,
            memory,
            ptr: ptr.cast(),
            len: layout.size as usize,
            _marker: PhantomData,
        })
    }

    fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl<D: ImageDevice> Drop for MappedPlane<'_, D> {
    fn drop(&mut self) {
        unsafe { self.device.unmap_memory(self.memory) };
    }
}

/// Map the plane's range of `memory`, write `src` into it, and unmap.
pub fn copy_plane<D: ImageDevice>(
    device: &D,
    memory: vk::DeviceMemory,
    layout: &vk::SubresourceLayout,
    width: u32,
    height: u32,
    src: &[u8],
) -> Result<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }
    check_layout(layout, width, height)?;
    let mut mapped = MappedPlane::map(device, memory, layout)?;
    copy_plane_into(mapped.as_mut_slice(), layout, width, height, src)
}

/// Map the plane's range of `memory`, read it back tightly packed, and unmap.
pub fn read_plane<D: ImageDevice>(
    device: &D,
    memory: vk::DeviceMemory,
    layout: &vk::SubresourceLayout,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }
    check_layout(layout, width, height)?;
    let mapped = MappedPlane::map(device, memory, layout)?;
    read_plane_from(mapped.as_slice(), layout, width, height)
}
