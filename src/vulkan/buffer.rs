//! Buffers backed by gpu-allocator memory.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};
use parking_lot::Mutex;

use crate::error::{VkResultExt, VlkError, VlkResult};

use super::gpu::VulkanGpu;
use super::memory::{compute_memory_layout, copy_buffer, MemoryLayout, MemoryRange, MemoryRequirements};

#[derive(Debug, Clone)]
pub struct BufferSettings {
    /// Sub-ranges of the buffer; the buffer is `layout.total_size` bytes.
    pub layout: MemoryLayout,
    pub usage: vk::BufferUsageFlags,
    pub memory_properties: vk::MemoryPropertyFlags,
    /// Keep the memory persistently mapped. Requires host-visible memory.
    pub map_memory: bool,
    pub name: &'static str,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            layout: MemoryLayout::default(),
            usage: vk::BufferUsageFlags::empty(),
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            map_memory: false,
            name: "buffer",
        }
    }
}

impl BufferSettings {
    /// Host-visible, coherent and mapped, e.g. for per-frame uniforms or staging.
    pub fn host_mapped(layout: MemoryLayout, usage: vk::BufferUsageFlags, name: &'static str) -> Self {
        Self {
            layout,
            usage,
            memory_properties: vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
            map_memory: true,
            name,
        }
    }

    pub fn device_local(layout: MemoryLayout, usage: vk::BufferUsageFlags, name: &'static str) -> Self {
        Self {
            layout,
            usage,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            map_memory: false,
            name,
        }
    }
}

pub struct VulkanBuffer {
    device: ash::Device,
    allocator: Arc<Mutex<Allocator>>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    layout: MemoryLayout,
    mapped: bool,
}

impl VulkanBuffer {
    pub fn new(gpu: &VulkanGpu, settings: BufferSettings) -> VlkResult<Self> {
        if settings.layout.total_size == 0 {
            return Err(VlkError::InvalidParameter(format!(
                "Buffer '{}' has a zero-sized layout",
                settings.name
            )));
        }
        if settings.map_memory
            && !settings
                .memory_properties
                .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        {
            return Err(VlkError::InvalidParameter(format!(
                "Buffer '{}' cannot be mapped without HOST_VISIBLE memory",
                settings.name
            )));
        }

        let device = gpu.device();
        let buffer_info = vk::BufferCreateInfo::default()
            .size(settings.layout.total_size)
            .usage(settings.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }
            .context("Failed to create buffer")?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let allocation =
            match gpu.allocate(settings.name, requirements, settings.memory_properties, true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { device.destroy_buffer(buffer, None) };
                    return Err(e);
                }
            };

        let (memory, offset, size) = (unsafe { allocation.memory() }, allocation.offset(), allocation.size());

        // Everything below is cleaned up by Drop on failure.
        let mut this = Self {
            device: device.clone(),
            allocator: gpu.allocator()?,
            buffer,
            allocation: Some(allocation),
            layout: settings.layout,
            mapped: settings.map_memory,
        };

        if this.layout.total_size > size {
            return Err(VlkError::Allocation(format!(
                "Allocation of {} bytes is smaller than the requested {} bytes",
                size, this.layout.total_size
            )));
        }

        unsafe { device.bind_buffer_memory(buffer, memory, offset) }
            .context("Failed to bind buffer memory")?;

        if this.mapped && this.mapped_slice_mut().is_none() {
            return Err(VlkError::Allocation(format!(
                "Buffer '{}' memory is not host mappable",
                settings.name
            )));
        }

        Ok(this)
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    pub fn range(&self, index: usize) -> VlkResult<MemoryRange> {
        layout_range(&self.layout, index)
    }

    /// The whole mapped buffer, if it was created with `map_memory`.
    pub fn mapped_slice_mut(&mut self) -> Option<&mut [u8]> {
        if !self.mapped {
            return None;
        }
        let total = self.layout.total_size as usize;
        self.allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .map(|slice| &mut slice[..total])
    }

    /// Copy `bytes` to the start of range `index`.
    pub fn write_range(&mut self, index: usize, bytes: &[u8]) -> VlkResult<()> {
        let range = self.range(index)?;
        if bytes.len() as vk::DeviceSize > range.size {
            return Err(VlkError::InvalidParameter(format!(
                "Write of {} bytes exceeds range {} of {} bytes",
                bytes.len(),
                index,
                range.size
            )));
        }
        let mapped = self
            .mapped_slice_mut()
            .ok_or_else(|| VlkError::InvalidParameter("Buffer is not mapped".to_string()))?;
        let start = range.offset as usize;
        mapped[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Copy `bytes` into every range of the buffer.
    pub fn write_all_ranges(&mut self, bytes: &[u8]) -> VlkResult<()> {
        for index in 0..self.layout.ranges.len() {
            self.write_range(index, bytes)?;
        }
        Ok(())
    }

    /// Copy each `(range index, bytes)` pair into this buffer through a
    /// temporary host-visible staging buffer. Blocks until the copy is done.
    pub fn upload(
        &self,
        gpu: &VulkanGpu,
        command_pool: vk::CommandPool,
        queue: vk::Queue,
        writes: &[(usize, &[u8])],
    ) -> VlkResult<()> {
        let writes = staged_writes(&self.layout, writes)?;
        // Vulkan rejects zero-sized buffers and copies.
        if writes.is_empty() {
            return Ok(());
        }

        let requirements: Vec<MemoryRequirements> = writes
            .iter()
            .map(|(_, bytes)| MemoryRequirements::unaligned(bytes.len() as vk::DeviceSize))
            .collect();
        let mut staging = VulkanBuffer::new(
            gpu,
            BufferSettings::host_mapped(
                compute_memory_layout(&requirements),
                vk::BufferUsageFlags::TRANSFER_SRC,
                "staging",
            ),
        )?;

        let mut regions = Vec::with_capacity(writes.len());
        for (staging_index, &(dst, bytes)) in writes.iter().enumerate() {
            staging.write_range(staging_index, bytes)?;
            let src = staging.range(staging_index)?;
            regions.push(vk::BufferCopy {
                src_offset: src.offset,
                dst_offset: dst.offset,
                size: src.size,
            });
        }

        copy_buffer(
            gpu.device(),
            command_pool,
            queue,
            staging.buffer(),
            self.buffer,
            &regions,
        )
    }
}

fn layout_range(layout: &MemoryLayout, index: usize) -> VlkResult<MemoryRange> {
    layout.ranges.get(index).copied().ok_or_else(|| {
        VlkError::InvalidParameter(format!(
            "Range index {} out of range ({} ranges)",
            index,
            layout.ranges.len()
        ))
    })
}

/// Resolve each `(range index, bytes)` upload to its destination range.
/// Empty writes are dropped; oversized writes and bad indices are errors.
fn staged_writes<'a>(
    layout: &MemoryLayout,
    writes: &[(usize, &'a [u8])],
) -> VlkResult<Vec<(MemoryRange, &'a [u8])>> {
    let mut staged = Vec::with_capacity(writes.len());
    for &(range_index, bytes) in writes {
        let dst = layout_range(layout, range_index)?;
        if bytes.len() as vk::DeviceSize > dst.size {
            return Err(VlkError::InvalidParameter(format!(
                "Upload of {} bytes exceeds range {} of {} bytes",
                bytes.len(),
                range_index,
                dst.size
            )));
        }
        if !bytes.is_empty() {
            staged.push((dst, bytes));
        }
    }
    Ok(staged)
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe { self.device.destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.allocator.lock().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> MemoryLayout {
        compute_memory_layout(&[
            MemoryRequirements::unaligned(8),
            MemoryRequirements::unaligned(4),
        ])
    }

    #[test]
    fn test_empty_writes_are_skipped() {
        let empty: &[u8] = &[];
        let staged = staged_writes(&layout(), &[(0, empty), (1, empty)]).unwrap();
        assert!(staged.is_empty());

        let bytes: &[u8] = &[1, 2, 3, 4];
        let staged = staged_writes(&layout(), &[(0, empty), (1, bytes)]).unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].0, MemoryRange { size: 4, offset: 8 });
    }

    #[test]
    fn test_oversized_write_is_rejected() {
        let bytes: &[u8] = &[0; 5];
        let err = staged_writes(&layout(), &[(1, bytes)]).unwrap_err();
        assert!(err.to_string().contains("exceeds range 1"));
    }

    #[test]
    fn test_empty_write_to_missing_range_is_rejected() {
        let empty: &[u8] = &[];
        assert!(staged_writes(&layout(), &[(2, empty)]).is_err());
    }
}
