//! Buffer memory layouts and memory type selection.
//!
//! A [`MemoryLayout`] packs several equally sized (or differently sized)
//! sub-ranges into a single buffer, e.g. one uniform block per frame in
//! flight, or positions + colors + indices of a mesh.

use ash::vk;

use crate::error::{VkResultExt, VlkError, VlkResult};

/// A sub-range of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryRange {
    pub size: vk::DeviceSize,
    pub offset: vk::DeviceSize,
}

/// A set of sub-ranges packed into one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryLayout {
    pub total_size: vk::DeviceSize,
    pub ranges: Vec<MemoryRange>,
}

/// Size and alignment of a single sub-range. An alignment of zero means
/// the range may start at any offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryRequirements {
    pub size: vk::DeviceSize,
    pub alignment: vk::DeviceSize,
}

impl MemoryRequirements {
    pub fn unaligned(size: vk::DeviceSize) -> Self {
        Self { size, alignment: 0 }
    }

    pub fn aligned(size: vk::DeviceSize, alignment: vk::DeviceSize) -> Self {
        Self { size, alignment }
    }

    /// Requirements for `count` tightly packed values of `T`.
    pub fn of<T>(count: usize) -> Self {
        Self::unaligned((std::mem::size_of::<T>() * count) as vk::DeviceSize)
    }
}

fn align_up(value: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment == 0 {
        return value;
    }
    match value % alignment {
        0 => value,
        remainder => value + (alignment - remainder),
    }
}

/// Append one range to `layout`. The range starts at the next multiple of
/// its alignment and the running total is padded to that alignment again.
pub fn append_memory_size(layout: &mut MemoryLayout, requirements: MemoryRequirements) {
    let offset = align_up(layout.total_size, requirements.alignment);
    layout.ranges.push(MemoryRange {
        size: requirements.size,
        offset,
    });
    layout.total_size = align_up(offset + requirements.size, requirements.alignment);
}

/// Reset `layout` and fill it with `count` copies of `requirements`.
pub fn append_memory_size_n(
    layout: &mut MemoryLayout,
    requirements: MemoryRequirements,
    count: usize,
) {
    layout.total_size = 0;
    layout.ranges.clear();
    layout.ranges.reserve(count);
    for _ in 0..count {
        append_memory_size(layout, requirements);
    }
}

/// Build a layout from an ordered list of requirements.
pub fn compute_memory_layout(requirements: &[MemoryRequirements]) -> MemoryLayout {
    let mut layout = MemoryLayout::default();
    for &req in requirements {
        append_memory_size(&mut layout, req);
    }
    layout
}

/// Convenience wrapper: `count` ranges of `size` bytes each.
pub fn repeated_layout(requirements: MemoryRequirements, count: usize) -> MemoryLayout {
    let mut layout = MemoryLayout::default();
    append_memory_size_n(&mut layout, requirements, count);
    layout
}

/// Copy region that moves a tightly packed staging buffer into `range`.
pub fn make_copy_region(range: &MemoryRange) -> vk::BufferCopy {
    vk::BufferCopy {
        src_offset: 0,
        dst_offset: range.offset,
        size: range.size,
    }
}

/// Find the first memory type compatible with every requirement and carrying
/// all of `properties`.
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: &[vk::MemoryRequirements],
    properties: vk::MemoryPropertyFlags,
) -> VlkResult<u32> {
    let count = memory_properties.memory_type_count as usize;
    memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(i, memory_type)| {
            let type_bit = 1u32 << i;
            requirements
                .iter()
                .all(|req| req.memory_type_bits & type_bit != 0)
                && memory_type.property_flags.contains(properties)
        })
        .map(|(i, _)| i as u32)
        .ok_or_else(|| {
            VlkError::ResourceCreationFailed("Failed to find suitable memory type".to_string())
        })
}

/// Record, submit and wait on a one-time copy between two buffers.
pub fn copy_buffer(
    device: &ash::Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    src: vk::Buffer,
    dst: vk::Buffer,
    regions: &[vk::BufferCopy],
) -> VlkResult<()> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let command_buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate copy command buffer")?;

    let result = (|| {
        let cmd = command_buffers[0];
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin copy command buffer")?;
            device.cmd_copy_buffer(cmd, src, dst, regions);
            device
                .end_command_buffer(cmd)
                .context("Failed to end copy command buffer")?;

            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            device
                .queue_submit(queue, &[submit_info], vk::Fence::null())
                .context("Failed to submit copy command buffer")?;
            device
                .queue_wait_idle(queue)
                .context("Failed to wait for copy queue")
        }
    })();

    unsafe { device.free_command_buffers(command_pool, &command_buffers) };
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unaligned_ranges_are_packed() {
        let layout = compute_memory_layout(&[
            MemoryRequirements::unaligned(12),
            MemoryRequirements::unaligned(20),
            MemoryRequirements::unaligned(4),
        ]);
        assert_eq!(layout.total_size, 36);
        assert_eq!(
            layout.ranges,
            vec![
                MemoryRange { size: 12, offset: 0 },
                MemoryRange { size: 20, offset: 12 },
                MemoryRange { size: 4, offset: 32 },
            ]
        );
    }

    #[test]
    fn test_aligned_ranges_start_on_alignment() {
        let mut layout = MemoryLayout::default();
        append_memory_size_n(&mut layout, MemoryRequirements::aligned(4, 256), 3);
        let offsets: Vec<_> = layout.ranges.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 256, 512]);
        assert!(layout.ranges.iter().all(|r| r.size == 4));
        assert_eq!(layout.total_size, 768);
    }

    #[test]
    fn test_aligned_range_after_unaligned_one() {
        let layout = compute_memory_layout(&[
            MemoryRequirements::unaligned(3),
            MemoryRequirements::aligned(4, 256),
        ]);
        assert_eq!(
            layout.ranges,
            vec![
                MemoryRange { size: 3, offset: 0 },
                MemoryRange { size: 4, offset: 256 },
            ]
        );
        assert_eq!(layout.total_size, 512);
    }

    #[test]
    fn test_unaligned_range_after_aligned_one() {
        let layout = compute_memory_layout(&[
            MemoryRequirements::aligned(10, 16),
            MemoryRequirements::unaligned(3),
        ]);
        assert_eq!(layout.ranges[1].offset, 16);
        assert_eq!(layout.total_size, 19);
    }

    #[test]
    fn test_already_aligned_size_adds_no_padding() {
        let layout = repeated_layout(MemoryRequirements::aligned(64, 64), 2);
        assert_eq!(layout.total_size, 128);
        assert_eq!(layout.ranges[1].offset, 64);
    }

    #[test]
    fn test_append_n_resets_previous_contents() {
        let mut layout = compute_memory_layout(&[MemoryRequirements::unaligned(100)]);
        append_memory_size_n(&mut layout, MemoryRequirements::unaligned(8), 2);
        assert_eq!(layout.ranges.len(), 2);
        assert_eq!(layout.total_size, 16);
    }

    #[test]
    fn test_requirements_of_type() {
        let req = MemoryRequirements::of::<[f32; 3]>(4);
        assert_eq!(req.size, 48);
        assert_eq!(req.alignment, 0);
    }

    #[test]
    fn test_copy_region_targets_range() {
        let region = make_copy_region(&MemoryRange { size: 96, offset: 32 });
        assert_eq!(region.src_offset, 0);
        assert_eq!(region.dst_offset, 32);
        assert_eq!(region.size, 96);
    }

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &f) in flags.iter().enumerate() {
            props.memory_types[i].property_flags = f;
        }
        props
    }

    #[test]
    fn test_find_memory_type_index() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let req = vk::MemoryRequirements {
            memory_type_bits: 0b111,
            ..Default::default()
        };

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type_index(&props, &[req], host).unwrap(), 2);
        assert_eq!(
            find_memory_type_index(&props, &[req], vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn test_find_memory_type_respects_every_requirement() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        let a = vk::MemoryRequirements {
            memory_type_bits: 0b11,
            ..Default::default()
        };
        let b = vk::MemoryRequirements {
            memory_type_bits: 0b10,
            ..Default::default()
        };
        assert_eq!(
            find_memory_type_index(&props, &[a, b], vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            1
        );

        let err = find_memory_type_index(&props, &[a], vk::MemoryPropertyFlags::HOST_VISIBLE)
            .unwrap_err();
        assert!(err.to_string().contains("Failed to find suitable memory type"));
    }
}
