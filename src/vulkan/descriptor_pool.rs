//! Shared descriptor pool.

use ash::vk;

use crate::error::{VkResultExt, VlkResult};

const DESCRIPTORS_PER_TYPE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct DescriptorPoolSettings {
    pub pool_sizes: Vec<vk::DescriptorPoolSize>,
    pub max_sets: u32,
    pub flags: vk::DescriptorPoolCreateFlags,
}

impl Default for DescriptorPoolSettings {
    fn default() -> Self {
        let types = [
            vk::DescriptorType::SAMPLER,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::DescriptorType::SAMPLED_IMAGE,
            vk::DescriptorType::STORAGE_IMAGE,
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            vk::DescriptorType::STORAGE_TEXEL_BUFFER,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
            vk::DescriptorType::INPUT_ATTACHMENT,
        ];

        let pool_sizes: Vec<vk::DescriptorPoolSize> = types
            .iter()
            .map(|&ty| vk::DescriptorPoolSize {
                ty,
                descriptor_count: DESCRIPTORS_PER_TYPE,
            })
            .collect();

        Self {
            max_sets: DESCRIPTORS_PER_TYPE * pool_sizes.len() as u32,
            pool_sizes,
            flags: vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
        }
    }
}

pub struct VulkanDescriptorPool {
    device: ash::Device,
    pool: vk::DescriptorPool,
}

impl VulkanDescriptorPool {
    pub fn new(device: &ash::Device, settings: &DescriptorPoolSettings) -> VlkResult<Self> {
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(settings.flags)
            .max_sets(settings.max_sets)
            .pool_sizes(&settings.pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .context("Failed to create descriptor pool")?;

        Ok(Self {
            device: device.clone(),
            pool,
        })
    }

    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate `count` descriptor sets that all use `layout`.
    pub fn allocate(
        &self,
        layout: vk::DescriptorSetLayout,
        count: usize,
    ) -> VlkResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout; count];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor sets")
    }
}

impl Drop for VulkanDescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_covers_all_types() {
        let settings = DescriptorPoolSettings::default();
        assert_eq!(settings.pool_sizes.len(), 11);
        assert!(settings
            .pool_sizes
            .iter()
            .all(|size| size.descriptor_count == 1000));
        assert_eq!(settings.max_sets, 11_000);
        assert!(settings
            .flags
            .contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET));
    }
}
