//! Per-frame shared resource bundle.
//!
//! One uniform buffer and one descriptor set per in-flight slot, so the CPU
//! can fill slot `n`'s uniforms while the GPU still reads slot `n - 1`'s.

use ash::vk;
use ember_core::MAX_FRAMES_IN_FLIGHT;
use ember_gpu::descriptors::{write_uniform_buffer, DescriptorPool, DescriptorSetLayoutBuilder};
use ember_gpu::error::{GpuError, Result};
use ember_gpu::memory::GpuBuffer;
use ember_gpu::GpuContext;
use gpu_allocator::MemoryLocation;

use crate::uniforms::SceneUniforms;

/// Uniform buffers and descriptor sets indexed by in-flight slot.
pub struct FrameResources {
    buffers: Vec<GpuBuffer>,
    layout: vk::DescriptorSetLayout,
    pool: Option<DescriptorPool>,
    sets: Vec<vk::DescriptorSet>,
}

impl FrameResources {
    /// Allocate host-visible uniform buffers and their descriptor sets.
    pub fn new(gpu: &GpuContext) -> Result<Self> {
        let mut resources = Self {
            buffers: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            layout: vk::DescriptorSetLayout::null(),
            pool: None,
            sets: Vec::new(),
        };

        if let Err(e) = resources.create(gpu) {
            resources.destroy(gpu);
            return Err(e);
        }

        tracing::debug!(
            slots = MAX_FRAMES_IN_FLIGHT,
            size = SceneUniforms::SIZE,
            "Created per-frame uniform buffers"
        );

        Ok(resources)
    }

    fn create(&mut self, gpu: &GpuContext) -> Result<()> {
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let buffer = gpu.allocator().lock().create_buffer(
                SceneUniforms::SIZE,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                &format!("scene_uniforms_{slot}"),
            )?;
            self.buffers.push(buffer);
        }

        let layout_builder = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS);
        let set_count = MAX_FRAMES_IN_FLIGHT as u32;

        unsafe {
            self.layout = layout_builder.build(gpu.device())?;

            let pool = self.pool.insert(DescriptorPool::new(
                gpu.device(),
                set_count,
                &layout_builder.pool_sizes(set_count),
            )?);

            let layouts = vec![self.layout; MAX_FRAMES_IN_FLIGHT];
            self.sets = pool.allocate(gpu.device(), &layouts)?;

            for (set, buffer) in self.sets.iter().zip(&self.buffers) {
                write_uniform_buffer(
                    gpu.device(),
                    *set,
                    0,
                    buffer.buffer,
                    0,
                    SceneUniforms::SIZE,
                );
            }
        }

        Ok(())
    }

    /// Copy `uniforms` into `slot`'s buffer.
    ///
    /// The memory is host-coherent; writing before the frame is submitted is
    /// the only ordering needed.
    pub fn write(&self, slot: usize, uniforms: &SceneUniforms) -> Result<()> {
        let buffer = self
            .buffers
            .get(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("No uniform buffer for slot {slot}")))?;
        buffer.write_pod(uniforms)
    }

    /// Descriptor set bound to `slot`'s uniform buffer.
    pub fn descriptor_set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }

    /// Layout of the per-frame descriptor set, for pipeline layouts.
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Uniform buffer of `slot`.
    pub fn uniform_buffer(&self, slot: usize) -> vk::Buffer {
        self.buffers[slot].buffer
    }

    /// Destroy all GPU resources.
    ///
    /// No frame using these resources may still be in flight.
    pub fn destroy(&mut self, gpu: &GpuContext) {
        unsafe {
            if let Some(pool) = self.pool.take() {
                pool.destroy(gpu.device());
            }
            self.sets.clear();
            if self.layout != vk::DescriptorSetLayout::null() {
                gpu.device().destroy_descriptor_set_layout(self.layout, None);
                self.layout = vk::DescriptorSetLayout::null();
            }
        }

        let mut allocator = gpu.allocator().lock();
        for mut buffer in self.buffers.drain(..) {
            if let Err(e) = allocator.free_buffer(&mut buffer) {
                tracing::warn!("Failed to free uniform buffer: {e}");
            }
        }
    }
}
