//! Frame orchestration: acquire, record, submit, present.
//!
//! [`FrameOrchestrator`] sequences
//! `begin_frame → begin_render_pass → end_render_pass → end_frame` over a
//! fixed number of in-flight slots and rebuilds the swapchain whenever the
//! surface becomes obsolete.

use crate::command::CommandBufferPool;
use crate::device::{AcquireOutcome, FrameSubmission, PresentDevice, RenderPassBegin};
use crate::error::{GpuError, Result};
use crate::swapchain::{SurfaceGeneration, SurfaceInfo};
use crate::sync::{ImageFenceTable, SyncSet};
use crate::window::{is_degenerate, PresentationWindow};
use ash::vk;
use ember_core::MAX_FRAMES_IN_FLIGHT;

/// Advance an in-flight slot index.
pub const fn next_slot(slot: usize) -> usize {
    (slot + 1) % MAX_FRAMES_IN_FLIGHT
}

/// Presentation settings.
#[derive(Debug, Clone, Copy)]
pub struct FrameConfig {
    /// Prefer FIFO presentation over mailbox.
    pub vsync: bool,
    /// Color the swapchain image is cleared to at the start of the render pass.
    pub clear_color: [f32; 4],
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            clear_color: [0.01, 0.01, 0.01, 1.0],
        }
    }
}

/// Where the orchestrator is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    FrameAcquired { image_index: u32 },
    RecordingRenderPass { image_index: u32 },
    /// A submit or rebuild failed. Slot fences may never signal again, so no
    /// further frames are accepted.
    Failed,
}

/// Releases a superseded generation when dropped.
struct Retiring<'a, D: PresentDevice> {
    device: &'a D,
    generation: Option<SurfaceGeneration>,
}

impl<D: PresentDevice> Retiring<'_, D> {
    /// Keep the generation instead of releasing it.
    fn keep(mut self) -> Option<SurfaceGeneration> {
        self.generation.take()
    }
}

impl<D: PresentDevice> Drop for Retiring<'_, D> {
    fn drop(&mut self) {
        if let Some(generation) = self.generation.take() {
            tracing::debug!(generation = generation.id(), "Releasing superseded swapchain");
            generation.destroy(self.device);
        }
    }
}

/// Owns the swapchain, the per-slot synchronization and command buffers, and
/// the frame state machine.
pub struct FrameOrchestrator<D: PresentDevice, W: PresentationWindow> {
    device: D,
    window: W,
    config: FrameConfig,

    generation: Option<SurfaceGeneration>,
    next_generation_id: u64,
    generation_changed: bool,

    sync: SyncSet,
    command_buffers: CommandBufferPool,
    images_in_flight: ImageFenceTable,

    slot: usize,
    state: FrameState,
}

impl<D: PresentDevice, W: PresentationWindow> FrameOrchestrator<D, W> {
    /// Create the synchronization set and command buffers and build the first
    /// swapchain, blocking while the window has no drawable area.
    pub fn new(device: D, window: W, config: FrameConfig) -> Result<Self> {
        let sync = SyncSet::new(&device)?;
        let command_buffers = match CommandBufferPool::new(&device, MAX_FRAMES_IN_FLIGHT) {
            Ok(pool) => pool,
            Err(e) => {
                sync.destroy(&device);
                return Err(e);
            }
        };

        let mut orchestrator = Self {
            device,
            window,
            config,
            generation: None,
            next_generation_id: 0,
            generation_changed: false,
            sync,
            command_buffers,
            images_in_flight: ImageFenceTable::default(),
            slot: 0,
            state: FrameState::Idle,
        };

        orchestrator.rebuild()?;

        Ok(orchestrator)
    }

    /// Wait for the current slot, acquire the next image and begin recording.
    ///
    /// Returns `Ok(None)` when the surface was out of date; the swapchain has
    /// been rebuilt and the frame should be skipped.
    ///
    /// Fails with [`GpuError::InvalidState`] after an earlier submit or
    /// rebuild failure.
    ///
    /// # Panics
    /// If a frame is already in progress.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn begin_frame(&mut self) -> Result<Option<vk::CommandBuffer>> {
        if self.state == FrameState::Failed {
            return Err(GpuError::InvalidState(
                "frame orchestrator stopped after a failed submit or rebuild".into(),
            ));
        }
        assert!(
            self.state == FrameState::Idle,
            "begin_frame called while a frame is already in progress ({:?})",
            self.state
        );

        let sync = *self.sync.get(self.slot);
        sync.wait(&self.device)?;

        let swapchain = self.current().swapchain();
        match self
            .device
            .acquire_next_image(swapchain, sync.image_available)?
        {
            AcquireOutcome::OutOfDate => {
                tracing::debug!("Swapchain out of date on acquire, skipping frame");
                self.rebuild()?;
                Ok(None)
            }
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    tracing::trace!(image_index, "Acquired suboptimal image");
                }
                let command_buffer = self.command_buffers.get(self.slot);
                self.device.begin_command_buffer(command_buffer)?;
                self.state = FrameState::FrameAcquired { image_index };
                Ok(Some(command_buffer))
            }
        }
    }

    /// Finish recording, submit, present and advance to the next slot.
    ///
    /// Rebuilds the swapchain if presentation reported it obsolete or the
    /// window was resized.
    ///
    /// # Panics
    /// If no frame was begun, or a render pass is still open.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn end_frame(&mut self) -> Result<()> {
        let FrameState::FrameAcquired { image_index } = self.state else {
            panic!(
                "end_frame called without a matching begin_frame ({:?})",
                self.state
            );
        };
        self.state = FrameState::Idle;

        let command_buffer = self.command_buffers.get(self.slot);
        let sync = *self.sync.get(self.slot);

        self.device.end_command_buffer(command_buffer)?;

        // Another slot may still be rendering into this image
        if let Some(owner) = self.images_in_flight.owner(image_index) {
            self.device.wait_for_fence(owner)?;
        }
        self.images_in_flight.assign(image_index, sync.in_flight);

        // Nothing will signal the fence if the submit does not happen
        let submitted = sync.reset(&self.device).and_then(|()| {
            self.device.submit(&FrameSubmission {
                command_buffer,
                wait_semaphore: sync.image_available,
                wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                signal_semaphore: sync.render_finished,
                fence: sync.in_flight,
            })
        });
        if let Err(e) = submitted {
            tracing::error!("Frame submission failed: {e}");
            self.state = FrameState::Failed;
            return Err(e);
        }

        let swapchain = self.current().swapchain();
        let outcome = self
            .device
            .present(swapchain, image_index, sync.render_finished)?;

        self.slot = next_slot(self.slot);

        let resized = self.window.was_resized();
        if outcome.needs_rebuild() || resized {
            tracing::debug!(?outcome, resized, "Rebuilding swapchain after present");
            self.rebuild()?;
        }

        Ok(())
    }

    /// Begin the swapchain render pass on `command_buffer` and set a
    /// full-extent viewport and scissor.
    ///
    /// # Panics
    /// Outside an acquired frame, while a render pass is open, or if
    /// `command_buffer` is not the current frame's command buffer.
    pub fn begin_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        let FrameState::FrameAcquired { image_index } = self.state else {
            panic!(
                "begin_render_pass requires an acquired frame without an open render pass ({:?})",
                self.state
            );
        };
        assert_eq!(
            command_buffer,
            self.command_buffers.get(self.slot),
            "begin_render_pass called on a command buffer from a different frame"
        );

        let generation = self.current();
        let extent = generation.extent();
        let begin = RenderPassBegin {
            render_pass: generation.render_pass(),
            framebuffer: generation.framebuffer(image_index),
            extent,
            clear_values: [
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: self.config.clear_color,
                    },
                },
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
            ],
        };

        self.device.cmd_begin_render_pass(command_buffer, &begin);
        self.device.cmd_set_viewport_scissor(command_buffer, extent);

        self.state = FrameState::RecordingRenderPass { image_index };
    }

    /// End the render pass begun by [`Self::begin_render_pass`].
    ///
    /// # Panics
    /// If no render pass is open or `command_buffer` is not the current frame's.
    pub fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        let FrameState::RecordingRenderPass { image_index } = self.state else {
            panic!(
                "end_render_pass called without an open render pass ({:?})",
                self.state
            );
        };
        assert_eq!(
            command_buffer,
            self.command_buffers.get(self.slot),
            "end_render_pass called on a command buffer from a different frame"
        );

        self.device.cmd_end_render_pass(command_buffer);
        self.state = FrameState::FrameAcquired { image_index };
    }

    /// Command buffer of the frame in progress.
    ///
    /// # Panics
    /// If no frame is in progress.
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        assert!(
            self.is_frame_in_progress(),
            "no command buffer outside of a frame"
        );
        self.command_buffers.get(self.slot)
    }

    /// In-flight slot of the frame in progress, in `[0, MAX_FRAMES_IN_FLIGHT)`.
    ///
    /// # Panics
    /// If no frame is in progress.
    pub fn frame_index(&self) -> usize {
        assert!(
            self.is_frame_in_progress(),
            "no frame index outside of a frame"
        );
        self.slot
    }

    pub fn is_frame_in_progress(&self) -> bool {
        matches!(
            self.state,
            FrameState::FrameAcquired { .. } | FrameState::RecordingRenderPass { .. }
        )
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.current().render_pass()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.current().extent()
    }

    /// Width over height of the swapchain.
    pub fn aspect_ratio(&self) -> f32 {
        self.current().aspect_ratio()
    }

    pub fn image_count(&self) -> usize {
        self.current().image_count()
    }

    pub fn color_format(&self) -> vk::Format {
        self.current().color_format()
    }

    pub fn depth_format(&self) -> vk::Format {
        self.current().depth_format()
    }

    /// Id of the current surface generation. Increases on every rebuild.
    pub fn generation_id(&self) -> u64 {
        self.current().id()
    }

    /// Report the current generation once after each (re)build.
    ///
    /// Pipelines built against an older render pass must be rebuilt when this
    /// returns `Some`.
    pub fn take_generation_changed(&mut self) -> Option<SurfaceInfo> {
        if std::mem::take(&mut self.generation_changed) {
            self.generation.as_ref().map(SurfaceGeneration::info)
        } else {
            None
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn current(&self) -> &SurfaceGeneration {
        match &self.generation {
            Some(generation) => generation,
            None => panic!("swapchain was lost after a failed rebuild"),
        }
    }

    /// Block until the window has a non-zero drawable extent.
    fn wait_for_drawable_extent(&self) -> vk::Extent2D {
        let mut extent = self.window.drawable_extent();
        if is_degenerate(extent) {
            tracing::debug!("Window has no drawable area, waiting");
        }
        while is_degenerate(extent) {
            self.window.wait_events();
            extent = self.window.drawable_extent();
        }
        extent
    }

    /// Replace the current generation with one matching the window.
    ///
    /// Drains the device first. The previous generation is released on every
    /// path once the new one exists or the build has failed. Clears the
    /// window's resize flag, which this rebuild satisfies.
    fn rebuild(&mut self) -> Result<()> {
        self.window.reset_resized();
        loop {
            let extent = self.wait_for_drawable_extent();
            if let Err(e) = self.device.wait_idle() {
                self.state = FrameState::Failed;
                return Err(e);
            }

            let id = self.next_generation_id;
            let retiring = Retiring {
                device: &self.device,
                generation: self.generation.take(),
            };

            let new = match SurfaceGeneration::build(
                &self.device,
                extent,
                retiring.generation.as_ref(),
                self.config.vsync,
                id,
            ) {
                Ok(generation) => generation,
                Err(GpuError::DegenerateExtent { width, height }) => {
                    tracing::debug!(width, height, "Surface extent is degenerate, waiting");
                    self.generation = retiring.keep();
                    self.window.wait_events();
                    continue;
                }
                Err(e) => {
                    tracing::error!("Swapchain rebuild failed: {e}");
                    self.state = FrameState::Failed;
                    return Err(e);
                }
            };

            let drift = retiring
                .generation
                .as_ref()
                .filter(|previous| !new.compare_formats(previous))
                .map(|previous| GpuError::FormatDrift {
                    old_color: previous.color_format(),
                    new_color: new.color_format(),
                    old_depth: previous.depth_format(),
                    new_depth: new.depth_format(),
                });

            self.next_generation_id += 1;
            self.images_in_flight.reconcile(new.image_count());
            self.generation_changed = true;
            self.generation = Some(new);
            drop(retiring);

            return match drift {
                Some(e) => Err(e),
                None => Ok(()),
            };
        }
    }
}

impl<D: PresentDevice, W: PresentationWindow> Drop for FrameOrchestrator<D, W> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::warn!("Failed to wait for device idle during shutdown: {e}");
        }
        if let Some(generation) = self.generation.take() {
            generation.destroy(&self.device);
        }
        self.command_buffers.free(&self.device);
        self.sync.destroy(&self.device);
    }
}
