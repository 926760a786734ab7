//! Frame orchestrator behavior over many frames with scripted outcomes.

use std::collections::HashMap;

use ash::vk::{self, Handle};
use ember_core::MAX_FRAMES_IN_FLIGHT;
use ember_gpu::{
    AcquireOutcome, FrameConfig, FrameOrchestrator, FrameState, GpuError, PresentOutcome,
    PresentationWindow,
};
use ember_test::{DeviceCall, DeviceProbe, FailPoint, RecordingDevice, ScriptedWindow};

type Frames = FrameOrchestrator<RecordingDevice, ScriptedWindow>;

fn setup(width: u32, height: u32) -> (Frames, DeviceProbe, ScriptedWindow) {
    let (device, probe) = RecordingDevice::new();
    let window = ScriptedWindow::new(width, height);
    let frames = Frames::new(device, window.clone(), FrameConfig::default()).unwrap();
    (frames, probe, window)
}

/// Run one full frame. Returns false if the frame was skipped.
fn draw(frames: &mut Frames) -> ember_gpu::Result<bool> {
    let Some(cmd) = frames.begin_frame()? else {
        return Ok(false);
    };
    frames.begin_render_pass(cmd);
    frames.end_render_pass(cmd);
    frames.end_frame()?;
    Ok(true)
}

fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

#[test]
fn initial_build_matches_window() {
    let (frames, probe, _window) = setup(800, 600);

    assert_eq!(frames.extent(), extent(800, 600));
    assert_eq!(frames.image_count(), 3);
    assert_eq!(frames.generation_id(), 0);
    assert_eq!(frames.state(), FrameState::Idle);
    assert_eq!(frames.color_format(), vk::Format::B8G8R8A8_SRGB);
    assert_eq!(frames.depth_format(), vk::Format::D32_SFLOAT);

    let allocations: Vec<_> = probe
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DeviceCall::AllocateCommandBuffers(buffers) => Some(buffers),
            _ => None,
        })
        .collect();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].len(), MAX_FRAMES_IN_FLIGHT);

    let signaled_fences = probe.count(|c| matches!(c, DeviceCall::CreateFence { signaled: true, .. }));
    assert_eq!(signaled_fences, MAX_FRAMES_IN_FLIGHT);
}

#[test]
fn frame_returns_to_idle() {
    let (mut frames, probe, _window) = setup(800, 600);

    let cmd = frames.begin_frame().unwrap().unwrap();
    assert!(frames.is_frame_in_progress());
    assert_eq!(frames.current_command_buffer(), cmd);
    assert_eq!(frames.frame_index(), 0);

    frames.begin_render_pass(cmd);
    assert!(matches!(
        frames.state(),
        FrameState::RecordingRenderPass { .. }
    ));
    frames.end_render_pass(cmd);
    frames.end_frame().unwrap();

    assert_eq!(frames.state(), FrameState::Idle);
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::Present { .. })), 1);

    let cmd = frames.begin_frame().unwrap().unwrap();
    assert_eq!(frames.frame_index(), 1);
    assert_eq!(frames.current_command_buffer(), cmd);
}

#[test]
fn submission_chains_acquire_render_and_present() {
    let (mut frames, probe, _window) = setup(800, 600);
    for _ in 0..4 {
        assert!(draw(&mut frames).unwrap());
    }

    let calls = probe.calls();
    let acquires: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            DeviceCall::Acquire { semaphore, .. } => Some(*semaphore),
            _ => None,
        })
        .collect();
    let submits: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            DeviceCall::Submit(submission) => Some(*submission),
            _ => None,
        })
        .collect();
    let presents: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            DeviceCall::Present { wait, .. } => Some(*wait),
            _ => None,
        })
        .collect();

    assert_eq!(submits.len(), 4);
    for (i, submission) in submits.iter().enumerate() {
        assert_eq!(submission.wait_semaphore, acquires[i]);
        assert_eq!(submission.signal_semaphore, presents[i]);
        assert_eq!(
            submission.wait_stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
    }
    // Slots alternate and repeat
    assert_ne!(submits[0].fence, submits[1].fence);
    assert_eq!(submits[0], submits[2]);
    assert_eq!(submits[1].command_buffer, submits[3].command_buffer);
}

#[test]
fn fence_is_reset_only_before_submit() {
    let (mut frames, probe, _window) = setup(800, 600);
    probe.script_acquire(1, AcquireOutcome::OutOfDate);
    for _ in 0..5 {
        draw(&mut frames).unwrap();
    }

    let resets = probe.count(|c| matches!(c, DeviceCall::ResetFence(_)));
    let submits = probe.count(|c| matches!(c, DeviceCall::Submit(_)));
    assert_eq!(submits, 4);
    assert_eq!(resets, submits);

    // Every reset is immediately followed by the submit that signals the fence
    let calls = probe.calls();
    for (i, call) in calls.iter().enumerate() {
        if let DeviceCall::ResetFence(fence) = call {
            assert!(
                matches!(&calls[i + 1], DeviceCall::Submit(s) if s.fence == *fence),
                "reset of {fence:?} not followed by its submit"
            );
        }
    }
}

#[test]
fn render_pass_targets_acquired_image() {
    let (mut frames, probe, _window) = setup(800, 600);
    probe.script_acquire(
        0,
        AcquireOutcome::Acquired {
            image_index: 2,
            suboptimal: false,
        },
    );
    let render_pass = frames.render_pass();

    let framebuffers: Vec<_> = probe
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DeviceCall::CreateFramebuffer { framebuffer, .. } => Some(framebuffer),
            _ => None,
        })
        .collect();

    let cmd = frames.begin_frame().unwrap().unwrap();
    frames.begin_render_pass(cmd);

    let calls = probe.calls();
    let n = calls.len();
    assert_eq!(
        calls[n - 2],
        DeviceCall::BeginRenderPass {
            command_buffer: cmd,
            render_pass,
            framebuffer: framebuffers[2],
            extent: extent(800, 600),
        }
    );
    assert_eq!(
        calls[n - 1],
        DeviceCall::SetViewportScissor {
            command_buffer: cmd,
            extent: extent(800, 600),
        }
    );

    frames.end_render_pass(cmd);
    assert_eq!(probe.calls().last(), Some(&DeviceCall::EndRenderPass(cmd)));
    frames.end_frame().unwrap();
}

#[test]
fn image_reuse_waits_for_previous_owner() {
    let (mut frames, probe, window) = setup(800, 600);

    // Two slots, three images; acquire some images out of order
    probe.script_acquire(
        1,
        AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: false,
        },
    );
    probe.script_acquire(
        4,
        AcquireOutcome::Acquired {
            image_index: 2,
            suboptimal: true,
        },
    );
    for frame in 0..16 {
        if frame == 8 {
            // Fewer images after a rebuild
            probe.set_image_count_bounds(1, 2);
            window.resize(640, 480);
        }
        draw(&mut frames).unwrap();
    }
    assert_eq!(frames.image_count(), 2);

    let mut owners: HashMap<u32, vk::Fence> = HashMap::new();
    let mut waited: Vec<vk::Fence> = Vec::new();
    let mut image = None;
    let mut checked = 0;

    for call in probe.calls() {
        match call {
            DeviceCall::CreateSwapchain { .. } => owners.clear(),
            DeviceCall::WaitForFence(fence) => waited.push(fence),
            DeviceCall::Acquire {
                outcome: AcquireOutcome::Acquired { image_index, .. },
                ..
            } => image = Some(image_index),
            DeviceCall::Submit(submission) => {
                let Some(index) = image.take() else {
                    panic!("submit without an acquired image");
                };
                if let Some(owner) = owners.get(&index) {
                    assert!(
                        *owner == submission.fence || waited.contains(owner),
                        "image {index} reused without waiting on {owner:?}"
                    );
                    checked += 1;
                }
                owners.insert(index, submission.fence);
                waited.clear();
            }
            _ => {}
        }
    }
    assert!(checked > 0);
}

#[test]
fn image_held_by_other_slot_is_waited_before_submit() {
    let (mut frames, probe, _window) = setup(800, 600);
    probe.script_acquire(
        1,
        AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: false,
        },
    );

    draw(&mut frames).unwrap();
    let first_fence = probe
        .calls()
        .into_iter()
        .find_map(|call| match call {
            DeviceCall::Submit(s) => Some(s.fence),
            _ => None,
        })
        .unwrap();
    probe.clear_calls();

    draw(&mut frames).unwrap();

    let wait = probe
        .position("wait on first slot", |c| {
            *c == DeviceCall::WaitForFence(first_fence)
        })
        .unwrap();
    let end = probe
        .position("end recording", |c| matches!(c, DeviceCall::EndCommandBuffer(_)))
        .unwrap();
    let submit = probe
        .position("submit", |c| matches!(c, DeviceCall::Submit(_)))
        .unwrap();
    assert!(end < wait);
    assert!(wait < submit);
}

#[test]
fn out_of_date_acquire_skips_frame_and_rebuilds() {
    let (mut frames, probe, window) = setup(800, 600);
    probe.script_acquire(10, AcquireOutcome::OutOfDate);

    for _ in 0..10 {
        assert!(draw(&mut frames).unwrap());
    }
    assert_eq!(frames.generation_id(), 0);

    window.set_extent(1024, 768);
    probe.clear_calls();

    assert!(frames.begin_frame().unwrap().is_none());
    assert_eq!(frames.state(), FrameState::Idle);
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::BeginCommandBuffer(_))), 0);
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::Submit(_))), 0);
    assert_eq!(frames.generation_id(), 1);
    assert_eq!(probe.swapchain_extents(), vec![extent(1024, 768)]);

    let wait_idle = probe
        .position("wait idle", |c| *c == DeviceCall::WaitIdle)
        .unwrap();
    let create = probe
        .position("create swapchain", |c| {
            matches!(c, DeviceCall::CreateSwapchain { .. })
        })
        .unwrap();
    let destroy_old = probe
        .position("destroy old swapchain", |c| {
            matches!(c, DeviceCall::DestroySwapchain(_))
        })
        .unwrap();
    assert!(wait_idle < create);
    assert!(create < destroy_old);

    // Frame 11 renders into the new generation
    probe.clear_calls();
    assert!(draw(&mut frames).unwrap());
    assert_eq!(frames.extent(), extent(1024, 768));
    assert_eq!(
        probe.count(|c| matches!(
            c,
            DeviceCall::BeginRenderPass { extent: e, .. } if *e == extent(1024, 768)
        )),
        1
    );
}

#[test]
fn suboptimal_present_rebuilds() {
    let (mut frames, probe, _window) = setup(800, 600);
    probe.script_present(2, PresentOutcome::Suboptimal);

    for _ in 0..2 {
        draw(&mut frames).unwrap();
    }
    assert_eq!(frames.generation_id(), 0);

    draw(&mut frames).unwrap();
    assert_eq!(frames.generation_id(), 1);
    assert_eq!(frames.state(), FrameState::Idle);
}

#[test]
fn out_of_date_present_rebuilds() {
    let (mut frames, probe, _window) = setup(800, 600);
    probe.script_present(0, PresentOutcome::OutOfDate);

    draw(&mut frames).unwrap();
    assert_eq!(frames.generation_id(), 1);
    assert_eq!(
        probe.count(|c| matches!(c, DeviceCall::CreateSwapchain { .. })),
        2
    );
}

#[test]
fn resize_flag_rebuilds_and_clears() {
    let (mut frames, probe, window) = setup(800, 600);
    draw(&mut frames).unwrap();

    window.resize(1280, 720);
    draw(&mut frames).unwrap();

    assert!(!window.was_resized());
    assert_eq!(frames.extent(), extent(1280, 720));
    assert_eq!(frames.generation_id(), 1);
    assert_eq!(
        probe.swapchain_extents(),
        vec![extent(800, 600), extent(1280, 720)]
    );

    // No further rebuild without a new trigger
    draw(&mut frames).unwrap();
    assert_eq!(frames.generation_id(), 1);
}

#[test]
fn rebuild_on_acquire_consumes_the_resize() {
    let (mut frames, probe, window) = setup(800, 600);
    probe.script_acquire(1, AcquireOutcome::OutOfDate);
    draw(&mut frames).unwrap();

    window.resize(640, 480);
    assert!(!draw(&mut frames).unwrap());
    assert!(!window.was_resized());

    assert!(draw(&mut frames).unwrap());
    assert_eq!(frames.generation_id(), 1);
    assert_eq!(
        probe.swapchain_extents(),
        vec![extent(800, 600), extent(640, 480)]
    );
    assert_eq!(probe.count(|c| *c == DeviceCall::WaitIdle), 2);
}

#[test]
fn failed_acquire_begins_no_recording() {
    let (mut frames, probe, _window) = setup(800, 600);
    draw(&mut frames).unwrap();
    probe.clear_calls();
    probe.fail_next(FailPoint::Acquire);

    assert!(matches!(
        frames.begin_frame(),
        Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
    ));
    assert_eq!(frames.state(), FrameState::Idle);
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::BeginCommandBuffer(_))), 0);
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::ResetFence(_))), 0);
    assert_eq!(frames.generation_id(), 0);
}

#[test]
fn failed_submit_stops_the_orchestrator() {
    let (mut frames, probe, _window) = setup(800, 600);
    draw(&mut frames).unwrap();
    probe.fail_next(FailPoint::Submit);

    assert!(matches!(
        draw(&mut frames),
        Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
    ));
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::Present { .. })), 1);
    assert_eq!(frames.state(), FrameState::Failed);
    assert!(!frames.is_frame_in_progress());

    // The slot fence was reset and will never signal
    probe.clear_calls();
    assert!(matches!(
        frames.begin_frame(),
        Err(GpuError::InvalidState(_))
    ));
    assert!(probe.calls().is_empty());

    drop(frames);
    assert_eq!(probe.live_objects(), 0);
}

#[test]
fn failed_present_is_returned_without_rebuild() {
    let (mut frames, probe, _window) = setup(800, 600);
    probe.fail_next(FailPoint::Present);

    assert!(matches!(
        draw(&mut frames),
        Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
    ));
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::Submit(_))), 1);
    assert_eq!(
        probe.count(|c| matches!(c, DeviceCall::CreateSwapchain { .. })),
        1
    );
    assert_eq!(frames.generation_id(), 0);
    assert_eq!(frames.state(), FrameState::Idle);
}

#[test]
fn failed_rebuild_releases_the_previous_generation() {
    let (mut frames, probe, window) = setup(800, 600);
    draw(&mut frames).unwrap();
    let old_swapchain = probe
        .calls()
        .into_iter()
        .find_map(|call| match call {
            DeviceCall::CreateSwapchain { swapchain, .. } => Some(swapchain),
            _ => None,
        })
        .unwrap();

    window.resize(1024, 768);
    probe.fail_next(FailPoint::CreateRenderPass);

    assert!(matches!(
        draw(&mut frames),
        Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
    ));
    assert_eq!(frames.state(), FrameState::Failed);
    assert!(probe.calls().contains(&DeviceCall::DestroySwapchain(old_swapchain)));
    assert_eq!(
        probe.count(|c| matches!(c, DeviceCall::DestroySwapchain(_))),
        2
    );
    assert!(frames.begin_frame().is_err());

    drop(frames);
    assert_eq!(probe.live_objects(), 0);
    assert!(probe.unknown_releases().is_empty());
}

#[test]
fn generation_change_is_reported_once() {
    let (mut frames, probe, window) = setup(800, 600);

    let initial = frames.take_generation_changed().unwrap();
    assert_eq!(initial.generation, 0);
    assert_eq!(initial.extent, extent(800, 600));
    assert_eq!(initial.render_pass, frames.render_pass());
    assert!(frames.take_generation_changed().is_none());

    draw(&mut frames).unwrap();
    assert!(frames.take_generation_changed().is_none());

    window.resize(400, 300);
    draw(&mut frames).unwrap();
    let rebuilt = frames.take_generation_changed().unwrap();
    assert_eq!(rebuilt.generation, 1);
    assert_eq!(rebuilt.extent, extent(400, 300));
    assert_eq!(rebuilt.image_count, 3);
    assert!(frames.take_generation_changed().is_none());

    drop(frames);
    assert_eq!(probe.live_objects(), 0);
}

#[test]
fn format_drift_is_an_error_but_keeps_the_new_generation() {
    let (mut frames, probe, window) = setup(800, 600);
    draw(&mut frames).unwrap();

    probe.set_formats(vec![vk::SurfaceFormatKHR {
        format: vk::Format::R16G16B16A16_SFLOAT,
        color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
    }]);
    window.resize(800, 600);

    let result = draw(&mut frames);
    assert!(matches!(
        result,
        Err(GpuError::FormatDrift {
            old_color: vk::Format::B8G8R8A8_SRGB,
            new_color: vk::Format::R16G16B16A16_SFLOAT,
            ..
        })
    ));
    assert_eq!(frames.generation_id(), 1);
    assert_eq!(frames.color_format(), vk::Format::R16G16B16A16_SFLOAT);
    assert_eq!(frames.state(), FrameState::Idle);

    // Still usable after the caller rebuilds its pipelines
    assert!(draw(&mut frames).unwrap());
}

#[test]
fn minimized_window_defers_first_build() {
    let (device, probe) = RecordingDevice::new();
    let window = ScriptedWindow::new(0, 0);
    window.queue_extents([(0, 0), (640, 480)]);

    let frames = Frames::new(device, window.clone(), FrameConfig::default()).unwrap();

    assert_eq!(window.wait_count(), 2);
    assert_eq!(frames.extent(), extent(640, 480));
    assert_eq!(probe.swapchain_extents(), vec![extent(640, 480)]);
}

#[test]
fn zero_surface_extent_waits_for_events() {
    let (device, probe) = RecordingDevice::new();
    probe.set_current_extent(Some(extent(0, 0)));
    let window = ScriptedWindow::new(800, 600);
    let restore = probe.clone();
    window.on_wait(move || restore.set_current_extent(None));

    let frames = Frames::new(device, window.clone(), FrameConfig::default()).unwrap();

    assert_eq!(window.wait_count(), 1);
    assert_eq!(probe.swapchain_extents(), vec![extent(800, 600)]);
    assert_eq!(frames.extent(), extent(800, 600));
}

#[test]
fn minimize_during_resize_keeps_waiting() {
    let (mut frames, probe, window) = setup(800, 600);
    draw(&mut frames).unwrap();

    window.resize(0, 0);
    window.queue_extents([(0, 0), (300, 200)]);
    draw(&mut frames).unwrap();

    assert_eq!(window.wait_count(), 2);
    assert_eq!(frames.extent(), extent(300, 200));
    assert!(!probe
        .swapchain_extents()
        .iter()
        .any(|e| e.width == 0 || e.height == 0));
}

#[test]
fn shutdown_drains_then_releases_everything() {
    let (mut frames, probe, window) = setup(800, 600);
    for i in 0..6 {
        if i == 3 {
            window.resize(1024, 768);
        }
        draw(&mut frames).unwrap();
    }
    probe.clear_calls();

    drop(frames);

    let calls = probe.calls();
    assert_eq!(calls.first(), Some(&DeviceCall::WaitIdle));
    assert_eq!(calls.last(), Some(&DeviceCall::DestroyCommandPool));

    let free = probe
        .position("free command buffers", |c| {
            matches!(c, DeviceCall::FreeCommandBuffers(buffers) if buffers.len() == MAX_FRAMES_IN_FLIGHT)
        })
        .unwrap();
    let swapchain = probe
        .position("destroy swapchain", |c| {
            matches!(c, DeviceCall::DestroySwapchain(_))
        })
        .unwrap();
    assert!(swapchain < free);
    assert_eq!(
        probe.count(|c| matches!(c, DeviceCall::FreeCommandBuffers(_))),
        1
    );
    assert_eq!(
        probe.count(|c| matches!(c, DeviceCall::DestroyFence(_))),
        MAX_FRAMES_IN_FLIGHT
    );
    assert_eq!(
        probe.count(|c| matches!(c, DeviceCall::DestroySemaphore(_))),
        MAX_FRAMES_IN_FLIGHT * 2
    );

    assert_eq!(probe.live_objects(), 0);
    assert!(probe.unknown_releases().is_empty());
}

#[test]
#[should_panic(expected = "end_frame called without a matching begin_frame")]
fn end_without_begin_panics() {
    let (mut frames, _probe, _window) = setup(800, 600);
    let _ = frames.end_frame();
}

#[test]
#[should_panic(expected = "begin_frame called while a frame is already in progress")]
fn begin_twice_panics() {
    let (mut frames, _probe, _window) = setup(800, 600);
    let _ = frames.begin_frame();
    let _ = frames.begin_frame();
}

#[test]
#[should_panic(expected = "begin_render_pass requires an acquired frame")]
fn render_pass_outside_frame_panics() {
    let (mut frames, _probe, _window) = setup(800, 600);
    frames.begin_render_pass(vk::CommandBuffer::null());
}

#[test]
#[should_panic(expected = "end_frame called without a matching begin_frame")]
fn end_frame_with_open_render_pass_panics() {
    let (mut frames, _probe, _window) = setup(800, 600);
    let cmd = frames.begin_frame().unwrap().unwrap();
    frames.begin_render_pass(cmd);
    let _ = frames.end_frame();
}

#[test]
#[should_panic(expected = "command buffer from a different frame")]
fn foreign_command_buffer_panics() {
    let (mut frames, _probe, _window) = setup(800, 600);
    frames.begin_frame().unwrap().unwrap();
    frames.begin_render_pass(vk::CommandBuffer::from_raw(0xdead));
}

#[test]
#[should_panic(expected = "no frame index outside of a frame")]
fn frame_index_outside_frame_panics() {
    let (frames, _probe, _window) = setup(800, 600);
    let _ = frames.frame_index();
}
