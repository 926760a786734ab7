//! Surface generation builds against the recording device.

use ash::vk::{self, Handle};
use ember_gpu::{GpuError, SurfaceGeneration};
use ember_test::{DeviceCall, DeviceProbe, FailPoint, RecordingDevice};

const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};

fn build(
    device: &RecordingDevice,
    previous: Option<&SurfaceGeneration>,
    id: u64,
) -> ember_gpu::Result<SurfaceGeneration> {
    SurfaceGeneration::build(device, EXTENT, previous, true, id)
}

fn framebuffer_count(probe: &DeviceProbe) -> usize {
    probe.count(|c| matches!(c, DeviceCall::CreateFramebuffer { .. }))
}

#[test]
fn image_count_within_surface_bounds() {
    let (device, probe) = RecordingDevice::new();
    probe.set_image_count_bounds(2, 3);

    let generation = build(&device, None, 0).unwrap();

    assert!((2..=3).contains(&generation.image_count()));
    assert_eq!(generation.extent(), EXTENT);
    assert_eq!(framebuffer_count(&probe), generation.image_count());

    generation.destroy(&device);
    assert_eq!(probe.live_objects(), 0);
    assert!(probe.unknown_releases().is_empty());
}

#[test]
fn unbounded_max_image_count() {
    let (device, probe) = RecordingDevice::new();
    probe.set_image_count_bounds(2, 0);

    let generation = build(&device, None, 0).unwrap();
    assert_eq!(generation.image_count(), 3);
    generation.destroy(&device);
}

#[test]
fn rebuild_with_same_inputs_is_stable() {
    let (device, probe) = RecordingDevice::new();

    let first = build(&device, None, 0).unwrap();
    let second = build(&device, Some(&first), 1).unwrap();
    first.destroy(&device);

    let third = build(&device, Some(&second), 2).unwrap();

    assert_eq!(second.image_count(), third.image_count());
    assert_eq!(second.extent(), third.extent());
    assert!(second.compare_formats(&third));
    second.destroy(&device);

    assert_eq!(probe.swapchain_extents(), vec![EXTENT; 3]);
    third.destroy(&device);
    assert_eq!(probe.live_objects(), 0);
}

#[test]
fn every_framebuffer_shares_one_depth_view() {
    let (device, probe) = RecordingDevice::new();
    let generation = build(&device, None, 0).unwrap();

    let depth_view = probe
        .calls()
        .iter()
        .find_map(|call| match call {
            DeviceCall::CreateDepthAttachment { view, .. } => Some(*view),
            _ => None,
        })
        .unwrap();
    let attachments: Vec<_> = probe
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DeviceCall::CreateFramebuffer {
                attachments,
                extent,
                ..
            } => {
                assert_eq!(extent, EXTENT);
                Some(attachments)
            }
            _ => None,
        })
        .collect();

    assert_eq!(attachments.len(), generation.image_count());
    for pair in &attachments {
        assert_eq!(pair.len(), 2);
        assert_eq!(pair[1], depth_view);
    }
    // Each framebuffer presents a different swapchain image
    assert_ne!(attachments[0][0], attachments[1][0]);

    generation.destroy(&device);
}

#[test]
fn previous_swapchain_is_handed_over() {
    let (device, probe) = RecordingDevice::new();

    let first = build(&device, None, 0).unwrap();
    let second = build(&device, Some(&first), 1).unwrap();

    let olds: Vec<_> = probe
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DeviceCall::CreateSwapchain { old_swapchain, .. } => Some(old_swapchain),
            _ => None,
        })
        .collect();
    assert_eq!(olds, vec![vk::SwapchainKHR::null(), first.swapchain()]);

    first.destroy(&device);
    second.destroy(&device);
}

#[test]
fn surface_current_extent_wins_over_window() {
    let (device, probe) = RecordingDevice::new();
    let fixed = vk::Extent2D {
        width: 1024,
        height: 768,
    };
    probe.set_current_extent(Some(fixed));

    let generation = build(&device, None, 0).unwrap();
    assert_eq!(generation.extent(), fixed);
    generation.destroy(&device);
}

#[test]
fn degenerate_extent_never_creates_a_swapchain() {
    let (device, probe) = RecordingDevice::new();
    probe.set_current_extent(Some(vk::Extent2D {
        width: 0,
        height: 0,
    }));

    let result = build(&device, None, 0);

    assert!(matches!(
        result,
        Err(GpuError::DegenerateExtent {
            width: 0,
            height: 0
        })
    ));
    assert_eq!(
        probe.count(|c| matches!(c, DeviceCall::CreateSwapchain { .. })),
        0
    );
    assert_eq!(probe.live_objects(), 0);
}

#[test]
fn format_change_is_detected() {
    let (device, probe) = RecordingDevice::new();
    let first = build(&device, None, 0).unwrap();

    probe.set_formats(vec![vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }]);
    let second = build(&device, Some(&first), 1).unwrap();

    assert_eq!(second.color_format(), vk::Format::R8G8B8A8_UNORM);
    assert!(!second.compare_formats(&first));

    first.destroy(&device);
    second.destroy(&device);
}

#[test]
fn vsync_selects_fifo_and_mailbox_otherwise() {
    let (device, _probe) = RecordingDevice::new();

    let vsync = SurfaceGeneration::build(&device, EXTENT, None, true, 0).unwrap();
    let immediate = SurfaceGeneration::build(&device, EXTENT, Some(&vsync), false, 1).unwrap();

    assert_eq!(vsync.present_mode(), vk::PresentModeKHR::FIFO);
    assert_eq!(immediate.present_mode(), vk::PresentModeKHR::MAILBOX);

    vsync.destroy(&device);
    immediate.destroy(&device);
}

#[test]
fn failed_build_releases_partial_objects() {
    for point in [
        FailPoint::CreateSwapchain,
        FailPoint::CreateDepthAttachment,
        FailPoint::CreateRenderPass,
        FailPoint::CreateFramebuffer,
    ] {
        let (device, probe) = RecordingDevice::new();
        probe.fail_next(point);

        assert!(build(&device, None, 0).is_err(), "{point:?} should fail");
        assert_eq!(probe.live_objects(), 0, "{point:?} leaked objects");
        assert!(probe.unknown_releases().is_empty(), "{point:?}");
    }
}

#[test]
fn swapchain_failure_is_reported_as_creation_error() {
    let (device, probe) = RecordingDevice::new();
    probe.fail_next(FailPoint::CreateSwapchain);

    assert!(matches!(
        build(&device, None, 0),
        Err(GpuError::SwapchainCreation(_))
    ));
}

#[test]
fn destroy_releases_dependents_before_the_swapchain() {
    let (device, probe) = RecordingDevice::new();
    let generation = build(&device, None, 0).unwrap();
    let swapchain = generation.swapchain();
    probe.clear_calls();

    generation.destroy(&device);

    let last_framebuffer = probe
        .last_position("framebuffer destroy", |c| {
            matches!(c, DeviceCall::DestroyFramebuffer(_))
        })
        .unwrap();
    let render_pass = probe
        .position("render pass destroy", |c| {
            matches!(c, DeviceCall::DestroyRenderPass(_))
        })
        .unwrap();
    let depth = probe
        .position("depth destroy", |c| {
            matches!(c, DeviceCall::DestroyDepthAttachment { .. })
        })
        .unwrap();
    let destroyed = probe
        .position("swapchain destroy", |c| {
            matches!(c, DeviceCall::DestroySwapchain(s) if s.as_raw() == swapchain.as_raw())
        })
        .unwrap();

    assert!(last_framebuffer < render_pass);
    assert!(render_pass < depth);
    assert!(depth < destroyed);
    assert_eq!(destroyed, probe.calls().len() - 1);
}
