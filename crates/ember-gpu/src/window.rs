//! Window queries needed by the frame lifecycle.

use ash::vk;

/// The three things the frame orchestrator needs from the window system.
pub trait PresentationWindow {
    /// Current drawable size in pixels. Zero in either dimension while minimized.
    fn drawable_extent(&self) -> vk::Extent2D;

    /// Whether the window was resized since the flag was last reset.
    fn was_resized(&self) -> bool;

    fn reset_resized(&self);

    /// Block until the window system has delivered new events.
    fn wait_events(&self);
}

/// Whether an extent has a zero dimension and cannot back a swapchain.
pub fn is_degenerate(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimension_is_degenerate() {
        assert!(is_degenerate(vk::Extent2D { width: 0, height: 0 }));
        assert!(is_degenerate(vk::Extent2D { width: 800, height: 0 }));
        assert!(is_degenerate(vk::Extent2D { width: 0, height: 600 }));
        assert!(!is_degenerate(vk::Extent2D { width: 1, height: 1 }));
    }
}
