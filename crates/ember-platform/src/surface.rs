//! [`PresentationWindow`] for winit windows.

use ash::vk;
use ember_gpu::PresentationWindow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use winit::window::Window;

/// How long [`WinitSurface::wait_events`] sleeps between size checks.
const MINIMIZED_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// A winit window plus the resize flag the event loop sets.
pub struct WinitSurface {
    window: Arc<Window>,
    resized: AtomicBool,
}

impl WinitSurface {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            resized: AtomicBool::new(false),
        }
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Called by the event loop on `WindowEvent::Resized`.
    pub fn mark_resized(&self) {
        self.resized.store(true, Ordering::Relaxed);
    }
}

impl PresentationWindow for WinitSurface {
    fn drawable_extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    fn was_resized(&self) -> bool {
        self.resized.load(Ordering::Relaxed)
    }

    fn reset_resized(&self) {
        self.resized.store(false, Ordering::Relaxed);
    }

    /// winit only delivers events to the running application handler, so
    /// this sleeps briefly and lets the caller re-query the live window size.
    fn wait_events(&self) {
        std::thread::sleep(MINIMIZED_POLL_INTERVAL);
    }
}
