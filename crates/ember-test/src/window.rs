//! A [`PresentationWindow`] whose size and events are driven by the test.

use std::collections::VecDeque;
use std::sync::Arc;

use ash::vk;
use ember_gpu::PresentationWindow;
use parking_lot::Mutex;

type WaitHook = Box<dyn FnMut() + Send>;

struct WindowState {
    extent: vk::Extent2D,
    resized: bool,
    pending: VecDeque<vk::Extent2D>,
    wait_count: usize,
    on_wait: Option<WaitHook>,
}

/// Shared handle to a fake window. Clones observe the same state, so a test
/// keeps one clone while the orchestrator owns another.
#[derive(Clone)]
pub struct ScriptedWindow {
    state: Arc<Mutex<WindowState>>,
}

impl ScriptedWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(WindowState {
                extent: vk::Extent2D { width, height },
                resized: false,
                pending: VecDeque::new(),
                wait_count: 0,
                on_wait: None,
            })),
        }
    }

    /// Change the drawable size without raising the resize flag.
    pub fn set_extent(&self, width: u32, height: u32) {
        self.state.lock().extent = vk::Extent2D { width, height };
    }

    /// Change the drawable size and raise the resize flag.
    pub fn resize(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.extent = vk::Extent2D { width, height };
        state.resized = true;
    }

    /// Sizes applied one per `wait_events` call, in order.
    pub fn queue_extents(&self, extents: impl IntoIterator<Item = (u32, u32)>) {
        self.state.lock().pending.extend(
            extents
                .into_iter()
                .map(|(width, height)| vk::Extent2D { width, height }),
        );
    }

    /// Run `hook` on every `wait_events` call, after any queued size is applied.
    pub fn on_wait(&self, hook: impl FnMut() + Send + 'static) {
        self.state.lock().on_wait = Some(Box::new(hook));
    }

    /// How many times the window was asked to wait for events.
    pub fn wait_count(&self) -> usize {
        self.state.lock().wait_count
    }
}

impl PresentationWindow for ScriptedWindow {
    fn drawable_extent(&self) -> vk::Extent2D {
        self.state.lock().extent
    }

    fn was_resized(&self) -> bool {
        self.state.lock().resized
    }

    fn reset_resized(&self) {
        self.state.lock().resized = false;
    }

    fn wait_events(&self) {
        let hook = {
            let mut state = self.state.lock();
            state.wait_count += 1;
            if let Some(extent) = state.pending.pop_front() {
                state.extent = extent;
            }
            state.on_wait.take()
        };

        // Run unlocked so the hook may resize this window
        if let Some(mut hook) = hook {
            hook();
            let mut state = self.state.lock();
            if state.on_wait.is_none() {
                state.on_wait = Some(hook);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_extents_apply_per_wait() {
        let window = ScriptedWindow::new(0, 0);
        window.queue_extents([(0, 0), (640, 480)]);

        window.wait_events();
        assert_eq!(window.drawable_extent().width, 0);
        window.wait_events();
        assert_eq!(
            window.drawable_extent(),
            vk::Extent2D {
                width: 640,
                height: 480
            }
        );
        assert_eq!(window.wait_count(), 2);
    }

    #[test]
    fn resize_raises_flag_until_reset() {
        let window = ScriptedWindow::new(800, 600);
        assert!(!window.was_resized());
        window.resize(1024, 768);
        assert!(window.was_resized());
        window.reset_resized();
        assert!(!window.was_resized());
        assert_eq!(window.drawable_extent().width, 1024);
    }

    #[test]
    fn wait_hook_may_resize_the_window() {
        let window = ScriptedWindow::new(0, 0);
        let handle = window.clone();
        window.on_wait(move || handle.set_extent(320, 200));

        window.wait_events();
        assert_eq!(window.drawable_extent().height, 200);
    }
}
