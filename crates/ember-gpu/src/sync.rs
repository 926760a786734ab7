//! Synchronization primitives.

use crate::device::PresentDevice;
use crate::error::Result;
use ash::vk;
use ember_core::MAX_FRAMES_IN_FLIGHT;

/// Synchronization resources of one in-flight slot.
#[derive(Debug, Clone, Copy)]
pub struct FrameSync {
    /// Semaphore signaled when image is available
    pub image_available: vk::Semaphore,
    /// Semaphore signaled when rendering is complete
    pub render_finished: vk::Semaphore,
    /// Fence to wait for frame completion. Created signaled so the first wait returns.
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// Create frame synchronization resources.
    pub fn new<D: PresentDevice>(device: &D) -> Result<Self> {
        let image_available = device.create_semaphore()?;
        let render_finished = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        let in_flight = match device.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                device.destroy_semaphore(render_finished);
                device.destroy_semaphore(image_available);
                return Err(e);
            }
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Wait for this slot's previous submission to complete.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait<D: PresentDevice>(&self, device: &D) -> Result<()> {
        device.wait_for_fence(self.in_flight)
    }

    /// Reset the fence for the next submission.
    pub fn reset<D: PresentDevice>(&self, device: &D) -> Result<()> {
        device.reset_fence(self.in_flight)
    }

    /// Destroy synchronization resources.
    ///
    /// The resources must not be in use by the GPU.
    pub fn destroy<D: PresentDevice>(&self, device: &D) {
        device.destroy_semaphore(self.image_available);
        device.destroy_semaphore(self.render_finished);
        device.destroy_fence(self.in_flight);
    }
}

/// One [`FrameSync`] per in-flight slot, created once and destroyed at shutdown.
pub struct SyncSet {
    frames: Vec<FrameSync>,
}

impl SyncSet {
    /// Create `MAX_FRAMES_IN_FLIGHT` synchronization sets.
    pub fn new<D: PresentDevice>(device: &D) -> Result<Self> {
        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            match FrameSync::new(device) {
                Ok(sync) => frames.push(sync),
                Err(e) => {
                    for sync in &frames {
                        sync.destroy(device);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self { frames })
    }

    /// Synchronization resources of `slot`.
    pub fn get(&self, slot: usize) -> &FrameSync {
        &self.frames[slot]
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Destroy all resources.
    ///
    /// No slot may have a submission in flight.
    pub fn destroy<D: PresentDevice>(&self, device: &D) {
        for sync in &self.frames {
            sync.destroy(device);
        }
    }
}

/// Which slot fence (if any) last rendered into each swapchain image.
///
/// Consulted before a frame writes to an acquired image so that two in-flight
/// frames never target the same image.
#[derive(Debug, Default)]
pub struct ImageFenceTable {
    owners: Vec<Option<vk::Fence>>,
}

impl ImageFenceTable {
    /// Create an empty table for `image_count` images.
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Fence currently recorded for `image_index`.
    pub fn owner(&self, image_index: u32) -> Option<vk::Fence> {
        self.owners.get(image_index as usize).copied().flatten()
    }

    /// Record `fence` as the owner of `image_index`.
    pub fn assign(&mut self, image_index: u32, fence: vk::Fence) {
        self.owners[image_index as usize] = Some(fence);
    }

    /// Forget all owners, resizing only if the image count changed.
    pub fn reconcile(&mut self, image_count: usize) {
        if self.owners.len() == image_count {
            self.owners.fill(None);
        } else {
            self.owners = vec![None; image_count];
        }
    }

    /// Number of images tracked.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    #[test]
    fn new_table_has_no_owners() {
        let table = ImageFenceTable::new(3);
        assert_eq!(table.len(), 3);
        assert!((0..3).all(|i| table.owner(i).is_none()));
    }

    #[test]
    fn assign_replaces_owner() {
        let mut table = ImageFenceTable::new(3);
        table.assign(1, fence(10));
        assert_eq!(table.owner(1), Some(fence(10)));
        table.assign(1, fence(11));
        assert_eq!(table.owner(1), Some(fence(11)));
        assert_eq!(table.owner(0), None);
    }

    #[test]
    fn out_of_range_index_has_no_owner() {
        let table = ImageFenceTable::new(2);
        assert_eq!(table.owner(5), None);
    }

    #[test]
    fn reconcile_same_count_clears() {
        let mut table = ImageFenceTable::new(3);
        table.assign(0, fence(1));
        table.assign(2, fence(2));
        table.reconcile(3);
        assert_eq!(table.len(), 3);
        assert!((0..3).all(|i| table.owner(i).is_none()));
    }

    #[test]
    fn reconcile_new_count_resizes() {
        let mut table = ImageFenceTable::new(2);
        table.assign(1, fence(1));
        table.reconcile(4);
        assert_eq!(table.len(), 4);
        assert!((0..4).all(|i| table.owner(i).is_none()));
    }
}
