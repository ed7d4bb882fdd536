use std::collections::VecDeque;

use crate::types::FrameSize;

/// Off-screen image the capture source renders into before readback.
#[derive(Debug)]
pub struct OffscreenTarget {
    size: FrameSize,
    pixels: Vec<u8>,
}

impl OffscreenTarget {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            pixels: vec![0; size.byte_len()],
        }
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }
}

/// Recycles fixed-size off-screen targets so capture does not allocate per frame.
pub struct BufferPool {
    size: FrameSize,
    unused: VecDeque<OffscreenTarget>,
    allocated: usize,
}

impl BufferPool {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            unused: VecDeque::new(),
            allocated: 0,
        }
    }

    /// Take an unused target, or allocate one if the pool is empty.
    pub fn acquire(&mut self) -> OffscreenTarget {
        if let Some(target) = self.unused.pop_front() {
            return target;
        }
        self.allocated += 1;
        OffscreenTarget::new(self.size)
    }

    /// Return a target for reuse. Targets of a different size are dropped.
    pub fn recycle(&mut self, target: OffscreenTarget) {
        if target.size != self.size {
            self.allocated = self.allocated.saturating_sub(1);
            return;
        }
        self.unused.push_back(target);
    }

    /// Drop every unused target.
    pub fn release(&mut self) {
        self.allocated = self.allocated.saturating_sub(self.unused.len());
        self.unused.clear();
    }

    pub fn unused(&self) -> usize {
        self.unused.len()
    }

    /// Targets allocated by this pool and not yet released.
    pub fn allocated(&self) -> usize {
        self.allocated
    }
}
