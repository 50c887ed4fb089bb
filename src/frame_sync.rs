// Per-frame command recording and synchronisation objects, one slot per frame in flight.

use std::rc::Rc;

use anyhow::{Context, Result};
use gfx_hal as hal;

use hal::{command, pool, prelude::*};

pub struct FrameSync<B: hal::Backend> {
    device: Rc<B::Device>,
    pub cmd_pools: Vec<B::CommandPool>,
    pub cmd_buffers: Vec<B::CommandBuffer>,
    pub submission_complete_semaphores: Vec<B::Semaphore>,
    pub submission_complete_fences: Vec<B::Fence>,
}

impl<B: hal::Backend> FrameSync<B> {
    /// One pool per slot, each holding a single primary command buffer that is reset
    /// wholesale once the slot's fence signals. Fences start signalled.
    pub fn new(
        device: Rc<B::Device>,
        family: hal::queue::QueueFamilyId,
        frames_in_flight: usize,
    ) -> Result<Self> {
        let mut sync = Self {
            device,
            cmd_pools: Vec::with_capacity(frames_in_flight),
            cmd_buffers: Vec::with_capacity(frames_in_flight),
            submission_complete_semaphores: Vec::with_capacity(frames_in_flight),
            submission_complete_fences: Vec::with_capacity(frames_in_flight),
        };

        // Anything pushed before a failure is released by `Drop`.
        for _ in 0..frames_in_flight {
            let mut pool = unsafe {
                sync.device
                    .create_command_pool(family, pool::CommandPoolCreateFlags::empty())
            }
            .context("Can't create command pool")?;
            let cmd_buffer = unsafe { pool.allocate_one(command::Level::Primary) };
            sync.cmd_pools.push(pool);
            sync.cmd_buffers.push(cmd_buffer);

            let semaphore = sync.device.create_semaphore().context("Could not create semaphore")?;
            sync.submission_complete_semaphores.push(semaphore);

            let fence = sync.device.create_fence(true).context("Could not create fence")?;
            sync.submission_complete_fences.push(fence);
        }

        Ok(sync)
    }

    pub fn len(&self) -> usize {
        self.cmd_pools.len()
    }
}

impl<B: hal::Backend> Drop for FrameSync<B> {
    fn drop(&mut self) {
        unsafe {
            // Buffers go back to their pools by destroying the pools.
            self.cmd_buffers.clear();

            for p in self.cmd_pools.drain(..) {
                self.device.destroy_command_pool(p);
            }

            for s in self.submission_complete_semaphores.drain(..) {
                self.device.destroy_semaphore(s);
            }

            for f in self.submission_complete_fences.drain(..) {
                self.device.destroy_fence(f);
            }
        }
    }
}
