//! Block ring buffer
//!
//! Hands raw samples from the device thread to the demod thread in whole
//! blocks. The data array is a fixed power-of-two ring of blocks; the only
//! shared mutable state is the count of full blocks, guarded by a mutex and
//! condition variable pair. The producer blocks when the ring is entirely
//! full, the consumer when it is empty; `shutdown()` wakes both, after
//! which the consumer drains every remaining full block and reports EOF.
//!
//! Block ownership never overlaps: the producer only touches blocks not
//! counted as full, the consumer only blocks that are, and the mutex
//! hand-off orders the memory either side wrote. The unsafe cell below
//! leans on exactly that discipline.

use std::cell::UnsafeCell;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct RingState {
    num_full: usize,
    shutdown: bool,
}

pub struct BlockRing<T> {
    data: UnsafeCell<Box<[T]>>,
    block_size: usize,
    num_blocks: usize,
    state: Mutex<RingState>,
    cond: Condvar,
}

// SAFETY: the producer writes only blocks the full-count does not cover,
// the consumer reads only blocks it does, and every transfer of a block
// between the two goes through the mutex. See module docs.
unsafe impl<T: Send> Sync for BlockRing<T> {}

impl<T: Copy + Default> BlockRing<T> {
    fn new(block_size: usize, num_blocks: usize) -> Self {
        debug_assert!(num_blocks.is_power_of_two());
        Self {
            data: UnsafeCell::new(vec![T::default(); block_size * num_blocks].into_boxed_slice()),
            block_size,
            num_blocks,
            state: Mutex::new(RingState {
                num_full: 0,
                shutdown: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn size(&self) -> usize {
        self.block_size * self.num_blocks
    }

    /// Write `src` starting at element `start`, wrapping explicitly.
    ///
    /// SAFETY: caller must own the written region per the block discipline.
    unsafe fn write_raw(&self, start: usize, src: &[T]) {
        let data = &mut *self.data.get();
        let first = src.len().min(data.len() - start);
        data[start..start + first].copy_from_slice(&src[..first]);
        if src.len() > first {
            data[..src.len() - first].copy_from_slice(&src[first..]);
        }
    }

    /// SAFETY: caller must hold the consumer role and `block` must be full.
    unsafe fn block_slice(&self, block: usize) -> &[T] {
        let data = &*self.data.get();
        &data[block * self.block_size..(block + 1) * self.block_size]
    }

    /// Producer: `n` more blocks are full. Returns the new full count.
    fn commit_blocks(&self, n: usize) -> usize {
        let count = {
            let mut state = self.state.lock();
            state.num_full += n;
            debug_assert!(state.num_full <= self.num_blocks);
            state.num_full
        };
        self.cond.notify_one();
        count
    }

    /// Consumer: `n` blocks were read and are free again.
    fn consume_blocks(&self, n: usize) -> usize {
        let count = {
            let mut state = self.state.lock();
            state.num_full -= n;
            state.num_full
        };
        self.cond.notify_one();
        count
    }

    /// No more data will be written; wake everyone.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.cond.notify_all();
    }

    /// Consumer: block until data is available. Returns the number of full
    /// blocks, or zero once the ring is shut down and drained.
    fn wait_for_new_blocks(&self) -> usize {
        let mut state = self.state.lock();
        self.cond
            .wait_while(&mut state, |s| !s.shutdown && s.num_full == 0);
        state.num_full
    }

    /// Producer: block until at least one block is free. `None` on
    /// shutdown.
    fn wait_for_space(&self) -> Option<usize> {
        let mut state = self.state.lock();
        self.cond
            .wait_while(&mut state, |s| !s.shutdown && s.num_full == self.num_blocks);
        if state.shutdown {
            None
        } else {
            Some(state.num_full)
        }
    }

    fn is_shut_down(&self) -> bool {
        self.state.lock().shutdown
    }
}

/// Create a ring with its producer and consumer handles.
pub fn channel<T: Copy + Default + Send>(
    block_size: usize,
    num_blocks: usize,
) -> (RingWriter<T>, RingReader<T>) {
    let ring = Arc::new(BlockRing::new(block_size, num_blocks));
    (
        RingWriter {
            ring: Arc::clone(&ring),
            write_pos: 0,
            num_full: 0,
        },
        RingReader {
            ring,
            read_block: 0,
            num_full: 0,
        },
    )
}

/// Single-producer handle. Tracks its own write position and a local copy
/// of the full count, syncing with the shared count only when blocks
/// complete or space runs out.
pub struct RingWriter<T> {
    ring: Arc<BlockRing<T>>,
    write_pos: usize,
    num_full: usize,
}

impl<T: Copy + Default + Send> RingWriter<T> {
    /// Write contiguous samples, blocking while the ring is entirely full.
    /// Returns how many elements were accepted; short only on shutdown.
    pub fn write(&mut self, src: &[T]) -> usize {
        let total = src.len();
        let mut src = src;
        let bs = self.ring.block_size;

        while !src.is_empty() {
            let used = self.num_full * bs + (self.write_pos % bs);
            let free = self.ring.size() - used;

            if free == 0 {
                match self.ring.wait_for_space() {
                    Some(num_full) => {
                        self.num_full = num_full;
                        continue;
                    }
                    None => return total - src.len(),
                }
            }

            let n = src.len().min(free);
            let offset_in_block = self.write_pos % bs;
            let completed = (offset_in_block + n) / bs;

            // SAFETY: the region [write_pos, write_pos + n) lies entirely in
            // blocks the consumer does not hold: used/free above counts
            // every element the consumer may still read.
            unsafe {
                self.ring.write_raw(self.write_pos, &src[..n]);
            }
            self.write_pos = (self.write_pos + n) % self.ring.size();

            if completed > 0 {
                self.num_full = self.ring.commit_blocks(completed);
            }
            src = &src[n..];
        }
        total
    }

    /// Pad the current partial block so the consumer sees its data.
    pub fn finish_last_block(&mut self, padding: T) -> usize {
        let partial = self.write_pos % self.ring.block_size;
        if partial == 0 {
            return 0;
        }
        let pad = vec![padding; self.ring.block_size - partial];
        self.write(&pad)
    }

    pub fn shutdown(&self) {
        self.ring.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.ring.is_shut_down()
    }
}

/// Single-consumer handle.
pub struct RingReader<T> {
    ring: Arc<BlockRing<T>>,
    read_block: usize,
    num_full: usize,
}

impl<T: Copy + Default + Send> RingReader<T> {
    /// True once the ring is shut down and fully drained. Blocks while the
    /// ring is empty but alive.
    pub fn eof(&mut self) -> bool {
        if self.num_full > 0 {
            return false;
        }
        self.num_full = self.ring.wait_for_new_blocks();
        self.num_full == 0
    }

    /// Stop the ring from the consumer side, releasing a blocked producer.
    pub fn shutdown(&self) {
        self.ring.shutdown();
    }

    /// Hand the next full block to `f`, then release it.
    pub fn process<F: FnOnce(&[T])>(&mut self, f: F) {
        if self.num_full == 0 {
            return;
        }
        // SAFETY: read_block is full (num_full > 0 covers it) and the
        // producer never writes full blocks.
        let block = unsafe { self.ring.block_slice(self.read_block) };
        f(block);
        self.read_block = (self.read_block + 1) % self.ring.num_blocks;
        self.num_full = self.ring.consume_blocks(1);
    }
}
