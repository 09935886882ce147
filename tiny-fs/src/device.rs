use crate::{NUM_SECTORS, SECTOR_SIZE};
use alloc::{sync::Arc, vec};
use core::sync::atomic::{AtomicUsize, Ordering::Relaxed};
use spin::Mutex;

/// Abstraction of the synchronous disk the file system sits on.
///
/// A call returns once the whole sector has moved; there is no completion
/// callback to wait for.
pub trait BlockDevice: Send + Sync {
    /// Read sector `block_id` into `buf` (`buf.len() == SECTOR_SIZE`).
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    /// Write `buf` to sector `block_id`.
    fn write_block(&self, block_id: usize, buf: &[u8]);
}

/// RAM-backed disk. Used by the hosted kernel and by every test.
///
/// Keeps per-direction access counters so callers can observe disk traffic.
pub struct MemDisk {
    data: Mutex<alloc::vec::Vec<u8>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemDisk {
    /// A zero-filled disk of [`NUM_SECTORS`] sectors.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(vec![0; NUM_SECTORS * SECTOR_SIZE]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        })
    }

    /// Sectors read so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Relaxed)
    }

    /// Sectors written so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Relaxed)
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        assert!(block_id < NUM_SECTORS);
        assert_eq!(buf.len(), SECTOR_SIZE);
        let data = self.data.lock();
        buf.copy_from_slice(&data[block_id * SECTOR_SIZE..(block_id + 1) * SECTOR_SIZE]);
        self.reads.fetch_add(1, Relaxed);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        assert!(block_id < NUM_SECTORS);
        assert_eq!(buf.len(), SECTOR_SIZE);
        let mut data = self.data.lock();
        data[block_id * SECTOR_SIZE..(block_id + 1) * SECTOR_SIZE].copy_from_slice(buf);
        self.writes.fetch_add(1, Relaxed);
    }
}
