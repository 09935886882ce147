use crate::{
    directory::Directory, header::FileHeader, BlockDevice, DIR_BASE_SECTOR, DIR_SECTORS,
    FILE_NAME_LEN, FREE_MAP_SECTOR, MAX_FILE_BYTES, NUM_SECTORS, SECTOR_SIZE,
};
use alloc::{string::String, sync::Arc, vec::Vec};
use bitflags::bitflags;
use idx_alloc::Bitmap;
use spin::Mutex;

bitflags! {
    /// Open file flags.
    pub struct OpenFlags: u32 {
        /// Read only.
        const RDONLY = 0;
        /// Write only.
        const WRONLY = 1 << 0;
        /// Read & write.
        const RDWR = 1 << 1;
        /// Create the file when it does not exist.
        const CREATE = 1 << 9;
        /// Drop the old content on open.
        const TRUNC = 1 << 10;
    }
}

impl OpenFlags {
    /// Do not check validity for simplicity.
    /// Return (readable, writable).
    pub fn read_write(&self) -> (bool, bool) {
        if self.is_empty() {
            (true, false)
        } else if self.contains(Self::WRONLY) {
            (false, true)
        } else {
            (true, true)
        }
    }
}

struct FsInner {
    free_map: Bitmap,
    dir: Directory,
}

/// The mounted file system.
///
/// All metadata (free map, directory, file headers) is flushed to its
/// reserved sectors on every mutation, so a device can be re-mounted later
/// and see the same files.
pub struct TinyFs {
    device: Arc<dyn BlockDevice>,
    inner: Mutex<FsInner>,
}

impl TinyFs {
    /// Lay down an empty file system on `device`.
    pub fn format(device: Arc<dyn BlockDevice>) -> Arc<Self> {
        let mut free_map = Bitmap::new(NUM_SECTORS);
        free_map.mark(FREE_MAP_SECTOR);
        for s in 0..DIR_SECTORS {
            free_map.mark(DIR_BASE_SECTOR + s);
        }
        let fs = Arc::new(Self {
            device,
            inner: Mutex::new(FsInner {
                free_map,
                dir: Directory::new(),
            }),
        });
        fs.flush(&mut fs.inner.lock());
        fs
    }

    /// Mount a device that already carries a file system.
    pub fn mount(device: Arc<dyn BlockDevice>) -> Arc<Self> {
        let mut buf = [0u8; SECTOR_SIZE];
        device.read_block(FREE_MAP_SECTOR, &mut buf);
        let free_map = Bitmap::from_bytes(NUM_SECTORS, &buf);
        let dir = Directory::fetch_from(device.as_ref());
        Arc::new(Self {
            device,
            inner: Mutex::new(FsInner { free_map, dir }),
        })
    }

    /// Create a file of `size` bytes; an existing file of the same name is
    /// replaced. Returns `false` when the name, the directory, or the free
    /// map cannot accommodate it.
    pub fn create(&self, name: &str, size: usize) -> bool {
        if name.len() > FILE_NAME_LEN || size > MAX_FILE_BYTES {
            return false;
        }
        let mut inner = self.inner.lock();
        let device = self.device.as_ref();
        let ok = {
            let FsInner { free_map, dir } = &mut *inner;
            if let Some(old) = dir.remove(name) {
                let mut hdr = FileHeader::fetch_from(device, old as usize);
                hdr.deallocate(free_map, device);
                free_map.clear(old as usize);
            }
            match free_map.find() {
                None => false,
                Some(sector) => {
                    let mut hdr = FileHeader::new();
                    if !hdr.allocate(free_map, device, size) {
                        free_map.clear(sector);
                        false
                    } else if !dir.add(name, sector as u32) {
                        hdr.deallocate(free_map, device);
                        free_map.clear(sector);
                        false
                    } else {
                        hdr.write_back(device, sector);
                        true
                    }
                }
            }
        };
        self.flush(&mut inner);
        log::debug!("create \"{name}\" ({size} bytes): {ok}");
        ok
    }

    /// Open `name`. `CREATE` makes a missing file, `TRUNC` empties an
    /// existing one.
    pub fn open(fs: &Arc<Self>, name: &str, flags: OpenFlags) -> Option<OpenFile> {
        let (readable, writable) = flags.read_write();
        let exists = fs.inner.lock().dir.find(name).is_some();
        if !exists {
            if !flags.contains(OpenFlags::CREATE) {
                return None;
            }
            if !fs.create(name, 0) {
                return None;
            }
        } else if flags.contains(OpenFlags::TRUNC) && !fs.create(name, 0) {
            return None;
        }
        let sector = fs.inner.lock().dir.find(name)? as usize;
        let hdr = FileHeader::fetch_from(fs.device.as_ref(), sector);
        Some(OpenFile {
            fs: fs.clone(),
            sector,
            readable,
            writable,
            hdr: Mutex::new(hdr),
        })
    }

    /// Delete `name` and return its sectors to the free map.
    pub fn remove(&self, name: &str) -> bool {
        let mut inner = self.inner.lock();
        let device = self.device.as_ref();
        let ok = {
            let FsInner { free_map, dir } = &mut *inner;
            match dir.remove(name) {
                None => false,
                Some(sector) => {
                    let mut hdr = FileHeader::fetch_from(device, sector as usize);
                    hdr.deallocate(free_map, device);
                    free_map.clear(sector as usize);
                    true
                }
            }
        };
        self.flush(&mut inner);
        log::debug!("remove \"{name}\": {ok}");
        ok
    }

    /// Names of every file on the disk.
    pub fn list(&self) -> Vec<String> {
        self.inner.lock().dir.names()
    }

    /// Unallocated sectors left on the disk.
    pub fn free_sectors(&self) -> usize {
        self.inner.lock().free_map.num_clear()
    }

    fn flush(&self, inner: &mut FsInner) {
        let device = self.device.as_ref();
        let mut buf = [0u8; SECTOR_SIZE];
        inner.free_map.write_to(&mut buf);
        device.write_block(FREE_MAP_SECTOR, &buf);
        inner.dir.write_back(device);
    }
}

/// An open file: positionless `read_at`/`write_at` against a cached header.
///
/// Writes past the end grow the file; header changes go straight back to
/// disk. One live handle per file at a time — handles do not see each
/// other's growth.
pub struct OpenFile {
    fs: Arc<TinyFs>,
    sector: usize,
    readable: bool,
    writable: bool,
    hdr: Mutex<FileHeader>,
}

impl OpenFile {
    /// Current length in bytes.
    pub fn length(&self) -> usize {
        self.hdr.lock().num_bytes()
    }

    /// Read up to `buf.len()` bytes starting at `offset`; returns how many
    /// were actually read (short at end of file, 0 past it).
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        if !self.readable || buf.is_empty() {
            return 0;
        }
        let hdr = self.hdr.lock();
        let len = hdr.num_bytes();
        if offset >= len {
            return 0;
        }
        let n = buf.len().min(len - offset);
        let device = self.fs.device.as_ref();
        let mut tmp = [0u8; SECTOR_SIZE];
        let mut done = 0;
        let mut pos = offset;
        while done < n {
            let off = pos % SECTOR_SIZE;
            let take = (SECTOR_SIZE - off).min(n - done);
            device.read_block(hdr.sector_of(device, pos / SECTOR_SIZE), &mut tmp);
            buf[done..done + take].copy_from_slice(&tmp[off..off + take]);
            done += take;
            pos += take;
        }
        n
    }

    /// Write `buf` at `offset`, growing the file if needed; returns
    /// `buf.len()` on success and 0 when the file cannot grow far enough.
    pub fn write_at(&self, buf: &[u8], offset: usize) -> usize {
        if !self.writable || buf.is_empty() {
            return 0;
        }
        let mut hdr = self.hdr.lock();
        let device = self.fs.device.as_ref();
        let end = offset + buf.len();
        if end > hdr.num_bytes() {
            let mut inner = self.fs.inner.lock();
            if !hdr.change_size(&mut inner.free_map, device, end) {
                return 0;
            }
            hdr.write_back(device, self.sector);
            self.fs.flush(&mut inner);
        }
        let mut tmp = [0u8; SECTOR_SIZE];
        let mut done = 0;
        let mut pos = offset;
        while done < buf.len() {
            let off = pos % SECTOR_SIZE;
            let take = (SECTOR_SIZE - off).min(buf.len() - done);
            let sector = hdr.sector_of(device, pos / SECTOR_SIZE);
            if take == SECTOR_SIZE {
                device.write_block(sector, &buf[done..done + take]);
            } else {
                device.read_block(sector, &mut tmp);
                tmp[off..off + take].copy_from_slice(&buf[done..done + take]);
                device.write_block(sector, &tmp);
            }
            done += take;
            pos += take;
        }
        buf.len()
    }
}
