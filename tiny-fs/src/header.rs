use crate::{
    div_round_up, BlockDevice, MAX_FILE_BYTES, MAX_FILE_SECTORS, NUM_DIRECT, SECTORS_PER_INDIRECT,
    SECTOR_SIZE,
};
use idx_alloc::Bitmap;

/// Marks an unused indirect slot.
const NULL_SECTOR: u32 = u32::MAX;

/// Per-file header, the moral equivalent of an inode.
///
/// Fits exactly one sector: the byte count, [`NUM_DIRECT`] direct sector
/// indices and one indirect index sector that holds up to
/// [`SECTORS_PER_INDIRECT`] more. No permissions, no timestamps.
pub(crate) struct FileHeader {
    num_bytes: u32,
    direct: [u32; NUM_DIRECT],
    indirect: u32,
}

impl FileHeader {
    pub(crate) fn new() -> Self {
        Self {
            num_bytes: 0,
            direct: [0; NUM_DIRECT],
            indirect: NULL_SECTOR,
        }
    }

    #[inline]
    pub(crate) fn num_bytes(&self) -> usize {
        self.num_bytes as usize
    }

    #[inline]
    pub(crate) fn num_sectors(&self) -> usize {
        div_round_up(self.num_bytes as usize, SECTOR_SIZE)
    }

    /// Grab data sectors for a fresh file of `size` bytes.
    ///
    /// Returns `false` without touching the free map when the file would be
    /// too large or the disk lacks room; the caller decides what that means.
    pub(crate) fn allocate(
        &mut self,
        free_map: &mut Bitmap,
        device: &dyn BlockDevice,
        size: usize,
    ) -> bool {
        let sectors = div_round_up(size, SECTOR_SIZE);
        if sectors > MAX_FILE_SECTORS {
            return false;
        }
        let extra = (sectors > NUM_DIRECT) as usize;
        if free_map.num_clear() < sectors + extra {
            return false;
        }
        self.num_bytes = size as u32;
        if sectors <= NUM_DIRECT {
            for slot in self.direct.iter_mut().take(sectors) {
                *slot = grab(free_map);
            }
            self.indirect = NULL_SECTOR;
        } else {
            for slot in self.direct.iter_mut() {
                *slot = grab(free_map);
            }
            self.indirect = grab(free_map);
            let mut table = [0u32; SECTORS_PER_INDIRECT];
            for slot in table.iter_mut().take(sectors - NUM_DIRECT) {
                *slot = grab(free_map);
            }
            write_table(device, self.indirect, &table);
        }
        true
    }

    /// Return every data sector (and the indirect sector) to the free map.
    pub(crate) fn deallocate(&mut self, free_map: &mut Bitmap, device: &dyn BlockDevice) {
        let sectors = self.num_sectors();
        for slot in self.direct.iter().take(sectors.min(NUM_DIRECT)) {
            free_map.clear(*slot as usize);
        }
        if sectors > NUM_DIRECT {
            let mut table = [0u32; SECTORS_PER_INDIRECT];
            read_table(device, self.indirect, &mut table);
            for slot in table.iter().take(sectors - NUM_DIRECT) {
                free_map.clear(*slot as usize);
            }
            free_map.clear(self.indirect as usize);
        }
        self.num_bytes = 0;
        self.indirect = NULL_SECTOR;
    }

    /// Grow the file to `new_size` bytes, allocating sectors as needed.
    ///
    /// Shrinking is a no-op that reports success. Returns `false` when the
    /// two-level index or the free map cannot cover the growth.
    pub(crate) fn change_size(
        &mut self,
        free_map: &mut Bitmap,
        device: &dyn BlockDevice,
        new_size: usize,
    ) -> bool {
        if new_size <= self.num_bytes as usize {
            return true;
        }
        if new_size > MAX_FILE_BYTES {
            return false;
        }
        let have = self.num_sectors();
        let want = div_round_up(new_size, SECTOR_SIZE);
        if want == have {
            self.num_bytes = new_size as u32;
            return true;
        }
        let needs_indirect = want > NUM_DIRECT && have <= NUM_DIRECT;
        if free_map.num_clear() < want - have + needs_indirect as usize {
            return false;
        }
        if want <= NUM_DIRECT {
            for slot in self.direct.iter_mut().take(want).skip(have) {
                *slot = grab(free_map);
            }
        } else {
            let mut table = [0u32; SECTORS_PER_INDIRECT];
            if needs_indirect {
                for slot in self.direct.iter_mut().skip(have) {
                    *slot = grab(free_map);
                }
                self.indirect = grab(free_map);
            } else {
                read_table(device, self.indirect, &mut table);
            }
            for i in have.max(NUM_DIRECT)..want {
                table[i - NUM_DIRECT] = grab(free_map);
            }
            write_table(device, self.indirect, &table);
        }
        self.num_bytes = new_size as u32;
        true
    }

    /// Disk sector backing file-relative sector `file_sector`.
    pub(crate) fn sector_of(&self, device: &dyn BlockDevice, file_sector: usize) -> usize {
        if file_sector < NUM_DIRECT {
            self.direct[file_sector] as usize
        } else {
            let mut table = [0u32; SECTORS_PER_INDIRECT];
            read_table(device, self.indirect, &mut table);
            table[file_sector - NUM_DIRECT] as usize
        }
    }

    pub(crate) fn fetch_from(device: &dyn BlockDevice, sector: usize) -> Self {
        let mut buf = [0u8; SECTOR_SIZE];
        device.read_block(sector, &mut buf);
        let word = |i: usize| u32::from_le_bytes([buf[i * 4], buf[i * 4 + 1], buf[i * 4 + 2], buf[i * 4 + 3]]);
        let mut direct = [0u32; NUM_DIRECT];
        for (i, slot) in direct.iter_mut().enumerate() {
            *slot = word(1 + i);
        }
        Self {
            num_bytes: word(0),
            direct,
            indirect: word(1 + NUM_DIRECT),
        }
    }

    pub(crate) fn write_back(&self, device: &dyn BlockDevice, sector: usize) {
        let mut buf = [0u8; SECTOR_SIZE];
        let mut put = |i: usize, v: u32| buf[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        put(0, self.num_bytes);
        for (i, slot) in self.direct.iter().enumerate() {
            put(1 + i, *slot);
        }
        put(1 + NUM_DIRECT, self.indirect);
        device.write_block(sector, &buf);
    }
}

#[inline]
fn grab(free_map: &mut Bitmap) -> u32 {
    // callers check num_clear first
    free_map.find().unwrap() as u32
}

fn read_table(device: &dyn BlockDevice, sector: u32, table: &mut [u32; SECTORS_PER_INDIRECT]) {
    let mut buf = [0u8; SECTOR_SIZE];
    device.read_block(sector as usize, &mut buf);
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = u32::from_le_bytes([buf[i * 4], buf[i * 4 + 1], buf[i * 4 + 2], buf[i * 4 + 3]]);
    }
}

fn write_table(device: &dyn BlockDevice, sector: u32, table: &[u32; SECTORS_PER_INDIRECT]) {
    let mut buf = [0u8; SECTOR_SIZE];
    for (i, slot) in table.iter().enumerate() {
        buf[i * 4..i * 4 + 4].copy_from_slice(&slot.to_le_bytes());
    }
    device.write_block(sector as usize, &buf);
}
