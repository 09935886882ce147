use crate::{BlockDevice, DIR_BASE_SECTOR, DIR_SECTORS, NUM_DIR_ENTRIES, SECTOR_SIZE};
use alloc::{
    string::{String, ToString},
    vec,
    vec::Vec,
};

/// On-disk bytes per directory entry.
pub(crate) const DIR_ENTRY_BYTES: usize = 32;

const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / DIR_ENTRY_BYTES;

/// The single, flat root directory: a fixed table of name → header sector.
pub(crate) struct Directory {
    entries: Vec<Option<DirEntry>>,
}

struct DirEntry {
    name: String,
    sector: u32,
}

impl Directory {
    pub(crate) fn new() -> Self {
        let mut entries = Vec::new();
        entries.resize_with(NUM_DIR_ENTRIES, || None);
        Self { entries }
    }

    /// Header sector of `name`, if present.
    pub(crate) fn find(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .flatten()
            .find(|e| e.name == name)
            .map(|e| e.sector)
    }

    /// Record `name` at `sector`. Fails only when the table is full.
    pub(crate) fn add(&mut self, name: &str, sector: u32) -> bool {
        match self.entries.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(DirEntry {
                    name: name.to_string(),
                    sector,
                });
                true
            }
            None => false,
        }
    }

    /// Drop `name` from the table, handing back its header sector.
    pub(crate) fn remove(&mut self, name: &str) -> Option<u32> {
        for slot in self.entries.iter_mut() {
            if slot.as_ref().map_or(false, |e| e.name == name) {
                return slot.take().map(|e| e.sector);
            }
        }
        None
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .flatten()
            .map(|e| e.name.clone())
            .collect()
    }

    pub(crate) fn fetch_from(device: &dyn BlockDevice) -> Self {
        let mut dir = Self::new();
        let mut buf = [0u8; SECTOR_SIZE];
        for s in 0..DIR_SECTORS {
            device.read_block(DIR_BASE_SECTOR + s, &mut buf);
            for i in 0..ENTRIES_PER_SECTOR {
                let raw = &buf[i * DIR_ENTRY_BYTES..(i + 1) * DIR_ENTRY_BYTES];
                if raw[4] == 0 {
                    continue;
                }
                let len = raw[5] as usize;
                let name = String::from_utf8_lossy(&raw[6..6 + len]).into_owned();
                let sector = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                dir.entries[s * ENTRIES_PER_SECTOR + i] = Some(DirEntry { name, sector });
            }
        }
        dir
    }

    pub(crate) fn write_back(&self, device: &dyn BlockDevice) {
        for s in 0..DIR_SECTORS {
            let mut buf = vec![0u8; SECTOR_SIZE];
            for i in 0..ENTRIES_PER_SECTOR {
                if let Some(entry) = &self.entries[s * ENTRIES_PER_SECTOR + i] {
                    let raw = &mut buf[i * DIR_ENTRY_BYTES..(i + 1) * DIR_ENTRY_BYTES];
                    raw[0..4].copy_from_slice(&entry.sector.to_le_bytes());
                    raw[4] = 1;
                    raw[5] = entry.name.len() as u8;
                    raw[6..6 + entry.name.len()].copy_from_slice(entry.name.as_bytes());
                }
            }
            device.write_block(DIR_BASE_SECTOR + s, &buf);
        }
    }
}
