// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bart's RAM File System: a FAT-style filesystem that keeps its whole
//! volume cached in RAM and persists it to block-erasable SPI NOR flash.
//!
//! [`Brfs`] is generic over any [`BlockDevice`]; `brfs_device_std` supplies
//! a file-backed one for hosted use and an in-memory one for tests.

mod cache;
mod dir;
mod fat;
mod file;
pub mod layout;
mod lifecycle;
mod path;

pub use brfs_device::BlockDevice;
pub use brfs_err::{strerror, Error, Result};
pub use file::FileHandle;
pub use layout::{DirEntry, DirFlags};
pub use lifecycle::{ProgressCallback, State};
pub use path::parse_path;

use cache::Cache;
use dir::ROOT_BLOCK;
use file::OpenFile;
use layout::{FAT_FREE, MAX_OPEN_FILES};

/// A snapshot of volume-level accounting, as returned by [`Brfs::statfs`].
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub words_per_block: u32,
    pub label: String,
}

/// A mounted (or not-yet-mounted) BRFS volume sitting on top of a
/// [`BlockDevice`] `D`.
///
/// Every read-only and cache-mutating operation (`stat`, `create_file`,
/// `write`, ...) requires [`State::Idle`] or [`State::Dirty`] — i.e. a
/// prior successful `format` or `mount` — and fails with
/// [`Error::NotInitialized`] otherwise. Only `format` and `mount` touch
/// the device directly outside of `sync`.
pub struct Brfs<D: BlockDevice> {
    device: D,
    cache: Cache,
    open_files: Vec<Option<OpenFile>>,
    state: State,
    progress: Option<ProgressCallback>,
}

impl<D: BlockDevice> Brfs<D> {
    /// Builds a not-yet-initialized filesystem over `device`.
    /// `max_cache_words` bounds the largest volume geometry `format` and
    /// `mount` will accept: `16 + total_blocks + total_blocks *
    /// words_per_block` must not exceed it. There is no compiled-in
    /// default; callers size this to whatever RAM budget they actually
    /// have.
    pub fn new(device: D, max_cache_words: usize) -> Self {
        Self {
            device,
            cache: Cache::new(max_cache_words),
            open_files: std::iter::repeat_with(|| None).take(MAX_OPEN_FILES).collect(),
            state: State::Uninitialized,
            progress: None,
        }
    }

    /// Creates an empty file at `path`. The containing directory must
    /// already exist.
    pub fn create_file(&mut self, path: &str) -> Result<()> {
        self.ensure_mounted()?;
        self.cache.create_entry(path, DirFlags::empty())?;
        self.state = State::Dirty;
        Ok(())
    }

    /// Creates an empty directory at `path`, with fresh `.`/`..` entries.
    /// The containing directory must already exist.
    pub fn create_dir(&mut self, path: &str) -> Result<()> {
        self.ensure_mounted()?;
        self.cache.create_entry(path, DirFlags::DIRECTORY)?;
        self.state = State::Dirty;
        Ok(())
    }

    /// Removes the file or empty directory at `path`. Fails with
    /// `NotEmpty` for a non-empty directory and `IsOpen` if any handle
    /// currently has it open.
    pub fn delete(&mut self, path: &str) -> Result<()> {
        self.ensure_mounted()?;
        if path == "/" {
            return Err(Error::InvalidParam);
        }
        let (dir_block, slot, entry) = self.cache.locate_entry(path)?;
        if self.entry_is_open(dir_block, slot) {
            return Err(Error::IsOpen);
        }
        self.cache.remove_entry(dir_block, slot, &entry)?;
        self.state = State::Dirty;
        Ok(())
    }

    /// Lists the entries of the directory at `path`, `.`/`..` included.
    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.ensure_mounted()?;
        self.cache.read_dir_entries(path)
    }

    /// Returns the directory entry describing `path`. The root directory
    /// has no entry of its own on flash, so `stat("/")` synthesizes one
    /// with the literal filename `"/"`.
    pub fn stat(&self, path: &str) -> Result<DirEntry> {
        self.ensure_mounted()?;
        if path == "/" {
            return Ok(DirEntry::new(
                "/",
                ROOT_BLOCK,
                self.cache.words_per_block(),
                DirFlags::DIRECTORY,
            ));
        }
        let (_, _, entry) = self.cache.locate_entry(path)?;
        Ok(entry)
    }

    /// Whether `path` names anything at all. Every error `stat` can
    /// produce (including `NotInitialized`) is swallowed into `false`.
    pub fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    /// Whether `path` names a directory. `false` for files and for
    /// anything `stat` can't resolve.
    pub fn is_dir(&self, path: &str) -> bool {
        self.stat(path)
            .map(|entry| entry.flags.contains(DirFlags::DIRECTORY))
            .unwrap_or(false)
    }

    /// Volume-wide accounting: block counts and the volume label.
    pub fn statfs(&self) -> Result<VolumeInfo> {
        self.ensure_mounted()?;
        let free_blocks = self.cache.fat().iter().filter(|&&cell| cell == FAT_FREE).count() as u32;
        let superblock = layout::Superblock::decode(self.cache.superblock());
        Ok(VolumeInfo {
            total_blocks: self.cache.total_blocks(),
            free_blocks,
            words_per_block: self.cache.words_per_block(),
            label: superblock.label,
        })
    }

    /// The volume label set at `format` time.
    pub fn label(&self) -> Result<String> {
        self.ensure_mounted()?;
        Ok(layout::Superblock::decode(self.cache.superblock()).label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brfs_device_std::RamBlockDevice;

    const TOTAL_BLOCKS: u32 = 64;
    const WORDS_PER_BLOCK: u32 = 64;
    const MAX_CACHE_WORDS: usize = 16 + TOTAL_BLOCKS as usize + TOTAL_BLOCKS as usize * WORDS_PER_BLOCK as usize;

    fn device_words() -> usize {
        // Enough for superblock + FAT + data regions at their fixed
        // flash addresses.
        (brfs_device::addr::DATA as usize / 4) + TOTAL_BLOCKS as usize * WORDS_PER_BLOCK as usize
    }

    fn formatted_fs() -> Brfs<RamBlockDevice> {
        let device = RamBlockDevice::new(device_words());
        let mut fs = Brfs::new(device, MAX_CACHE_WORDS);
        fs.format(TOTAL_BLOCKS, WORDS_PER_BLOCK, "TESTVOL", true).unwrap();
        fs
    }

    #[test]
    fn format_then_statfs_reports_geometry_and_label() {
        let fs = formatted_fs();
        let info = fs.statfs().unwrap();
        assert_eq!(info.total_blocks, TOTAL_BLOCKS);
        assert_eq!(info.words_per_block, WORDS_PER_BLOCK);
        assert_eq!(info.label, "TESTVOL");
        assert_eq!(info.free_blocks, TOTAL_BLOCKS - 1); // root dir takes block 0
    }

    #[test]
    fn operations_before_mount_are_not_initialized() {
        let device = RamBlockDevice::new(device_words());
        let fs = Brfs::new(device, MAX_CACHE_WORDS);
        assert_eq!(fs.stat("/"), Err(Error::NotInitialized));
    }

    #[test]
    fn create_list_and_stat_a_directory() {
        let mut fs = formatted_fs();
        fs.create_dir("/docs").unwrap();
        fs.create_file("/docs/readme.txt").unwrap();

        assert!(fs.is_dir("/docs"));
        assert!(fs.exists("/docs/readme.txt"));
        assert!(!fs.is_dir("/docs/readme.txt"));

        let names: Vec<_> = fs
            .read_dir("/docs")
            .unwrap()
            .into_iter()
            .map(|e| e.filename)
            .collect();
        assert!(names.contains(&"readme.txt".to_string()));
    }

    #[test]
    fn write_read_persist_across_sync_unmount_mount() {
        let mut fs = formatted_fs();
        fs.create_file("/a.bin").unwrap();
        let handle = fs.open("/a.bin").unwrap();
        let payload: Vec<u32> = (1..=64).collect();
        assert_eq!(fs.write(handle, &payload).unwrap(), 64);
        assert_eq!(fs.file_size(handle).unwrap(), 64);
        fs.close(handle).unwrap();
        fs.sync().unwrap();
        fs.unmount().unwrap();

        fs.mount().unwrap();
        let handle = fs.open("/a.bin").unwrap();
        assert_eq!(fs.file_size(handle).unwrap(), 64);
        let mut back = vec![0u32; 64];
        assert_eq!(fs.read(handle, &mut back).unwrap(), 64);
        assert_eq!(back, payload);
    }

    #[test]
    fn multi_block_write_spans_blocks_and_seek_clamps() {
        let mut fs = formatted_fs();
        fs.create_file("/big.bin").unwrap();
        let handle = fs.open("/big.bin").unwrap();
        let payload: Vec<u32> = (0..WORDS_PER_BLOCK * 3).collect();
        assert_eq!(fs.write(handle, &payload).unwrap(), payload.len());
        assert_eq!(fs.file_size(handle).unwrap(), payload.len() as u32);

        let landed = fs.seek(handle, payload.len() as u32 + 1000).unwrap();
        assert_eq!(landed, payload.len() as u32);
        assert_eq!(fs.tell(handle).unwrap(), payload.len() as u32);

        fs.seek(handle, 0).unwrap();
        let mut back = vec![0u32; payload.len()];
        assert_eq!(fs.read(handle, &mut back).unwrap(), payload.len());
        assert_eq!(back, payload);
    }

    #[test]
    fn delete_reclaims_lowest_index_block_first() {
        let mut fs = formatted_fs();
        fs.create_file("/x").unwrap();
        fs.create_file("/y").unwrap();
        let x_block = fs.stat("/x").unwrap().fat_idx;
        fs.delete("/x").unwrap();
        fs.create_file("/z").unwrap();
        assert_eq!(fs.stat("/z").unwrap().fat_idx, x_block);
    }

    #[test]
    fn delete_rejects_non_empty_directory() {
        let mut fs = formatted_fs();
        fs.create_dir("/d").unwrap();
        fs.create_file("/d/f").unwrap();
        assert_eq!(fs.delete("/d"), Err(Error::NotEmpty));
    }

    #[test]
    fn delete_rejects_open_file() {
        let mut fs = formatted_fs();
        fs.create_file("/f").unwrap();
        let _handle = fs.open("/f").unwrap();
        assert_eq!(fs.delete("/f"), Err(Error::IsOpen));
    }

    #[test]
    fn second_open_of_the_same_file_is_is_open() {
        let mut fs = formatted_fs();
        fs.create_file("/f").unwrap();
        let _handle = fs.open("/f").unwrap();
        assert_eq!(fs.open("/f"), Err(Error::IsOpen));
    }

    #[test]
    fn create_file_rejects_existing_name() {
        let mut fs = formatted_fs();
        fs.create_file("/dup").unwrap();
        assert_eq!(fs.create_file("/dup"), Err(Error::Exists));
    }

    #[test]
    fn open_on_directory_is_is_directory() {
        let mut fs = formatted_fs();
        fs.create_dir("/d").unwrap();
        assert_eq!(fs.open("/d"), Err(Error::IsDirectory));
    }

    #[test]
    fn write_past_volume_capacity_returns_short_count() {
        // block 0 is root; the remaining TOTAL_BLOCKS - 1 blocks are all
        // available to a single file.
        let mut fs = formatted_fs();
        fs.create_file("/f").unwrap();
        let handle = fs.open("/f").unwrap();
        let capacity = WORDS_PER_BLOCK as usize * (TOTAL_BLOCKS as usize - 1);
        let payload = vec![7u32; capacity + WORDS_PER_BLOCK as usize];
        let written = fs.write(handle, &payload).unwrap();
        assert_eq!(written, capacity);
    }
}
