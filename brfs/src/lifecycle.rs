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

//! Format, mount, unmount and sync: the only operations that touch the
//! [`BlockDevice`]. Every other module in this crate only ever touches
//! [`Cache`].

use log::{debug, info};

use brfs_device::{addr, geom, BlockDevice};
use brfs_err::{Error, Result};

use crate::cache::Cache;
use crate::dir::ROOT_BLOCK;
use crate::layout::{Superblock, BRFS_VERSION, MAX_BLOCKS, MAX_OPEN_FILES, MAX_WORDS_PER_BLOCK, SUPERBLOCK_WORDS};

/// Lifecycle state of a [`Brfs`](crate::Brfs) instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Neither formatted nor mounted this session; nothing but `format`
    /// and `mount` are accepted.
    Uninitialized,
    /// Mounted (or just formatted) with no unsynced changes.
    Idle,
    /// Mounted with changes pending in the cache that `sync` hasn't
    /// written back yet.
    Dirty,
}

/// `fn(phase, current, total)`, called periodically during long-running
/// flash operations so a caller can drive a progress bar. `phase` is one
/// of `"mount"`, `"format-zero"`, `"sync-fat"`, `"sync-data"`.
pub type ProgressCallback = Box<dyn FnMut(&str, u32, u32)>;

impl<D: BlockDevice> crate::Brfs<D> {
    pub(crate) fn ensure_mounted(&self) -> Result<()> {
        if self.state == State::Uninitialized {
            Err(Error::NotInitialized)
        } else {
            Ok(())
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Installs a progress callback, replacing any previous one.
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    pub(crate) fn report(&mut self, phase: &str, current: u32, total: u32) {
        if let Some(callback) = &mut self.progress {
            callback(phase, current, total);
        }
    }

    /// Lays down a fresh, empty volume of `total_blocks` blocks of
    /// `words_per_block` words each, labeled `label` (truncated to 10
    /// characters).
    ///
    /// Every FAT cell and every data block is marked dirty unconditionally,
    /// so the next `sync` writes the whole volume back to flash regardless
    /// of `full_format`. `full_format` only controls whether that pass is
    /// narrated: when set, `"format-zero"` progress is reported once per
    /// data sector as the zeroed volume is (conceptually) laid down; when
    /// clear, the same dirty state is left for `sync` to flush silently.
    ///
    /// The superblock is erased and reprogrammed on flash immediately,
    /// independent of `sync`; the FAT and data regions remain dirty, to be
    /// flushed by the next `sync`.
    pub fn format(
        &mut self,
        total_blocks: u32,
        words_per_block: u32,
        label: &str,
        full_format: bool,
    ) -> Result<()> {
        if !is_valid_geometry(total_blocks, words_per_block) {
            return Err(Error::InvalidParam);
        }

        self.cache.reset(total_blocks, words_per_block)?;

        let superblock = Superblock {
            total_blocks,
            words_per_block,
            label: label.to_string(),
            version: BRFS_VERSION,
        };
        self.cache
            .superblock_mut()
            .copy_from_slice(&superblock.encode());

        self.cache.fat_mut()[ROOT_BLOCK as usize] = crate::layout::FAT_EOF;
        self.cache.init_directory_block(ROOT_BLOCK, ROOT_BLOCK);
        self.cache.dirty_fat.set_all();
        self.cache.dirty_data.set_all();

        if full_format {
            let sector_words = geom::WORDS_PER_SECTOR as usize;
            let data_len = self.cache.data_region().len();
            let total_sectors = data_len.div_ceil(sector_words).max(1);
            for sector in 0..total_sectors {
                let word_start = (sector * sector_words) as u32;
                let word_end = ((sector * sector_words + sector_words).min(data_len)) as u32;
                if word_start >= word_end {
                    break;
                }
                self.report("format-zero", sector as u32 + 1, total_sectors as u32);
            }
        }

        self.device.erase_sector(addr::SUPERBLOCK)?;
        write_paged(&self.device, addr::SUPERBLOCK, self.cache.superblock())?;

        info!("formatted {total_blocks} blocks x {words_per_block} words, label {label:?}, full_format={full_format}");
        self.state = State::Dirty;
        self.open_files = std::iter::repeat_with(|| None).take(MAX_OPEN_FILES).collect();
        Ok(())
    }

    /// Loads an existing volume from the device into the cache. The volume
    /// geometry (`total_blocks`, `words_per_block`) is discovered entirely
    /// from the on-flash superblock, not supplied by the caller; any
    /// violation of the superblock's own validation rules (bad version, a
    /// block/word count of zero, over the format maximum, or not a
    /// multiple of 64) fails with `InvalidSuperblock`.
    pub fn mount(&mut self) -> Result<()> {
        let mut raw_superblock = [0u32; SUPERBLOCK_WORDS];
        self.device
            .read_words(addr::SUPERBLOCK, &mut raw_superblock)?;
        let superblock = Superblock::decode(&raw_superblock);
        if superblock.version != BRFS_VERSION
            || !is_valid_geometry(superblock.total_blocks, superblock.words_per_block)
        {
            return Err(Error::InvalidSuperblock);
        }
        let (total_blocks, words_per_block) = (superblock.total_blocks, superblock.words_per_block);

        if !Cache::fits(self.cache.max_cache_words(), total_blocks, words_per_block) {
            return Err(Error::NoSpace);
        }

        self.cache.reset(total_blocks, words_per_block)?;
        self.cache.superblock_mut().copy_from_slice(&raw_superblock);

        let sector_words = geom::WORDS_PER_SECTOR as usize;

        let fat_len = self.cache.fat().len();
        let fat_sectors = fat_len.div_ceil(sector_words).max(1);
        let data_len = self.cache.data_region().len();
        let data_sectors = data_len.div_ceil(sector_words).max(1);
        let total_sectors = (fat_sectors + data_sectors) as u32;
        let mut current = 0u32;

        for sector in 0..fat_sectors {
            let start = sector * sector_words;
            let end = (start + sector_words).min(fat_len);
            if start >= end {
                break;
            }
            self.device
                .read_words(addr::FAT + (sector * geom::SECTOR_SIZE_BYTES as usize) as u32, &mut self.cache.fat_mut()[start..end])?;
            current += 1;
            self.report("mount", current, total_sectors);
        }

        for sector in 0..data_sectors {
            let start = sector * sector_words;
            let end = (start + sector_words).min(data_len);
            if start >= end {
                break;
            }
            self.device.read_words(
                addr::DATA + (sector * geom::SECTOR_SIZE_BYTES as usize) as u32,
                &mut self.cache.data_region_mut()[start..end],
            )?;
            current += 1;
            self.report("mount", current, total_sectors);
        }

        self.cache.clear_dirty();
        self.open_files = std::iter::repeat_with(|| None).take(MAX_OPEN_FILES).collect();
        self.state = State::Idle;
        debug!("mounted {total_blocks} blocks x {words_per_block} words");
        Ok(())
    }

    /// Writes every dirty FAT cell and data block back to flash, erasing
    /// and rewriting whole sectors at a time, then clears both dirty
    /// bitmaps. A true no-op when nothing is dirty. The superblock is never
    /// touched here; it is rewritten only by `format`.
    pub fn sync(&mut self) -> Result<()> {
        self.ensure_mounted()?;

        let sector_words = geom::WORDS_PER_SECTOR as usize;
        let sector_bytes = geom::SECTOR_SIZE_BYTES;

        let fat_len = self.cache.fat().len();
        let fat_sectors = fat_len.div_ceil(sector_words).max(1);
        for sector in 0..fat_sectors {
            let start = (sector * sector_words) as u32;
            let end = ((sector * sector_words + sector_words).min(fat_len)) as u32;
            if start >= end {
                break;
            }
            if self.cache.dirty_fat.any_set_in(start..end) {
                let byte_addr = addr::FAT + sector as u32 * sector_bytes;
                self.device.erase_sector(byte_addr)?;
                write_paged(&self.device, byte_addr, &self.cache.fat()[start as usize..end as usize])?;
            }
            self.report("sync-fat", sector as u32 + 1, fat_sectors as u32);
        }

        let words_per_block = self.cache.words_per_block();
        let data_len = self.cache.data_region().len();
        let data_sectors = data_len.div_ceil(sector_words).max(1);
        for sector in 0..data_sectors {
            let word_start = (sector * sector_words) as u32;
            let word_end = ((sector * sector_words + sector_words).min(data_len)) as u32;
            if word_start >= word_end {
                break;
            }
            let block_start = word_start / words_per_block;
            let block_end = word_end.div_ceil(words_per_block);
            if self.cache.dirty_data.any_set_in(block_start..block_end) {
                let byte_addr = addr::DATA + sector as u32 * sector_bytes;
                self.device.erase_sector(byte_addr)?;
                write_paged(
                    &self.device,
                    byte_addr,
                    &self.cache.data_region()[word_start as usize..word_end as usize],
                )?;
            }
            self.report("sync-data", sector as u32 + 1, data_sectors as u32);
        }

        self.cache.clear_dirty();
        self.state = State::Idle;
        Ok(())
    }

    /// Closes every open file and drops back to `Uninitialized`. Pending
    /// changes that haven't been `sync`ed are lost from flash, though the
    /// in-memory cache already reflects them until this call returns.
    pub fn unmount(&mut self) -> Result<()> {
        self.ensure_mounted()?;
        self.open_files.fill(None);
        self.state = State::Uninitialized;
        Ok(())
    }
}

/// `total_blocks`/`words_per_block` must each be a positive multiple of 64,
/// within the format maximums; checked by both `format` (on caller input)
/// and `mount` (on the superblock read back from flash).
fn is_valid_geometry(total_blocks: u32, words_per_block: u32) -> bool {
    total_blocks != 0
        && total_blocks <= MAX_BLOCKS
        && total_blocks % 64 == 0
        && words_per_block != 0
        && words_per_block <= MAX_WORDS_PER_BLOCK
        && words_per_block % 64 == 0
}

/// Splits `words` into page-sized (`WORDS_PER_PAGE`) chunks, the largest
/// unit a `BlockDevice::write_words` call accepts.
fn write_paged<D: BlockDevice + ?Sized>(device: &D, byte_addr: u32, words: &[u32]) -> Result<()> {
    let page_words = geom::WORDS_PER_PAGE as usize;
    for (chunk_idx, chunk) in words.chunks(page_words).enumerate() {
        let addr = byte_addr + (chunk_idx * page_words * 4) as u32;
        device.write_words(addr, chunk)?;
    }
    Ok(())
}
