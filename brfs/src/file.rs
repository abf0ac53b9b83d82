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

//! Open file table and cursor-based read/write.
//!
//! BRFS is word-addressed end to end, so a file's contents are a sequence
//! of `u32` words, not bytes: `cursor`, `seek`, `read` and `write` all
//! count words. A file's true size lives in its directory entry, not in
//! the [`OpenFile`] handle, so concurrent handles on the same entry always
//! see the latest size.

use brfs_device::BlockDevice;
use brfs_err::{Error, Result};

use crate::layout::DirEntry;
use crate::Brfs;

/// An index into a [`Brfs`]'s open file table.
pub type FileHandle = usize;

/// A single open-file-table slot: the file's chain head, its directory
/// entry's location (so `write` can update `filesize` in place), and a
/// word cursor private to this handle.
pub(crate) struct OpenFile {
    head_fat_idx: u32,
    cursor: u32,
    entry_block_idx: u32,
    entry_slot: usize,
}

impl<D: BlockDevice> Brfs<D> {
    fn open_file(&self, handle: FileHandle) -> Result<&OpenFile> {
        self.open_files
            .get(handle)
            .and_then(|slot| slot.as_ref())
            .ok_or(Error::NotOpen)
    }

    fn open_file_mut(&mut self, handle: FileHandle) -> Result<&mut OpenFile> {
        self.open_files
            .get_mut(handle)
            .and_then(|slot| slot.as_mut())
            .ok_or(Error::NotOpen)
    }

    fn entry_of(&self, open: &OpenFile) -> DirEntry {
        self.cache.dir_entry(open.entry_block_idx, open.entry_slot)
    }

    /// Is a directory entry at `(block_idx, slot)` held open by any
    /// handle? Checked before `delete`.
    pub(crate) fn entry_is_open(&self, block_idx: u32, slot: usize) -> bool {
        self.open_files.iter().flatten().any(|open| {
            open.entry_block_idx == block_idx && open.entry_slot == slot
        })
    }

    /// Opens the file at `path`, returning a handle positioned at word 0.
    pub fn open(&mut self, path: &str) -> Result<FileHandle> {
        self.ensure_mounted()?;
        let (dir_block, slot, entry) = self.cache.locate_entry(path)?;
        if entry.flags.contains(crate::layout::DirFlags::DIRECTORY) {
            return Err(Error::IsDirectory);
        }
        if self.entry_is_open(dir_block, slot) {
            return Err(Error::IsOpen);
        }
        let handle = self
            .open_files
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(Error::TooManyOpen)?;
        self.open_files[handle] = Some(OpenFile {
            head_fat_idx: entry.fat_idx,
            cursor: 0,
            entry_block_idx: dir_block,
            entry_slot: slot,
        });
        Ok(handle)
    }

    /// Closes `handle`. Further use of it is `NOT_OPEN`.
    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        self.ensure_mounted()?;
        self.open_file_mut(handle)?;
        self.open_files[handle] = None;
        Ok(())
    }

    /// Current cursor position, in words from the start of the file.
    pub fn tell(&self, handle: FileHandle) -> Result<u32> {
        self.ensure_mounted()?;
        Ok(self.open_file(handle)?.cursor)
    }

    /// The file's current size, in words.
    pub fn file_size(&self, handle: FileHandle) -> Result<u32> {
        self.ensure_mounted()?;
        let open = self.open_file(handle)?;
        Ok(self.entry_of(open).filesize)
    }

    /// Moves `handle`'s cursor to `word_offset`, clamped to `[0,
    /// file_size]`, and returns the cursor's actual landing position.
    pub fn seek(&mut self, handle: FileHandle, word_offset: u32) -> Result<u32> {
        self.ensure_mounted()?;
        let size = self.file_size(handle)?;
        let clamped = word_offset.min(size);
        self.open_file_mut(handle)?.cursor = clamped;
        Ok(clamped)
    }

    /// Reads up to `dst.len()` words starting at the cursor, advancing it
    /// by the amount actually read. Returns a short count at end of file;
    /// never an error for that.
    pub fn read(&mut self, handle: FileHandle, dst: &mut [u32]) -> Result<usize> {
        self.ensure_mounted()?;
        let open = self.open_file(handle)?;
        let size = self.entry_of(open).filesize;
        let head = open.head_fat_idx;
        let mut cursor = open.cursor;

        let words_per_block = self.cache.words_per_block();
        let to_read = (dst.len() as u32).min(size.saturating_sub(cursor)) as usize;
        let mut read = 0usize;

        while read < to_read {
            let block_idx = self.cache.fat_walk(head, cursor / words_per_block)?;
            let offset_in_block = (cursor % words_per_block) as usize;
            let block = self.cache.data_block(block_idx);
            let take = (words_per_block as usize - offset_in_block).min(to_read - read);
            dst[read..read + take].copy_from_slice(&block[offset_in_block..offset_in_block + take]);
            read += take;
            cursor += take as u32;
        }

        self.open_file_mut(handle)?.cursor = cursor;
        Ok(read)
    }

    /// Writes `src` at the cursor, allocating new blocks as the file
    /// grows and advancing the cursor by the amount actually written.
    /// Stops short (returning the count written so far, not an error) if
    /// the volume runs out of space mid-write.
    pub fn write(&mut self, handle: FileHandle, src: &[u32]) -> Result<usize> {
        self.ensure_mounted()?;
        let open = self.open_file(handle)?;
        let head = open.head_fat_idx;
        let mut cursor = open.cursor;
        let entry_block_idx = open.entry_block_idx;
        let entry_slot = open.entry_slot;

        let words_per_block = self.cache.words_per_block();
        let mut written = 0usize;

        while written < src.len() {
            let block_offset = cursor / words_per_block;
            let block_idx = match self.cache.fat_walk(head, block_offset) {
                Ok(idx) => idx,
                Err(_) => {
                    let tail = self.cache.fat_walk(head, block_offset.saturating_sub(1));
                    let tail = match tail {
                        Ok(idx) => idx,
                        Err(e) => return Err(e),
                    };
                    match self.cache.alloc_block() {
                        Ok(new_block) => {
                            self.cache.link_block(tail, new_block);
                            self.cache.data_block_mut(new_block).fill(0);
                            self.cache.mark_data_dirty(new_block);
                            new_block
                        }
                        Err(_) => break,
                    }
                }
            };

            let offset_in_block = (cursor % words_per_block) as usize;
            let take = (words_per_block as usize - offset_in_block).min(src.len() - written);
            self.cache.data_block_mut(block_idx)[offset_in_block..offset_in_block + take]
                .copy_from_slice(&src[written..written + take]);
            self.cache.mark_data_dirty(block_idx);
            written += take;
            cursor += take as u32;
        }

        let mut entry = self.cache.dir_entry(entry_block_idx, entry_slot);
        if cursor > entry.filesize {
            entry.filesize = cursor;
            self.cache.write_dir_entry(entry_block_idx, entry_slot, &entry);
        }
        self.open_file_mut(handle)?.cursor = cursor;
        Ok(written)
    }
}
