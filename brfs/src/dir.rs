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

//! Directory block contents: entry slots, lookup, and path resolution.
//!
//! A directory is just a regular data block (or chain of blocks) whose
//! words are carved into [`DIR_ENTRY_WORDS`]-sized slots instead of file
//! bytes. Block 0 is always the root directory, allocated once by `format`
//! and never freed.

use brfs_err::{Error, Result};

use crate::cache::Cache;
use crate::layout::{DirEntry, DirFlags, DIR_ENTRY_WORDS};
use crate::path::parse_path;

/// Root directory's block index. Fixed by convention, like FAT's block 0.
pub const ROOT_BLOCK: u32 = 0;

impl Cache {
    pub(crate) fn entries_per_dir_block(&self) -> usize {
        self.words_per_block() as usize / DIR_ENTRY_WORDS
    }

    pub(crate) fn dir_entry(&self, block_idx: u32, slot: usize) -> DirEntry {
        let offset = slot * DIR_ENTRY_WORDS;
        DirEntry::decode(&self.data_block(block_idx)[offset..offset + DIR_ENTRY_WORDS])
    }

    pub(crate) fn write_dir_entry(&mut self, block_idx: u32, slot: usize, entry: &DirEntry) {
        let offset = slot * DIR_ENTRY_WORDS;
        let words = entry.encode();
        self.data_block_mut(block_idx)[offset..offset + DIR_ENTRY_WORDS].copy_from_slice(&words);
        self.mark_data_dirty(block_idx);
    }

    pub(crate) fn clear_dir_entry(&mut self, block_idx: u32, slot: usize) {
        let offset = slot * DIR_ENTRY_WORDS;
        self.data_block_mut(block_idx)[offset..offset + DIR_ENTRY_WORDS].fill(0);
        self.mark_data_dirty(block_idx);
    }

    fn slot_is_free(&self, block_idx: u32, slot: usize) -> bool {
        let offset = slot * DIR_ENTRY_WORDS;
        DirEntry::is_slot_free(&self.data_block(block_idx)[offset..offset + DIR_ENTRY_WORDS])
    }

    /// First free slot in `block_idx`, or `NoEntry` if the block is full.
    /// A BRFS directory is always a single block; it never grows a chain.
    pub(crate) fn find_free_dir_entry(&self, block_idx: u32) -> Result<usize> {
        (0..self.entries_per_dir_block())
            .find(|&slot| self.slot_is_free(block_idx, slot))
            .ok_or(Error::NoEntry)
    }

    /// Finds `name` among `block_idx`'s occupied slots.
    pub(crate) fn find_in_directory(&self, block_idx: u32, name: &str) -> Option<usize> {
        (0..self.entries_per_dir_block()).find(|&slot| {
            !self.slot_is_free(block_idx, slot) && self.dir_entry(block_idx, slot).filename == name
        })
    }

    /// Number of occupied slots in `block_idx`, `.`/`..` included.
    pub(crate) fn count_occupied_slots(&self, block_idx: u32) -> usize {
        (0..self.entries_per_dir_block())
            .filter(|&slot| !self.slot_is_free(block_idx, slot))
            .count()
    }

    /// Every occupied slot in `block_idx`, decoded.
    pub(crate) fn list_directory(&self, block_idx: u32) -> Vec<DirEntry> {
        (0..self.entries_per_dir_block())
            .filter(|&slot| !self.slot_is_free(block_idx, slot))
            .map(|slot| self.dir_entry(block_idx, slot))
            .collect()
    }

    /// Zeroes `block_idx` and writes fresh `.`/`..` entries pointing at
    /// itself and `parent_idx`. Both entries report `filesize` as
    /// `max_entries * DIR_ENTRY_WORDS`, matching every other directory
    /// entry's informational size field.
    pub(crate) fn init_directory_block(&mut self, block_idx: u32, parent_idx: u32) {
        self.data_block_mut(block_idx).fill(0);
        let dir_size = (self.entries_per_dir_block() * DIR_ENTRY_WORDS) as u32;
        self.write_dir_entry(
            block_idx,
            0,
            &DirEntry::new(".", block_idx, dir_size, DirFlags::DIRECTORY),
        );
        self.write_dir_entry(
            block_idx,
            1,
            &DirEntry::new("..", parent_idx, dir_size, DirFlags::DIRECTORY),
        );
    }

    /// Resolves an absolute directory path (`/`, `/a`, `/a/b`, ...) to the
    /// block index of the directory it names. `.`/`..` are not
    /// interpreted here; callers resolve those before the path reaches
    /// BRFS (see [`crate::path::parse_path`]).
    pub(crate) fn resolve_dir(&self, dir_path: &str) -> Result<u32> {
        let mut current = ROOT_BLOCK;
        for segment in dir_path.split('/').filter(|s| !s.is_empty()) {
            let slot = self
                .find_in_directory(current, segment)
                .ok_or(Error::NotFound)?;
            let entry = self.dir_entry(current, slot);
            if !entry.flags.contains(DirFlags::DIRECTORY) {
                return Err(Error::NotDirectory);
            }
            current = entry.fat_idx;
        }
        Ok(current)
    }

    /// Resolves an absolute file or directory path to the block holding
    /// its directory entry, the slot within that block, and the decoded
    /// entry itself.
    pub(crate) fn locate_entry(&self, path: &str) -> Result<(u32, usize, DirEntry)> {
        let (dir_path, name) = parse_path(path)?;
        let dir_block = self.resolve_dir(&dir_path)?;
        let slot = self
            .find_in_directory(dir_block, &name)
            .ok_or(Error::NotFound)?;
        let entry = self.dir_entry(dir_block, slot);
        Ok((dir_block, slot, entry))
    }

    /// Creates a file or (sub)directory entry at `path`. `flags` selects
    /// which: set [`DirFlags::DIRECTORY`] to create a directory, complete
    /// with fresh `.`/`..` entries; leave it unset for a plain, empty
    /// file. The data block is allocated (`NoSpace` on failure) before the
    /// directory slot is (`NoEntry` on failure), so a full FAT is reported
    /// in preference to a full directory when both are true.
    pub(crate) fn create_entry(&mut self, path: &str, flags: DirFlags) -> Result<()> {
        let (dir_path, name) = parse_path(path)?;
        let dir_block = self.resolve_dir(&dir_path)?;
        if self.find_in_directory(dir_block, &name).is_some() {
            return Err(Error::Exists);
        }
        let new_block = self.alloc_block()?;
        let slot = match self.find_free_dir_entry(dir_block) {
            Ok(slot) => slot,
            Err(e) => {
                self.free_chain(new_block);
                return Err(e);
            }
        };
        let filesize = if flags.contains(DirFlags::DIRECTORY) {
            self.init_directory_block(new_block, dir_block);
            (self.entries_per_dir_block() * DIR_ENTRY_WORDS) as u32
        } else {
            self.data_block_mut(new_block).fill(0);
            self.mark_data_dirty(new_block);
            0
        };
        self.write_dir_entry(dir_block, slot, &DirEntry::new(&name, new_block, filesize, flags));
        Ok(())
    }

    /// Releases `entry`'s whole block chain and clears its directory
    /// slot. Refuses to remove a non-empty directory. The caller is
    /// responsible for the `IS_OPEN` check, which needs the open-file
    /// table this type doesn't have access to.
    pub(crate) fn remove_entry(&mut self, dir_block: u32, slot: usize, entry: &DirEntry) -> Result<()> {
        if entry.flags.contains(DirFlags::DIRECTORY) && self.count_occupied_slots(entry.fat_idx) > 2 {
            return Err(Error::NotEmpty);
        }
        self.free_chain(entry.fat_idx);
        self.clear_dir_entry(dir_block, slot);
        Ok(())
    }

    /// Lists the entries of the directory named by `path`.
    pub(crate) fn read_dir_entries(&self, path: &str) -> Result<Vec<DirEntry>> {
        let block = self.resolve_dir(path)?;
        Ok(self.list_directory(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_cache() -> Cache {
        let mut cache = Cache::new(4096);
        cache.reset(4, DIR_ENTRY_WORDS as u32 * 4).unwrap();
        cache.init_directory_block(ROOT_BLOCK, ROOT_BLOCK);
        cache
    }

    #[test]
    fn resolve_dir_of_root_is_root_block() {
        let cache = root_cache();
        assert_eq!(cache.resolve_dir("/").unwrap(), ROOT_BLOCK);
    }

    #[test]
    fn find_in_directory_sees_dot_and_dotdot() {
        let cache = root_cache();
        assert!(cache.find_in_directory(ROOT_BLOCK, ".").is_some());
        assert!(cache.find_in_directory(ROOT_BLOCK, "..").is_some());
        assert!(cache.find_in_directory(ROOT_BLOCK, "nope").is_none());
    }

    #[test]
    fn create_and_resolve_nested_directory() {
        let mut cache = root_cache();
        cache.init_directory_block(1, ROOT_BLOCK);
        cache.write_dir_entry(
            ROOT_BLOCK,
            2,
            &DirEntry::new("sub", 1, 0, DirFlags::DIRECTORY),
        );
        assert_eq!(cache.resolve_dir("/sub").unwrap(), 1);
    }

    #[test]
    fn resolve_dir_through_a_file_is_not_directory() {
        let mut cache = root_cache();
        cache.write_dir_entry(ROOT_BLOCK, 2, &DirEntry::new("f", 1, 0, DirFlags::empty()));
        assert_eq!(cache.resolve_dir("/f/sub"), Err(Error::NotDirectory));
    }

    #[test]
    fn find_free_dir_entry_skips_dot_and_dotdot() {
        let cache = root_cache();
        assert_eq!(cache.find_free_dir_entry(ROOT_BLOCK).unwrap(), 2);
    }

    #[test]
    fn create_entry_rejects_duplicate_name() {
        let mut cache = root_cache();
        cache.fat_mut()[ROOT_BLOCK as usize] = crate::layout::FAT_EOF;
        cache.create_entry("/f.txt", DirFlags::empty()).unwrap();
        assert_eq!(
            cache.create_entry("/f.txt", DirFlags::empty()),
            Err(Error::Exists)
        );
    }

    #[test]
    fn create_entry_on_full_directory_is_no_entry_and_frees_the_block() {
        // 4-word-per-slot dir block holds 4 entries; `.`/`..` leave 2 free.
        let mut cache = root_cache();
        cache.fat_mut()[ROOT_BLOCK as usize] = crate::layout::FAT_EOF;
        cache.create_entry("/a", DirFlags::empty()).unwrap();
        cache.create_entry("/b", DirFlags::empty()).unwrap();
        let free_before = cache.find_free_block().unwrap();
        assert_eq!(
            cache.create_entry("/c", DirFlags::empty()),
            Err(Error::NoEntry)
        );
        // the block allocated for "/c" must have been released, not leaked
        assert_eq!(cache.find_free_block().unwrap(), free_before);
    }

    #[test]
    fn directory_entries_report_max_entries_times_entry_words_as_filesize() {
        let mut cache = root_cache();
        cache.fat_mut()[ROOT_BLOCK as usize] = crate::layout::FAT_EOF;
        let expected = (cache.entries_per_dir_block() * DIR_ENTRY_WORDS) as u32;
        assert_eq!(cache.dir_entry(ROOT_BLOCK, 0).filesize, expected); // "."
        assert_eq!(cache.dir_entry(ROOT_BLOCK, 1).filesize, expected); // ".."

        cache.create_entry("/sub", DirFlags::DIRECTORY).unwrap();
        let (_, _, entry) = cache.locate_entry("/sub").unwrap();
        assert_eq!(entry.filesize, expected);
    }

    #[test]
    fn create_dir_then_remove_requires_empty() {
        let mut cache = root_cache();
        cache.fat_mut()[ROOT_BLOCK as usize] = crate::layout::FAT_EOF;
        cache.create_entry("/sub", DirFlags::DIRECTORY).unwrap();
        let (dir_block, slot, entry) = cache.locate_entry("/sub").unwrap();
        cache.create_entry("/sub/f.txt", DirFlags::empty()).unwrap();
        assert_eq!(
            cache.remove_entry(dir_block, slot, &entry),
            Err(Error::NotEmpty)
        );
        let (_, _, file_entry) = cache.locate_entry("/sub/f.txt").unwrap();
        let (file_dir, file_slot, _) = cache.locate_entry("/sub/f.txt").unwrap();
        cache.remove_entry(file_dir, file_slot, &file_entry).unwrap();
        cache.remove_entry(dir_block, slot, &entry).unwrap();
        assert_eq!(cache.resolve_dir("/sub"), Err(Error::NotFound));
    }

    #[test]
    fn read_dir_entries_lists_children() {
        let mut cache = root_cache();
        cache.fat_mut()[ROOT_BLOCK as usize] = crate::layout::FAT_EOF;
        cache.create_entry("/a.txt", DirFlags::empty()).unwrap();
        let names: Vec<_> = cache
            .read_dir_entries("/")
            .unwrap()
            .into_iter()
            .map(|e| e.filename)
            .collect();
        assert!(names.contains(&"a.txt".to_string()));
        assert!(names.contains(&".".to_string()));
    }
}
