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

//! FAT chain allocation, traversal and release.

use brfs_err::{Error, Result};

use crate::cache::Cache;
use crate::layout::{FAT_EOF, FAT_FREE};

impl Cache {
    /// Lowest-index first-fit free block search, matching the reuse order
    /// required of `delete` (freed blocks become the next allocation's
    /// first candidates in ascending order).
    pub(crate) fn find_free_block(&self) -> Result<u32> {
        self.fat()
            .iter()
            .position(|&cell| cell == FAT_FREE)
            .map(|idx| idx as u32)
            .ok_or(Error::NoSpace)
    }

    /// Allocates one free block, marks it end-of-chain, and returns its
    /// index. Does not touch the block's data.
    pub(crate) fn alloc_block(&mut self) -> Result<u32> {
        let idx = self.find_free_block()?;
        self.fat_mut()[idx as usize] = FAT_EOF;
        self.mark_fat_dirty(idx);
        Ok(idx)
    }

    /// Links `prev -> next` in the FAT, marking `prev`'s cell dirty.
    pub(crate) fn link_block(&mut self, prev: u32, next: u32) {
        self.fat_mut()[prev as usize] = next;
        self.mark_fat_dirty(prev);
    }

    /// Frees every block in the chain starting at `head`, in traversal
    /// order. The last block visited may be `FAT_EOF` itself, meaning an
    /// empty chain; callers pass the file's own head block, which always
    /// exists.
    pub(crate) fn free_chain(&mut self, head: u32) {
        let mut current = head;
        loop {
            let next = self.fat()[current as usize];
            self.fat_mut()[current as usize] = FAT_FREE;
            self.mark_fat_dirty(current);
            if next == FAT_EOF {
                break;
            }
            current = next;
        }
    }

    /// Walks the chain starting at `head` forward by `block_offset` links,
    /// returning the block index reached. `SeekError` if the chain ends
    /// before `block_offset` links are taken.
    pub(crate) fn fat_walk(&self, head: u32, block_offset: u32) -> Result<u32> {
        let mut current = head;
        for _ in 0..block_offset {
            current = self.fat()[current as usize];
            if current == FAT_EOF {
                return Err(Error::SeekError);
            }
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DIR_ENTRY_WORDS;

    #[test]
    fn alloc_picks_lowest_free_index() {
        let mut cache = Cache::new(4096);
        cache.reset(4, DIR_ENTRY_WORDS as u32 * 2).unwrap();
        cache.fat_mut()[0] = FAT_EOF; // block 0 reserved (root dir)
        assert_eq!(cache.alloc_block().unwrap(), 1);
        assert_eq!(cache.alloc_block().unwrap(), 2);
    }

    #[test]
    fn free_chain_walks_links_and_frees_every_block() {
        let mut cache = Cache::new(4096);
        cache.reset(4, DIR_ENTRY_WORDS as u32 * 2).unwrap();
        cache.fat_mut()[0] = 1;
        cache.fat_mut()[1] = 2;
        cache.fat_mut()[2] = FAT_EOF;
        cache.free_chain(0);
        assert_eq!(cache.fat(), &[FAT_FREE, FAT_FREE, FAT_FREE, FAT_FREE]);
    }

    #[test]
    fn fat_walk_past_eof_is_seek_error() {
        let mut cache = Cache::new(4096);
        cache.reset(2, DIR_ENTRY_WORDS as u32 * 2).unwrap();
        cache.fat_mut()[0] = FAT_EOF;
        assert_eq!(cache.fat_walk(0, 1), Err(Error::SeekError));
        assert_eq!(cache.fat_walk(0, 0), Ok(0));
    }

    #[test]
    fn alloc_on_full_volume_is_no_space() {
        let mut cache = Cache::new(4096);
        cache.reset(1, DIR_ENTRY_WORDS as u32 * 2).unwrap();
        cache.fat_mut()[0] = FAT_EOF;
        assert_eq!(cache.alloc_block(), Err(Error::NoSpace));
    }
}
