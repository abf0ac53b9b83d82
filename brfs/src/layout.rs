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

//! The on-disk word layout: superblock, FAT cell values, and packed
//! directory entries. Everything here is pure — no cache, no device, no I/O.

/// Superblock size, in words.
pub const SUPERBLOCK_WORDS: usize = 16;
/// Directory entry size, in words.
pub const DIR_ENTRY_WORDS: usize = 8;

/// Maximum path length, in characters.
pub const MAX_PATH_LEN: usize = 127;
/// Maximum filename length, in characters (4 words * 4 chars per word).
pub const MAX_FILENAME_LEN: usize = 16;
/// Maximum simultaneously open files.
pub const MAX_OPEN_FILES: usize = 16;
/// Maximum blocks in a filesystem.
pub const MAX_BLOCKS: u32 = 65536;
/// Maximum words per block.
pub const MAX_WORDS_PER_BLOCK: u32 = 2048;

/// Current on-disk format version.
pub const BRFS_VERSION: u32 = 1;

/// FAT cell sentinel: block is free.
pub const FAT_FREE: u32 = 0;
/// FAT cell sentinel: end of chain.
pub const FAT_EOF: u32 = 0xFFFF_FFFF;

bitflags::bitflags! {
    /// Directory entry flags (`brfs_dir_entry.flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirFlags: u32 {
        const DIRECTORY = 0x01;
        const HIDDEN = 0x02;
    }
}

/// Packs `src` 4 characters per word, high byte first, NUL-padded. Encodes
/// at most [`MAX_FILENAME_LEN`] bytes; the caller is responsible for
/// rejecting longer names before calling this (see [`crate::path::parse_path`]).
pub fn compress(src: &str) -> [u32; 4] {
    let bytes = src.as_bytes();
    let mut dest = [0u32; 4];
    let mut word_idx = 0usize;
    let mut word = 0u32;
    let mut char_idx = 0usize;

    loop {
        let c = bytes.get(char_idx).copied().unwrap_or(0) as u32;
        word |= c << (24 - (char_idx & 3) * 8);

        if c == 0 {
            dest[word_idx] = word;
            return dest;
        }

        char_idx += 1;
        if char_idx & 3 == 0 {
            dest[word_idx] = word;
            word_idx += 1;
            word = 0;
            if word_idx >= 4 {
                return dest;
            }
        }
    }
}

/// Extracts bytes high-to-low from each word; the first zero byte
/// terminates the name.
pub fn decompress(words: &[u32; 4]) -> String {
    let mut bytes = Vec::with_capacity(16);
    'words: for &word in words {
        for shift in [24, 16, 8, 0] {
            let c = ((word >> shift) & 0xFF) as u8;
            if c == 0 {
                break 'words;
            }
            bytes.push(c);
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// The filesystem's 16-word superblock.
#[derive(Debug, Clone)]
pub struct Superblock {
    pub total_blocks: u32,
    pub words_per_block: u32,
    pub label: String,
    pub version: u32,
}

impl Superblock {
    pub fn encode(&self) -> [u32; SUPERBLOCK_WORDS] {
        let mut words = [0u32; SUPERBLOCK_WORDS];
        words[0] = self.total_blocks;
        words[1] = self.words_per_block;
        for (slot, c) in words[2..12].iter_mut().zip(self.label.bytes().take(10)) {
            *slot = c as u32;
        }
        words[12] = self.version;
        words
    }

    pub fn decode(words: &[u32]) -> Self {
        let total_blocks = words[0];
        let words_per_block = words[1];
        let mut label = String::new();
        for &w in &words[2..12] {
            let c = (w & 0xFF) as u8;
            if c == 0 {
                break;
            }
            label.push(c as char);
        }
        let version = words[12];
        Self {
            total_blocks,
            words_per_block,
            label,
            version,
        }
    }
}

/// One 8-word directory entry slot.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub filename: String,
    /// Reserved; always written as 0 (no RTC support).
    pub modify_date: u32,
    pub flags: DirFlags,
    pub fat_idx: u32,
    pub filesize: u32,
}

impl DirEntry {
    pub fn new(filename: &str, fat_idx: u32, filesize: u32, flags: DirFlags) -> Self {
        Self {
            filename: filename.to_string(),
            modify_date: 0,
            flags,
            fat_idx,
            filesize,
        }
    }

    pub fn encode(&self) -> [u32; DIR_ENTRY_WORDS] {
        let mut words = [0u32; DIR_ENTRY_WORDS];
        words[0..4].copy_from_slice(&compress(&self.filename));
        words[4] = self.modify_date;
        words[5] = self.flags.bits();
        words[6] = self.fat_idx;
        words[7] = self.filesize;
        words
    }

    pub fn decode(words: &[u32]) -> Self {
        let name: [u32; 4] = words[0..4].try_into().unwrap();
        Self {
            filename: decompress(&name),
            modify_date: words[4],
            flags: DirFlags::from_bits_truncate(words[5]),
            fat_idx: words[6],
            filesize: words[7],
        }
    }

    /// A directory slot is free iff its first filename word is 0.
    pub fn is_slot_free(words: &[u32]) -> bool {
        words[0] == 0
    }
}
