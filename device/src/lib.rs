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

//! The SPI NOR flash collaborator BRFS mounts on top of.
//!
//! BRFS never talks to flash directly; every sector erase and word
//! read/write goes through a [`BlockDevice`]. The trait is word-addressed
//! (not byte-addressed) because BRFS's cache, FAT, and directory layouts are
//! all defined in words (see `brfs::layout`).

pub use brfs_err::{Error, Result};

/// Flash geometry shared by every `BlockDevice` implementation.
pub mod geom {
    /// Erase granularity, in bytes.
    pub const SECTOR_SIZE_BYTES: u32 = 4096;
    /// Program granularity, in bytes.
    pub const PAGE_SIZE_BYTES: u32 = 256;
    /// Erase granularity, in words.
    pub const WORDS_PER_SECTOR: u32 = SECTOR_SIZE_BYTES / 4;
    /// Program granularity, in words; also the maximum word count accepted
    /// by a single [`super::BlockDevice::write_words`] call.
    pub const WORDS_PER_PAGE: u32 = PAGE_SIZE_BYTES / 4;
}

/// Byte offsets of the three flash regions, relative to the device base.
pub mod addr {
    /// Superblock sector (first 64 bytes used).
    pub const SUPERBLOCK: u32 = 0x00000;
    /// First FAT sector.
    pub const FAT: u32 = 0x01000;
    /// First data sector.
    pub const DATA: u32 = 0x10000;
}

/// A block-erasable, word-addressable, word-granular SPI NOR flash device.
///
/// Implementations are free to busy-wait internally; BRFS never retries a
/// failed operation (see spec of the sync algorithm), so a `BlockDevice`
/// should only return an error for a condition the caller cannot recover
/// from by retrying.
pub trait BlockDevice {
    /// Erases the 4 KiB-aligned sector containing `byte_addr`.
    fn erase_sector(&self, byte_addr: u32) -> Result<()>;

    /// Writes `words` to a 256-byte-aligned address. At most
    /// [`geom::WORDS_PER_PAGE`] words per call.
    fn write_words(&self, byte_addr: u32, words: &[u32]) -> Result<()>;

    /// Reads `words.len()` words starting at `byte_addr`. Any length,
    /// any address.
    fn read_words(&self, byte_addr: u32, words: &mut [u32]) -> Result<()>;
}
