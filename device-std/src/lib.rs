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

//! Hosted [`BlockDevice`] implementations: a file backed by the OS for real
//! use off the embedded target BRFS was designed for, and an in-memory one
//! for tests.

use std::{
    cell::RefCell,
    fs::{File, OpenOptions},
    io,
    os::unix::fs::FileExt,
    path::Path,
};

use brfs_device::BlockDevice;
use brfs_err::{Error, Result};
use log::error;

/// A flash image backed by a regular file, addressed the same way the real
/// SPI NOR part is: erase fills a sector with `0xFF`; write overwrites
/// whatever is there, mirroring the real part's program operation rather
/// than modeling bit-clearing semantics. Words are stored MSB-first,
/// matching the SPI wire order spec'd for the real part; the cache above
/// this collaborator always holds words in host-native order.
pub struct FileBlockDevice {
    file: File,
}

impl FileBlockDevice {
    /// Opens (creating if necessary) a flash image file of at least
    /// `min_len_bytes`.
    pub fn open(path: &Path, min_len_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        if file.metadata()?.len() < min_len_bytes {
            file.set_len(min_len_bytes)?;
        }
        Ok(Self { file })
    }

    fn io_err(context: &str, error: io::Error) -> Error {
        error!("{context}: {error}");
        Error::FlashError
    }
}

impl BlockDevice for FileBlockDevice {
    fn erase_sector(&self, byte_addr: u32) -> Result<()> {
        let erased = vec![0xFFu8; brfs_device::geom::SECTOR_SIZE_BYTES as usize];
        self.file
            .write_all_at(&erased, byte_addr as u64)
            .map_err(|e| Self::io_err("erase_sector", e))
    }

    fn write_words(&self, byte_addr: u32, words: &[u32]) -> Result<()> {
        if words.len() as u32 > brfs_device::geom::WORDS_PER_PAGE {
            error!(
                "write_words: {} words exceeds one page ({})",
                words.len(),
                brfs_device::geom::WORDS_PER_PAGE
            );
            return Err(Error::InvalidParam);
        }
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        self.file
            .write_all_at(&bytes, byte_addr as u64)
            .map_err(|e| Self::io_err("write_words", e))
    }

    fn read_words(&self, byte_addr: u32, words: &mut [u32]) -> Result<()> {
        let mut bytes = vec![0u8; words.len() * 4];
        self.file
            .read_exact_at(&mut bytes, byte_addr as u64)
            .map_err(|e| Self::io_err("read_words", e))?;
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_be_bytes(chunk.try_into().unwrap());
        }
        Ok(())
    }
}

/// An in-memory flash image. Never touches the filesystem; used by BRFS's
/// own test suite so mount/format/sync round trips don't need a temp file.
pub struct RamBlockDevice {
    words: RefCell<Vec<u32>>,
}

impl RamBlockDevice {
    /// Allocates a zero-filled image of `len_words` words.
    pub fn new(len_words: usize) -> Self {
        Self {
            words: RefCell::new(vec![0; len_words]),
        }
    }

    fn word_index(byte_addr: u32) -> usize {
        (byte_addr / 4) as usize
    }
}

impl BlockDevice for RamBlockDevice {
    fn erase_sector(&self, byte_addr: u32) -> Result<()> {
        let start = Self::word_index(byte_addr);
        let len = brfs_device::geom::WORDS_PER_SECTOR as usize;
        let mut words = self.words.borrow_mut();
        if start + len > words.len() {
            return Err(Error::FlashError);
        }
        words[start..start + len].fill(0xFFFF_FFFF);
        Ok(())
    }

    fn write_words(&self, byte_addr: u32, src: &[u32]) -> Result<()> {
        if src.len() as u32 > brfs_device::geom::WORDS_PER_PAGE {
            return Err(Error::InvalidParam);
        }
        let start = Self::word_index(byte_addr);
        let mut words = self.words.borrow_mut();
        if start + src.len() > words.len() {
            return Err(Error::FlashError);
        }
        words[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn read_words(&self, byte_addr: u32, dst: &mut [u32]) -> Result<()> {
        let start = Self::word_index(byte_addr);
        let words = self.words.borrow();
        if start + dst.len() > words.len() {
            return Err(Error::FlashError);
        }
        dst.copy_from_slice(&words[start..start + dst.len()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_device_round_trips_words() {
        let device = RamBlockDevice::new(brfs_device::geom::WORDS_PER_SECTOR as usize * 4);
        device.erase_sector(0).unwrap();
        let page: Vec<u32> = (0..64).collect();
        device.write_words(0, &page).unwrap();
        let mut back = vec![0u32; 64];
        device.read_words(0, &mut back).unwrap();
        assert_eq!(page, back);
    }

    #[test]
    fn ram_device_erase_fills_with_all_ones() {
        let device = RamBlockDevice::new(brfs_device::geom::WORDS_PER_SECTOR as usize);
        device.write_words(0, &[1, 2, 3]).unwrap();
        device.erase_sector(0).unwrap();
        let mut back = vec![0u32; 3];
        device.read_words(0, &mut back).unwrap();
        assert_eq!(back, vec![0xFFFF_FFFF; 3]);
    }

    #[test]
    fn write_words_rejects_more_than_one_page() {
        let device = RamBlockDevice::new(brfs_device::geom::WORDS_PER_SECTOR as usize);
        let too_big = vec![0u32; brfs_device::geom::WORDS_PER_PAGE as usize + 1];
        assert_eq!(device.write_words(0, &too_big), Err(Error::InvalidParam));
    }
}
