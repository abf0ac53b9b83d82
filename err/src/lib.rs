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

//! Flat, non-overlapping error taxonomy shared by every BRFS layer.

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("filesystem is not initialized")]
    NotInitialized,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("path exceeds the maximum length")]
    PathTooLong,
    #[error("filename exceeds the maximum length")]
    NameTooLong,
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    Exists,
    #[error("no free data block")]
    NoSpace,
    #[error("no free directory entry")]
    NoEntry,
    #[error("directory not empty")]
    NotEmpty,
    #[error("file is already open")]
    IsOpen,
    #[error("file is not open")]
    NotOpen,
    #[error("too many open files")]
    TooManyOpen,
    #[error("is a directory")]
    IsDirectory,
    #[error("not a directory")]
    NotDirectory,
    #[error("invalid superblock")]
    InvalidSuperblock,
    #[error("flash operation failed")]
    FlashError,
    #[error("seek position invalid")]
    SeekError,
    #[error("read operation failed")]
    ReadError,
    #[error("write operation failed")]
    WriteError,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Renders an error the way a caller-facing diagnostic would, independent of
/// `Display` (kept distinct so a shell embedding BRFS can surface its own
/// fixed wording for each error kind).
pub fn strerror(error: Error) -> &'static str {
    match error {
        Error::NotInitialized => "Not initialized",
        Error::InvalidParam => "Invalid parameter",
        Error::PathTooLong => "Path too long",
        Error::NameTooLong => "Filename too long",
        Error::NotFound => "Not found",
        Error::Exists => "Already exists",
        Error::NoSpace => "No space left",
        Error::NoEntry => "No free directory entry",
        Error::NotEmpty => "Directory not empty",
        Error::IsOpen => "File is open",
        Error::NotOpen => "File is not open",
        Error::TooManyOpen => "Too many open files",
        Error::IsDirectory => "Is a directory",
        Error::NotDirectory => "Not a directory",
        Error::InvalidSuperblock => "Invalid superblock",
        Error::FlashError => "Flash error",
        Error::SeekError => "Seek error",
        Error::ReadError => "Read error",
        Error::WriteError => "Write error",
    }
}
