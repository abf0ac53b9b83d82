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

//! Path splitting. BRFS itself knows nothing about `.` or `..` — those are
//! resolved by the caller before a path ever reaches here.

use brfs_err::{Error, Result};

use crate::layout::{MAX_FILENAME_LEN, MAX_PATH_LEN};

/// Splits a path into its containing directory and final component, e.g.
/// `/a/b/c.txt` -> (`/a/b`, `c.txt`), `/c.txt` -> (`/`, `c.txt`), and a
/// slash-free `c.txt` -> (`/`, `c.txt`). Does not check that the directory
/// exists; that is [`crate::dir`]'s job.
pub fn parse_path(path: &str) -> Result<(String, String)> {
    if path.is_empty() || path.len() > MAX_PATH_LEN {
        return Err(Error::PathTooLong);
    }

    let (dir, filename) = match path.rfind('/') {
        None => ("/", path),
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
    };

    if filename.is_empty() || filename.len() > MAX_FILENAME_LEN {
        return Err(Error::NameTooLong);
    }

    Ok((dir.to_string(), filename.to_string()))
}
