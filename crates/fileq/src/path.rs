// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Segment file naming and directory scanning.
//!
//! Segments are named `q-<018-digit zero-padded index>.fq` and created in
//! strictly increasing index order by the writer.

use std::path::Path;

use crate::Result;

/// Prefix of every segment file name.
const SEGMENT_PREFIX: &str = "q-";

/// Extension of every segment file name, dot included.
const SEGMENT_EXTENSION: &str = ".fq";

/// Width of the zero-padded index in a segment file name.
const SEGMENT_INDEX_DIGITS: usize = 18;

/// Generates a segment file name: `q-000000000000000042.fq`.
pub(crate) fn segment_file_name(index: i64) -> String {
    format!("{SEGMENT_PREFIX}{index:018}{SEGMENT_EXTENSION}")
}

/// Parses the index out of a segment file name, `None` for foreign files.
pub(crate) fn parse_segment_index(name: &str) -> Option<i64> {
    let digits = name
        .strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_EXTENSION)?;

    if digits.len() != SEGMENT_INDEX_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse().ok()
}

/// Scans `dir` for the highest existing segment index, -1 if none.
pub(crate) fn max_segment_index(dir: &Path) -> Result<i64> {
    let mut max = -1i64;
    if !dir.exists() {
        return Ok(max);
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(index) = entry
            .file_name()
            .to_str()
            .and_then(parse_segment_index)
        {
            max = max.max(index);
        }
    }

    Ok(max)
}
