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

//! Durable read-position record, memory-mapped for low-latency updates.
//!
//! The checkpoint file holds the read cursor of the last delivered record as
//! two little-endian signed 64-bit integers:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────┬──────────────────┐
//! │ segment index (8B)   │ byte offset (8B)     │ reserved (48B)   │
//! └──────────────────────┴──────────────────────┴──────────────────┘
//! ```
//!
//! A fresh file is initialized to `(-1, 0)`, meaning "never read". The pair
//! is cached in memory at open time and never re-read from disk; a queue
//! instance is the sole owner of its checkpoint file.
//!
//! The two fields are overwritten in place. The update is not atomic across
//! both fields — a crash between the two stores can leave a pair that was
//! never valid together; recovery tolerates this because a stale cursor only
//! points at a segment that is re-checked (and lazily skipped if gone).

use std::{fs, path::Path};

use mmap_io::MemoryMappedFile;

use crate::{Result, error::MmapSnafu};

/// Name of the checkpoint file inside the meta directory.
const CHECKPOINT_FILE_NAME: &str = "meta";

/// Fixed mapped size: two i64 fields plus reserved space for forward
/// compatibility.
const CHECKPOINT_FILE_SIZE: u64 = 64;

/// Memory-mapped checkpoint of the read cursor.
#[derive(Debug)]
pub(crate) struct Checkpoint {
    mmap:    MemoryMappedFile,
    segment: i64,
    offset:  u64,
}

impl Checkpoint {
    /// Open (or create) the checkpoint under `dir`.
    ///
    /// A missing or undersized file is created and persisted as `(-1, 0)`.
    pub(crate) fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(CHECKPOINT_FILE_NAME);

        let fresh = !path.exists() || fs::metadata(&path)?.len() < CHECKPOINT_FILE_SIZE;
        if fresh {
            let mmap = MemoryMappedFile::create_rw(&path, CHECKPOINT_FILE_SIZE)
                .map_err(|e| MmapSnafu { message: e.to_string() }.build())?;

            let mut checkpoint = Self { mmap, segment: -1, offset: 0 };
            checkpoint.persist(-1, 0)?;
            return Ok(checkpoint);
        }

        let mmap = MemoryMappedFile::open_rw(&path)
            .map_err(|e| MmapSnafu { message: e.to_string() }.build())?;

        let mut buf = [0u8; 16];
        mmap.read_into(0, &mut buf)
            .map_err(|e| MmapSnafu { message: e.to_string() }.build())?;

        let segment = i64::from_le_bytes(buf[0..8].try_into().unwrap());
        let offset = i64::from_le_bytes(buf[8..16].try_into().unwrap()).max(0) as u64;

        Ok(Self { mmap, segment, offset })
    }

    /// Overwrite the stored cursor in place and refresh the in-memory copy.
    pub(crate) fn persist(&mut self, segment: i64, offset: u64) -> Result<()> {
        let mut buf = [0u8; 16];
        buf[0..8].copy_from_slice(&segment.to_le_bytes());
        buf[8..16].copy_from_slice(&(offset as i64).to_le_bytes());

        self.mmap
            .update_region(0, &buf)
            .map_err(|e| MmapSnafu { message: e.to_string() }.build())?;

        self.segment = segment;
        self.offset = offset;
        Ok(())
    }

    /// Segment index of the last delivered record, -1 if never read.
    pub(crate) const fn reading_segment(&self) -> i64 { self.segment }

    /// Byte offset just past the last delivered record.
    pub(crate) const fn reading_offset(&self) -> u64 { self.offset }

    /// Flush the mapping to disk.
    pub(crate) fn close(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| MmapSnafu { message: e.to_string() }.build())
    }
}
