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

//! Block-group framing and on-disk record format.
//!
//! Every record is stored as one *block group*: a run of fixed-size blocks
//! holding a self-describing frame, zero-padded to the next block boundary.
//!
//! ```text
//! ┌──────────────┬────────────────────┬─────────────────────┬───────────────┐
//! │  MAGIC (4B)  │   LENGTH (4B)      │  PAYLOAD (variable) │  SHA-1 (20B)  │
//! │  AA AA AA AB │   big-endian u32   │  raw bytes          │  of PAYLOAD   │
//! └──────────────┴────────────────────┴─────────────────────┴───────────────┘
//! ```
//!
//! - **LENGTH** is `payload length + 20` (payload plus checksum)
//! - the group occupies `ceil(total / block_size) * block_size` bytes and
//!   always starts at a multiple of `block_size` within its segment
//!
//! ## Resynchronization
//!
//! [`read_group`] validates the magic and the checksum of every candidate
//! group. A magic mismatch rescans four bytes further (so a partial magic
//! match cannot hide a real header); a checksum mismatch condemns exactly one
//! block and rescans. A torn tail (fewer bytes on disk than the group claims)
//! is reported as "incomplete" with the cursor restored, because the writer
//! may still be mid-append. At worst one damaged block's worth of blocks is
//! lost, never the remainder of the file.
//!
//! A segment's end is marked by a group whose payload is
//! [`END_OF_SEGMENT`]. A real payload that decodes to those exact eight bytes
//! would be misread as end-of-segment; this is a documented limitation of the
//! wire format.

use std::io::{Read, Seek, SeekFrom};

use sha1::{Digest, Sha1};

use crate::Result;

/// Magic bytes opening every block group.
pub(crate) const BLOCK_MAGIC: [u8; 4] = [0xAA, 0xAA, 0xAA, 0xAB];

/// Size of the magic header in bytes.
pub(crate) const MAGIC_LEN: usize = 4;

/// Size of the big-endian length field in bytes.
pub(crate) const LENGTH_LEN: usize = 4;

/// Size of the SHA-1 payload checksum in bytes.
pub(crate) const CHECKSUM_LEN: usize = 20;

/// Reserved payload marking the end of a segment's valid data.
pub(crate) const END_OF_SEGMENT: [u8; 8] = [0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAB];

/// Derive the physical block size from the configured average record length.
///
/// The result always covers the fixed framing overhead, so a single
/// average-sized record fits into one block.
pub(crate) const fn estimate_block_size(avg_record_len: usize) -> usize {
    effective_block_size(MAGIC_LEN + LENGTH_LEN + avg_record_len + CHECKSUM_LEN)
}

/// Enlarge a block size that would not even hold the fixed overhead.
///
/// Callers supplying a too-small size get a usable one instead of a
/// zero-capacity block.
pub(crate) const fn effective_block_size(block_size: usize) -> usize {
    if block_size <= MAGIC_LEN + CHECKSUM_LEN {
        MAGIC_LEN + block_size + CHECKSUM_LEN
    } else {
        block_size
    }
}

/// Number of blocks needed for a frame whose LENGTH field is
/// `content_and_checksum_len`.
const fn group_block_count(content_and_checksum_len: usize, block_size: usize) -> usize {
    (MAGIC_LEN + LENGTH_LEN + content_and_checksum_len).div_ceil(block_size)
}

/// Encode one payload into a zero-padded block group.
///
/// Pure function, no I/O. The returned buffer length is a multiple of the
/// (effective) block size.
pub(crate) fn encode(payload: &[u8], block_size: usize) -> Vec<u8> {
    let block_size = effective_block_size(block_size);
    let content_and_checksum_len = payload.len() + CHECKSUM_LEN;
    let blocks = group_block_count(content_and_checksum_len, block_size);

    let mut group = vec![0u8; blocks * block_size];
    group[..MAGIC_LEN].copy_from_slice(&BLOCK_MAGIC);
    group[MAGIC_LEN..MAGIC_LEN + LENGTH_LEN]
        .copy_from_slice(&(content_and_checksum_len as u32).to_be_bytes());

    let payload_start = MAGIC_LEN + LENGTH_LEN;
    group[payload_start..payload_start + payload.len()].copy_from_slice(payload);
    group[payload_start + payload.len()..payload_start + content_and_checksum_len]
        .copy_from_slice(&Sha1::digest(payload));

    group
}

/// Read the next valid block group from `file`, which must be positioned at
/// a block boundary.
///
/// Returns `Ok(Some((payload, end_offset)))` on success, with the cursor left
/// at `end_offset` (the block boundary after the group). Returns `Ok(None)`
/// when the remaining bytes cannot hold a complete group — the cursor is
/// restored to the start of the unconsumed region so a later call can retry
/// once the writer has finished flushing.
///
/// Corrupted regions (bad magic, bad checksum) are skipped silently.
pub(crate) fn read_group<F: Read + Seek>(
    file: &mut F,
    block_size: usize,
) -> Result<Option<(Vec<u8>, u64)>> {
    let block_size = effective_block_size(block_size);

    let mut pos = file.stream_position()?;
    let len = file.seek(SeekFrom::End(0))?;

    let mut block = vec![0u8; block_size];
    loop {
        if len.saturating_sub(pos) < block_size as u64 {
            file.seek(SeekFrom::Start(pos))?;
            return Ok(None);
        }

        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut block)?;

        if block[..MAGIC_LEN] != BLOCK_MAGIC {
            // Partial magic match: rescan four bytes further, not a full
            // block, so a header straddling the scan point is still found.
            pos += MAGIC_LEN as u64;
            continue;
        }

        let content_and_checksum_len =
            u32::from_be_bytes(block[MAGIC_LEN..MAGIC_LEN + LENGTH_LEN].try_into().unwrap())
                as usize;
        if content_and_checksum_len < CHECKSUM_LEN {
            // A frame cannot be smaller than its checksum; the magic was a
            // coincidence in garbage data.
            pos += block_size as u64;
            continue;
        }

        let total_blocks = group_block_count(content_and_checksum_len, block_size);
        let group_end = pos + (total_blocks * block_size) as u64;
        if group_end > len {
            // The trailing blocks are not on disk yet; a writer may still be
            // mid-append. Do not advance.
            file.seek(SeekFrom::Start(pos))?;
            return Ok(None);
        }

        let mut group = Vec::with_capacity(total_blocks * block_size);
        group.extend_from_slice(&block);
        for _ in 1..total_blocks {
            file.read_exact(&mut block)?;
            group.extend_from_slice(&block);
        }

        let payload_start = MAGIC_LEN + LENGTH_LEN;
        let payload_end = payload_start + content_and_checksum_len - CHECKSUM_LEN;
        let payload = &group[payload_start..payload_end];
        let stored_checksum = &group[payload_end..payload_end + CHECKSUM_LEN];

        if Sha1::digest(payload).as_slice() == stored_checksum {
            // The sequential block reads have left the cursor at group_end.
            return Ok(Some((payload.to_vec(), group_end)));
        }

        // The header was a false positive (data that coincidentally starts
        // with the magic). Condemn exactly one block and rescan.
        pos += block_size as u64;
    }
}
