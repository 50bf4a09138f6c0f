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

//! Segment lifecycle: rotation, startup recovery and reclamation.
//!
//! A queue's data lives in a sequence of segment files, each a contiguous run
//! of block groups (see [`crate::block`]). The store is split into two
//! halves so the write path and the read path can run concurrently under
//! their own locks:
//!
//! - [`SegmentWriter`] owns the open write segment. It rotates by size,
//!   seals each finished segment with an end-of-segment sentinel, and heals
//!   a misaligned segment left behind by a crashed append.
//! - [`SegmentReader`] owns the read segment, the read offset and the
//!   [`Checkpoint`]. It advances across segment boundaries and reclaims
//!   fully-consumed segments (delete, or move to the backup directory).
//!
//! Segments are created only by the writer in strictly increasing index
//! order; they are reclaimed only by the reader, and only when their index is
//! below the current write index — the segment being written is never
//! touched.

use std::{
    fs::{self, File, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use snafu::ensure;
use tracing::{debug, error, info, warn};

use crate::{
    Result, block,
    checkpoint::Checkpoint,
    config::QueueConfig,
    error::UnalignedSegmentSnafu,
    path::{max_segment_index, segment_file_name},
};

/// Subdirectory holding the segment files.
const DATA_DIRNAME: &str = "data";

/// Subdirectory receiving consumed segments when backup is enabled.
const BACKUP_DIRNAME: &str = "bak";

/// Subdirectory holding the checkpoint file.
const META_DIRNAME: &str = "meta";

/// State shared between the two store halves.
#[derive(Debug)]
struct StoreShared {
    data_dir:          PathBuf,
    bak_dir:           PathBuf,
    block_size:        usize,
    max_segment_size:  u64,
    backup_on_consume: bool,
    /// Pre-encoded end-of-segment sentinel group.
    end_block:         Vec<u8>,
    /// Index of the segment currently open for writing. Published by the
    /// writer, observed by the reader to tell a closed segment's end-of-file
    /// from writer lag on the live segment.
    writing_segment:   AtomicI64,
}

/// Open the store for `config`, recovering any previous state on disk.
///
/// Returns the writer and reader halves positioned per the recovery rules:
/// the writer on a fresh segment one past the highest existing index (the
/// previous write segment, if any, is verified block-aligned and sealed with
/// a sentinel), the reader at the checkpointed cursor.
pub(crate) fn open(config: &QueueConfig) -> Result<(SegmentWriter, SegmentReader)> {
    let queue_dir = config.base_dir.join(&config.name);
    let data_dir = queue_dir.join(DATA_DIRNAME);
    let bak_dir = queue_dir.join(BACKUP_DIRNAME);
    fs::create_dir_all(&data_dir)?;
    fs::create_dir_all(&bak_dir)?;

    let block_size = block::estimate_block_size(config.average_record_len);
    let end_block = block::encode(&block::END_OF_SEGMENT, block_size);

    let last_written = max_segment_index(&data_dir)?;
    if last_written >= 0 {
        seal_previous_segment(&data_dir, last_written, block_size, &end_block)?;
    }

    let writing_segment = last_written + 1;
    let write_path = data_dir.join(segment_file_name(writing_segment));
    let write_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&write_path)?;

    let checkpoint = Checkpoint::open(&queue_dir.join(META_DIRNAME))?;
    let mut read_segment = checkpoint.reading_segment();
    let mut read_offset = checkpoint.reading_offset();
    if read_segment < 0 {
        read_segment = 0;
        read_offset = 0;
    }
    if !data_dir.join(segment_file_name(read_segment)).exists() {
        // The checkpointed segment was already reclaimed; the read path
        // advances the index lazily once it starts consuming.
        read_offset = 0;
    }

    info!(
        data_dir = ?data_dir,
        block_size,
        writing_segment,
        read_segment,
        read_offset,
        "segment store opened"
    );

    let shared = Arc::new(StoreShared {
        data_dir,
        bak_dir,
        block_size,
        max_segment_size: config.max_segment_size,
        backup_on_consume: config.backup_on_consume,
        end_block,
        writing_segment: AtomicI64::new(writing_segment),
    });

    let writer = SegmentWriter {
        shared: Arc::clone(&shared),
        file:   write_file,
    };
    let reader = SegmentReader {
        shared,
        file: None,
        segment: read_segment,
        offset: read_offset,
        checkpoint,
    };

    Ok((writer, reader))
}

/// Seal the segment a previous process was writing.
///
/// Its length must be a multiple of the block size; anything else means a
/// partial block survived a crash, which the store treats as unrecoverable
/// rather than guessing a repair.
fn seal_previous_segment(
    data_dir: &std::path::Path,
    index: i64,
    block_size: usize,
    end_block: &[u8],
) -> Result<()> {
    let path = data_dir.join(segment_file_name(index));
    let length = fs::metadata(&path)?.len();
    ensure!(
        length % block_size as u64 == 0,
        UnalignedSegmentSnafu {
            path,
            length,
            block_size: block_size as u64
        }
    );

    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(end_block)?;
    debug!(segment = index, "sealed previous write segment");
    Ok(())
}

/// Write half of the store: owns the open write segment.
#[derive(Debug)]
pub(crate) struct SegmentWriter {
    shared: Arc<StoreShared>,
    file:   File,
}

impl SegmentWriter {
    /// Append one encoded payload as a block group, rotating first if the
    /// current segment is full or damaged.
    pub(crate) fn append(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Ok(());
        }

        let length = self.file.metadata()?.len();
        let block_size = self.shared.block_size as u64;
        if length % block_size != 0 {
            // A crashed append in this process (e.g. disk full) left a
            // partial block. Seal the stream at the next boundary so the
            // reader resynchronizes past the gap, then roll.
            error!(
                length,
                block_size, "write segment left unaligned, sealing and rolling"
            );
            let boundary = (length / block_size + 1) * block_size;
            self.file.seek(SeekFrom::Start(boundary))?;
            self.file.write_all(&self.shared.end_block)?;
            self.open_next_segment()?;
        } else if length >= self.shared.max_segment_size {
            self.roll()?;
        }

        let group = block::encode(payload, self.shared.block_size);
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&group)?;
        Ok(())
    }

    /// Seal the current segment with the sentinel and open the next one.
    fn roll(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&self.shared.end_block)?;
        self.open_next_segment()
    }

    fn open_next_segment(&mut self) -> Result<()> {
        let next = self.shared.writing_segment.load(Ordering::Acquire) + 1;
        let path = self.shared.data_dir.join(segment_file_name(next));
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        // Publish only once the file exists so the reader never advances
        // onto a segment that is not there yet.
        self.shared.writing_segment.store(next, Ordering::Release);
        debug!(segment = next, "rolled to new write segment");
        Ok(())
    }

    /// Index of the segment currently open for writing.
    pub(crate) fn writing_segment(&self) -> i64 {
        self.shared.writing_segment.load(Ordering::Acquire)
    }

    /// Flush buffered data to disk.
    pub(crate) fn close(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Read half of the store: owns the read cursor and the checkpoint.
#[derive(Debug)]
pub(crate) struct SegmentReader {
    shared:     Arc<StoreShared>,
    file:       Option<File>,
    segment:    i64,
    offset:     u64,
    checkpoint: Checkpoint,
}

impl SegmentReader {
    /// Read the next record, crossing segment boundaries as needed.
    ///
    /// Returns `Ok(None)` when the queue is currently empty — which includes
    /// a record the writer has not finished flushing. Every successfully
    /// returned record has already been checkpointed.
    pub(crate) fn read_next(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if !self.ensure_file()? {
                return Ok(None);
            }

            let outcome = {
                let Some(file) = self.file.as_mut() else {
                    return Ok(None);
                };
                block::read_group(file, self.shared.block_size)?
            };

            match outcome {
                Some((payload, end_offset)) => {
                    if payload == block::END_OF_SEGMENT {
                        if !self.advance()? {
                            return Ok(None);
                        }
                        continue;
                    }

                    self.offset = end_offset;
                    self.checkpoint.persist(self.segment, self.offset)?;
                    return Ok(Some(payload));
                }
                None => {
                    // "Incomplete" on a segment below the write index can
                    // only mean end-of-file: the writer sealed it and moved
                    // on. On the live segment it means nothing has arrived
                    // yet (or a record is mid-flush).
                    if self.segment < self.shared.writing_segment.load(Ordering::Acquire) {
                        if !self.advance()? {
                            return Ok(None);
                        }
                        continue;
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Make sure the current read segment is open, lazily skipping indices
    /// whose files were already reclaimed in an earlier run.
    fn ensure_file(&mut self) -> Result<bool> {
        while self.file.is_none() {
            let path = self.shared.data_dir.join(segment_file_name(self.segment));
            match File::open(&path) {
                Ok(mut file) => {
                    if self.offset > 0 {
                        file.seek(SeekFrom::Start(self.offset))?;
                    }
                    self.file = Some(file);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if self.segment >= self.shared.writing_segment.load(Ordering::Acquire) {
                        return Ok(false);
                    }
                    warn!(segment = self.segment, "read segment missing, skipping");
                    self.segment += 1;
                    self.offset = 0;
                    self.checkpoint.persist(self.segment, 0)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    /// Close the current read segment, reclaim it and move to the next one.
    ///
    /// Never crosses onto the segment currently being written.
    fn advance(&mut self) -> Result<bool> {
        if self.segment >= self.shared.writing_segment.load(Ordering::Acquire) {
            return Ok(false);
        }

        self.file = None;
        self.reclaim_consumed();

        self.segment += 1;
        self.offset = 0;
        self.checkpoint.persist(self.segment, 0)?;
        Ok(true)
    }

    /// Delete or back up the fully-consumed segment. Failures are logged and
    /// swallowed: forward progress takes priority over tidiness.
    fn reclaim_consumed(&self) {
        let name = segment_file_name(self.segment);
        let path = self.shared.data_dir.join(&name);

        if self.shared.backup_on_consume {
            let target = self.shared.bak_dir.join(&name);
            if let Err(e) = fs::rename(&path, &target) {
                warn!(path = ?path, target = ?target, error = %e, "failed to back up consumed segment");
            } else {
                debug!(path = ?path, "moved consumed segment to backup");
            }
        } else if let Err(e) = fs::remove_file(&path) {
            warn!(path = ?path, error = %e, "failed to delete consumed segment");
        } else {
            debug!(path = ?path, "deleted consumed segment");
        }
    }

    /// Index of the segment currently being read.
    pub(crate) const fn reading_segment(&self) -> i64 { self.segment }

    /// Byte offset just past the last delivered record.
    pub(crate) const fn reading_offset(&self) -> u64 { self.offset }

    /// Drop the read handle and flush the checkpoint.
    pub(crate) fn close(&mut self) -> Result<()> {
        self.file = None;
        self.checkpoint.close()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn test_config(base_dir: &std::path::Path) -> QueueConfig {
        QueueConfig {
            name: "store-test".to_string(),
            base_dir: base_dir.to_path_buf(),
            average_record_len: 12,
            max_segment_size: 1024 * 1024,
            backup_on_consume: false,
        }
    }

    fn data_dir(config: &QueueConfig) -> PathBuf {
        config.base_dir.join(&config.name).join(DATA_DIRNAME)
    }

    fn segment_count(config: &QueueConfig) -> usize {
        fs::read_dir(data_dir(config)).unwrap().count()
    }

    #[test]
    fn test_open_fresh_store() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        let (writer, reader) = open(&config).unwrap();

        assert_eq!(writer.writing_segment(), 0);
        assert_eq!(reader.reading_segment(), 0);
        assert_eq!(reader.reading_offset(), 0);
        assert!(data_dir(&config).join(segment_file_name(0)).exists());
    }

    #[test]
    fn test_append_and_read_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let (mut writer, mut reader) = open(&config).unwrap();

        for i in 0..20 {
            writer.append(format!("record-{i:02}").as_bytes()).unwrap();
        }

        for i in 0..20 {
            let payload = reader.read_next().unwrap().unwrap();
            assert_eq!(payload, format!("record-{i:02}").as_bytes());
        }
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_empty_store_reads_none() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let (_writer, mut reader) = open(&config).unwrap();

        assert!(reader.read_next().unwrap().is_none());
        assert_eq!(reader.reading_offset(), 0);
    }

    #[test]
    fn test_rotation_by_size() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(temp_dir.path());
        config.max_segment_size = 200; // a handful of 40-byte groups each

        let (mut writer, _reader) = open(&config).unwrap();
        for i in 0..30 {
            writer.append(format!("record-{i:02}").as_bytes()).unwrap();
        }

        assert!(writer.writing_segment() >= 2, "expected at least 3 segments");
    }

    #[test]
    fn test_rotation_reclaims_consumed_segments() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(temp_dir.path());
        config.max_segment_size = 200;

        let (mut writer, mut reader) = open(&config).unwrap();
        for i in 0..30 {
            writer.append(format!("record-{i:02}").as_bytes()).unwrap();
        }

        for i in 0..30 {
            let payload = reader.read_next().unwrap().unwrap();
            assert_eq!(payload, format!("record-{i:02}").as_bytes());
        }
        assert!(reader.read_next().unwrap().is_none());

        // Everything below the write segment was consumed and deleted.
        assert_eq!(reader.reading_segment(), writer.writing_segment());
        assert_eq!(segment_count(&config), 1);
    }

    #[test]
    fn test_backup_on_consume_moves_segments() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(temp_dir.path());
        config.max_segment_size = 200;
        config.backup_on_consume = true;

        let (mut writer, mut reader) = open(&config).unwrap();
        for i in 0..30 {
            writer.append(format!("record-{i:02}").as_bytes()).unwrap();
        }
        while reader.read_next().unwrap().is_some() {}

        let bak_dir = config.base_dir.join(&config.name).join(BACKUP_DIRNAME);
        let backed_up = fs::read_dir(&bak_dir).unwrap().count();
        assert!(backed_up >= 2, "consumed segments should land in bak/");
        assert_eq!(segment_count(&config), 1);
    }

    #[test]
    fn test_reopen_seals_previous_segment_and_resumes() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        {
            let (mut writer, mut reader) = open(&config).unwrap();
            for i in 0..10 {
                writer.append(format!("record-{i:02}").as_bytes()).unwrap();
            }
            for i in 0..5 {
                let payload = reader.read_next().unwrap().unwrap();
                assert_eq!(payload, format!("record-{i:02}").as_bytes());
            }
            writer.close().unwrap();
            reader.close().unwrap();
        }

        let (writer, mut reader) = open(&config).unwrap();
        assert_eq!(writer.writing_segment(), 1);

        for i in 5..10 {
            let payload = reader.read_next().unwrap().unwrap();
            assert_eq!(payload, format!("record-{i:02}").as_bytes());
        }
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_unaligned_previous_segment_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        let dir = data_dir(&config);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(segment_file_name(0)), [0u8; 21]).unwrap();

        let err = open(&config).unwrap_err();
        assert!(matches!(
            err,
            crate::QueueError::UnalignedSegment { length: 21, .. }
        ));
    }

    #[test]
    fn test_missing_read_segment_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(temp_dir.path());
        config.max_segment_size = 200;

        {
            let (mut writer, mut reader) = open(&config).unwrap();
            for i in 0..10 {
                writer.append(format!("record-{i:02}").as_bytes()).unwrap();
            }
            for _ in 0..2 {
                reader.read_next().unwrap().unwrap();
            }
            writer.close().unwrap();
            reader.close().unwrap();
        }

        // Segment 0 vanishes out from under the checkpoint, which still
        // points into it.
        fs::remove_file(data_dir(&config).join(segment_file_name(0))).unwrap();

        let (_writer, mut reader) = open(&config).unwrap();

        // The reader skips the missing index and resumes on the next
        // surviving segment.
        assert_eq!(reader.read_next().unwrap().unwrap(), b"record-05");
        for i in 6..10 {
            let payload = reader.read_next().unwrap().unwrap();
            assert_eq!(payload, format!("record-{i:02}").as_bytes());
        }
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_torn_tail_on_live_segment_reads_none() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let (mut writer, mut reader) = open(&config).unwrap();

        writer.append(b"whole").unwrap();
        assert_eq!(reader.read_next().unwrap().unwrap(), b"whole");

        // Truncate a half-written group onto the live segment by hand.
        let block_size = block::estimate_block_size(config.average_record_len);
        let group = block::encode(&[0x33; 100], block_size);
        let path = data_dir(&config).join(segment_file_name(0));
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&group[..block_size]).unwrap();

        let before = reader.reading_offset();
        assert!(reader.read_next().unwrap().is_none());
        assert_eq!(reader.reading_offset(), before);

        // The rest of the group arrives; the record becomes readable.
        file.write_all(&group[block_size..]).unwrap();
        assert_eq!(reader.read_next().unwrap().unwrap(), vec![0x33; 100]);
    }
}
