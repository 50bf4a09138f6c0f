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

//! The queue front: concurrency, blocking semantics and lifecycle.
//!
//! [`FileQueue`] layers two critical sections over the segment store: a
//! write section serializing all `add` calls and a read section serializing
//! all `get`/`poll` calls. The two sections never block each other, so one
//! producer and one consumer make progress concurrently, while producers
//! never race producers (nor consumers consumers) on the shared cursors.
//!
//! ## Usage
//!
//! ```ignore
//! let queue = QueueBuilder::new("/var/lib/myapp")
//!     .name("events")
//!     .build(BincodeCodec::<Event>::new())?;
//!
//! queue.add(&event)?;
//!
//! while let Some(event) = queue.get_timeout(Duration::from_secs(1))? {
//!     process(event);
//! }
//!
//! queue.close()?;
//! ```
//!
//! ## Blocking reads
//!
//! An empty read is ambiguous: the queue may be drained, or the writer may
//! not have finished flushing the current record. Blocking reads therefore
//! poll with a short sleep instead of waiting on a wake signal, trading a
//! little latency for simplicity. The wait is aborted promptly when the
//! queue is closed.

use std::{
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use snafu::ensure;
use tracing::info;

use crate::{
    Codec, QueueConfig, Result,
    error::ClosedSnafu,
    store::{self, SegmentReader, SegmentWriter},
};

/// Sleep between attempts while a blocking read waits for data.
const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// A crash-durable FIFO queue of `C::Item` values.
///
/// Records are delivered at least once: a crash between the checkpoint
/// update and the consumer acting on a record can redeliver it after
/// restart. All methods take `&self`; the queue is shared between threads
/// directly or behind an `Arc`.
#[derive(Debug)]
pub struct FileQueue<C: Codec> {
    codec:  C,
    closed: AtomicBool,
    writer: Mutex<SegmentWriter>,
    reader: Mutex<SegmentReader>,
}

impl<C: Codec> FileQueue<C> {
    /// Open the queue described by `config`, recovering on-disk state.
    pub(crate) fn open(config: QueueConfig, codec: C) -> Result<Self> {
        let (writer, reader) = store::open(&config)?;
        info!(name = %config.name, base_dir = ?config.base_dir, "file queue opened");

        Ok(Self {
            codec,
            closed: AtomicBool::new(false),
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    /// Append one record to the queue.
    ///
    /// # Errors
    ///
    /// Fails with [`QueueError::Closed`](crate::QueueError::Closed) after
    /// [`close`](Self::close), or with an I/O error from the underlying
    /// segment write (which may include a segment rotation).
    pub fn add(&self, item: &C::Item) -> Result<()> {
        let mut writer = lock(&self.writer);
        ensure!(!self.closed.load(Ordering::SeqCst), ClosedSnafu);

        let payload = self.codec.encode(item)?;
        writer.append(&payload)
    }

    /// Take the next record, blocking until one is available.
    ///
    /// # Errors
    ///
    /// Fails with `Closed` if the queue is closed before or while waiting,
    /// or with an I/O error from the read path.
    pub fn get(&self) -> Result<C::Item> {
        let mut reader = lock(&self.reader);
        loop {
            ensure!(!self.closed.load(Ordering::SeqCst), ClosedSnafu);
            if let Some(payload) = reader.read_next()? {
                return self.codec.decode(&payload);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Take the next record, blocking for at most `timeout`.
    ///
    /// Returns `Ok(None)` when the timeout elapses with nothing available.
    /// The bound is a best-effort wall-clock comparison: a slow disk can
    /// overrun it by the cost of one I/O operation.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Option<C::Item>> {
        let start = Instant::now();
        let mut reader = lock(&self.reader);
        loop {
            ensure!(!self.closed.load(Ordering::SeqCst), ClosedSnafu);
            if let Some(payload) = reader.read_next()? {
                return self.codec.decode(&payload).map(Some);
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Take the next record if one is immediately available.
    ///
    /// A single attempt: returns `Ok(None)` when the queue is empty or the
    /// writer has not finished flushing the current record.
    pub fn poll(&self) -> Result<Option<C::Item>> {
        let mut reader = lock(&self.reader);
        ensure!(!self.closed.load(Ordering::SeqCst), ClosedSnafu);

        match reader.read_next()? {
            Some(payload) => self.codec.decode(&payload).map(Some),
            None => Ok(None),
        }
    }

    /// Close the queue.
    ///
    /// Marks the queue closed (which aborts any blocked reader), then waits
    /// for in-flight operations by taking both section locks and tears down
    /// the store. Both halves are always closed even if one fails; the
    /// first error is surfaced.
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);

        let mut writer = lock(&self.writer);
        let mut reader = lock(&self.reader);

        let write_result = writer.close();
        let read_result = reader.close();
        info!("file queue closed");

        write_result.and(read_result)
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }

    /// Index of the segment currently being read.
    #[must_use]
    pub fn reading_segment(&self) -> i64 { lock(&self.reader).reading_segment() }

    /// Byte offset just past the last delivered record.
    #[must_use]
    pub fn reading_offset(&self) -> u64 { lock(&self.reader).reading_offset() }

    /// Index of the segment currently being written.
    #[must_use]
    pub fn writing_segment(&self) -> i64 { lock(&self.writer).writing_segment() }
}

impl<C: Codec> Drop for FileQueue<C> {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            let _ = self.close();
        }
    }
}

/// A poisoned section lock only means another thread panicked mid-operation;
/// the store's on-disk state stays consistent, so the lock is recovered.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
