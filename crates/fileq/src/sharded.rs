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

//! Round-robin fan-out over N independent queues.
//!
//! A [`ShardedQueue`] spreads load across several [`FileQueue`] instances
//! named `<name>_<shard>`, each with its own directory, cursors and locks.
//! The only shared state is a pair of atomic counters used to pick the next
//! shard; FIFO order holds per shard, not across shards.

use std::sync::atomic::{AtomicUsize, Ordering};

use snafu::ensure;

use crate::{Codec, FileQueue, QueueConfig, Result, error::InvalidConfigSnafu};

/// N independent queues behind one round-robin front.
#[derive(Debug)]
pub struct ShardedQueue<C: Codec> {
    shards:       Vec<FileQueue<C>>,
    write_cursor: AtomicUsize,
    read_cursor:  AtomicUsize,
}

impl<C: Codec + Clone> ShardedQueue<C> {
    /// Open `shards` queues under `config`'s name, suffixed by shard index.
    pub(crate) fn open(config: QueueConfig, shards: usize, codec: C) -> Result<Self> {
        ensure!(
            shards > 0,
            InvalidConfigSnafu {
                message: "shard count must be greater than zero",
            }
        );

        let mut queues = Vec::with_capacity(shards);
        for shard in 0..shards {
            let mut shard_config = config.clone();
            shard_config.name = format!("{}_{shard}", config.name);
            queues.push(FileQueue::open(shard_config, codec.clone())?);
        }

        Ok(Self {
            shards:       queues,
            write_cursor: AtomicUsize::new(0),
            read_cursor:  AtomicUsize::new(0),
        })
    }
}

impl<C: Codec> ShardedQueue<C> {
    /// Append one record to the next shard in round-robin order.
    pub fn add(&self, item: &C::Item) -> Result<()> {
        let index = self.write_cursor.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        self.shards[index].add(item)
    }

    /// Try each shard once, starting from the read cursor; `Ok(None)` when
    /// every shard is currently empty.
    pub fn poll(&self) -> Result<Option<C::Item>> {
        for _ in 0..self.shards.len() {
            let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.shards.len();
            if let Some(item) = self.shards[index].poll()? {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    /// Close every shard. All shards are attempted; the first error is
    /// surfaced.
    pub fn close(&self) -> Result<()> {
        let mut result = Ok(());
        for shard in &self.shards {
            if let Err(e) = shard.close()
                && result.is_ok()
            {
                result = Err(e);
            }
        }
        result
    }

    /// Number of shards behind this queue.
    #[must_use]
    pub fn shard_count(&self) -> usize { self.shards.len() }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{BincodeCodec, QueueBuilder, QueueError};

    fn sharded(dir: &TempDir, shards: usize) -> ShardedQueue<BincodeCodec<u32>> {
        QueueBuilder::new(dir.path())
            .name("fanout")
            .average_record_len(8)
            .build_sharded(shards, BincodeCodec::new())
            .unwrap()
    }

    #[test]
    fn test_zero_shards_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let result = QueueBuilder::new(temp_dir.path())
            .build_sharded(0, BincodeCodec::<u32>::new());

        assert!(matches!(
            result.unwrap_err(),
            QueueError::InvalidConfig { .. }
        ));
    }

    #[test]
    fn test_shard_directories_are_created() {
        let temp_dir = TempDir::new().unwrap();
        let queue = sharded(&temp_dir, 3);

        assert_eq!(queue.shard_count(), 3);
        for shard in 0..3 {
            assert!(temp_dir.path().join(format!("fanout_{shard}")).is_dir());
        }
        queue.close().unwrap();
    }

    #[test]
    fn test_add_round_robins_across_shards() {
        let temp_dir = TempDir::new().unwrap();
        let queue = sharded(&temp_dir, 2);

        for value in 0..4u32 {
            queue.add(&value).unwrap();
        }

        // Writes alternate shards, so each shard drains in its own order.
        assert_eq!(queue.shards[0].poll().unwrap(), Some(0));
        assert_eq!(queue.shards[0].poll().unwrap(), Some(2));
        assert_eq!(queue.shards[1].poll().unwrap(), Some(1));
        assert_eq!(queue.shards[1].poll().unwrap(), Some(3));
        queue.close().unwrap();
    }

    #[test]
    fn test_poll_drains_every_shard() {
        let temp_dir = TempDir::new().unwrap();
        let queue = sharded(&temp_dir, 3);

        for value in 0..9u32 {
            queue.add(&value).unwrap();
        }

        let mut drained = Vec::new();
        while let Some(value) = queue.poll().unwrap() {
            drained.push(value);
        }

        drained.sort_unstable();
        assert_eq!(drained, (0..9).collect::<Vec<_>>());
        queue.close().unwrap();
    }

    #[test]
    fn test_close_closes_every_shard() {
        let temp_dir = TempDir::new().unwrap();
        let queue = sharded(&temp_dir, 2);

        queue.close().unwrap();
        assert!(matches!(
            queue.add(&1).unwrap_err(),
            QueueError::Closed { .. }
        ));
    }
}
