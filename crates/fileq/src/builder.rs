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

use std::path::PathBuf;

use snafu::ensure;

use crate::{
    Codec, FileQueue, QueueConfig, Result, ShardedQueue, error::InvalidConfigSnafu,
};

pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            config: QueueConfig {
                base_dir: base_dir.into(),
                ..Default::default()
            },
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    #[must_use]
    pub fn average_record_len(mut self, len: usize) -> Self {
        self.config.average_record_len = len;
        self
    }

    #[must_use]
    pub fn max_segment_size(mut self, bytes: u64) -> Self {
        self.config.max_segment_size = bytes;
        self
    }

    #[must_use]
    pub fn backup_on_consume(mut self, backup: bool) -> Self {
        self.config.backup_on_consume = backup;
        self
    }

    /// Open the queue with the given payload codec.
    pub fn build<C: Codec>(self, codec: C) -> Result<FileQueue<C>> {
        self.validate()?;
        FileQueue::open(self.config, codec)
    }

    /// Open `shards` independent queues fanned out under this queue's name.
    pub fn build_sharded<C: Codec + Clone>(self, shards: usize, codec: C) -> Result<ShardedQueue<C>> {
        self.validate()?;
        ShardedQueue::open(self.config, shards, codec)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.config.average_record_len > 0,
            InvalidConfigSnafu {
                message: "average_record_len must be greater than zero",
            }
        );
        Ok(())
    }
}
