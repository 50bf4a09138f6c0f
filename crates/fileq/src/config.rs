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

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue identity; becomes the directory name under `base_dir`.
    pub name:               String,
    /// Storage root. Each named queue lives in its own subdirectory.
    pub base_dir:           PathBuf,
    /// Estimated average record length in bytes; fixes the physical block
    /// size for the life of the store. Must be greater than zero.
    pub average_record_len: usize,
    /// Size threshold at which the write segment rolls over, in bytes.
    pub max_segment_size:   u64,
    /// Move fully-consumed segments into the backup directory instead of
    /// deleting them.
    pub backup_on_consume:  bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name:               "default".to_string(),
            base_dir:           PathBuf::from("./fileq"),
            average_record_len: 1024,
            max_segment_size:   100 * 1024 * 1024,
            backup_on_consume:  false,
        }
    }
}
