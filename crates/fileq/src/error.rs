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

use snafu::Snafu;

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueueError {
    /// Filesystem I/O failure.
    #[snafu(context(false))]
    #[snafu(display("IO error"))]
    Io {
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// The queue was closed; no further records are accepted.
    #[snafu(display("queue is closed"))]
    Closed {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    /// Memory mapping operation failed.
    #[snafu(display("mmap operation failed: {message}"))]
    Mmap {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    /// A previous write segment was left with a length that is not a
    /// multiple of the block size. The store refuses to guess a repair for a
    /// segment it cannot prove was cleanly closed.
    #[snafu(display(
        "segment {} length {length} is not a multiple of block size {block_size}",
        path.display()
    ))]
    UnalignedSegment {
        path:       PathBuf,
        length:     u64,
        block_size: u64,
        #[snafu(implicit)]
        loc:        snafu::Location,
    },

    /// Invalid configuration value.
    #[snafu(display("invalid configuration: {message}"))]
    InvalidConfig {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    /// Payload encoding failed.
    #[snafu(display("failed to encode record: {message}"))]
    Encode {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    /// Payload decoding failed.
    #[snafu(display("failed to decode record: {message}"))]
    Decode {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
