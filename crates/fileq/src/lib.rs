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

//! Crash-durable persistent FIFO queue backed by a segmented block log.
//!
//! Producers append serialized records, consumers take them in order, and
//! the queue survives process restarts: records are framed into
//! checksummed block groups inside rolling segment files, consumption
//! progress is checkpointed to a memory-mapped cursor file, and the reader
//! resynchronizes past corrupted regions instead of giving up on a file.
//! Delivery is at least once.

mod block;
mod builder;
mod checkpoint;
mod codec;
mod config;
mod error;
mod path;
mod queue;
mod sharded;
mod store;

pub use builder::QueueBuilder;
pub use codec::{BincodeCodec, BytesCodec, Codec};
pub use config::QueueConfig;
pub use error::{QueueError, Result};
pub use queue::FileQueue;
pub use sharded::ShardedQueue;
