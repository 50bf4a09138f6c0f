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

//! Pluggable payload serializers.
//!
//! The queue stores opaque byte payloads; a [`Codec`] turns application
//! values into those payloads and back. Two implementations ship with the
//! crate:
//!
//! - [`BincodeCodec`]: generic serde-based serialization, the default choice
//!   for arbitrary value types
//! - [`BytesCodec`]: pass-through for callers that already hold raw bytes

use std::marker::PhantomData;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    Result,
    error::{DecodeSnafu, EncodeSnafu},
};

/// Serializes queue values to byte payloads and back.
///
/// Implementations must be `Send + Sync`: a codec is shared between the
/// producer and consumer sections of a queue.
pub trait Codec: Send + Sync {
    /// The application value type carried by the queue.
    type Item;

    /// Encode a value into its byte payload.
    fn encode(&self, item: &Self::Item) -> Result<Vec<u8>>;

    /// Decode a byte payload back into a value.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Item>;
}

/// Generic serde codec using bincode's standard configuration.
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self { Self::new() }
}

impl<T> Clone for BincodeCodec<T> {
    fn clone(&self) -> Self { Self::new() }
}

impl<T> std::fmt::Debug for BincodeCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BincodeCodec")
    }
}

impl<T> Codec for BincodeCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type Item = T;

    fn encode(&self, item: &T) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(item, bincode::config::standard())
            .map_err(|e| EncodeSnafu { message: e.to_string() }.build())
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        let (item, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| DecodeSnafu { message: e.to_string() }.build())?;
        Ok(item)
    }
}

/// Pass-through codec for raw byte payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec for BytesCodec {
    type Item = Bytes;

    fn encode(&self, item: &Bytes) -> Result<Vec<u8>> { Ok(item.to_vec()) }

    fn decode(&self, bytes: &[u8]) -> Result<Bytes> { Ok(Bytes::copy_from_slice(bytes)) }
}
