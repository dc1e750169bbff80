use async_trait::async_trait;
use mandate_common::{ConditionalSend, ConditionalSync};
use serde::{Serialize, de::DeserializeOwned};

use crate::StorageError;

mod memory;
pub use memory::*;

#[cfg(not(target_arch = "wasm32"))]
mod fs;
#[cfg(not(target_arch = "wasm32"))]
pub use fs::*;

/// A [StorageBackend] is a facade over some generalized storage substrate that
/// is capable of storing and/or retrieving values by some key
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait StorageBackend: Clone {
    /// The key type used by this [StorageBackend]
    type Key: ConditionalSync;
    /// The value type able to be stored by this [StorageBackend]
    type Value: ConditionalSend;
    /// The error type produced by this [StorageBackend]
    type Error: Into<StorageError>;

    /// Store the given value against the given key
    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error>;
    /// Retrieve a value (if any) stored against the given key
    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error>;
}

/// A single dag-cbor document stored in a [StorageBackend] under a profile
/// name.
#[derive(Clone, Debug)]
pub struct ProfileStore<Backend> {
    backend: Backend,
    name: String,
}

impl<Backend> ProfileStore<Backend>
where
    Backend: StorageBackend<Key = Vec<u8>, Value = Vec<u8>>,
{
    /// Addresses the profile `name` inside `backend`.
    pub fn new(backend: Backend, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
        }
    }

    /// The profile name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads and decodes the profile, if one has been saved.
    pub async fn load<T>(&self) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned,
    {
        let Some(bytes) = self
            .backend
            .get(&self.name.as_bytes().to_vec())
            .await
            .map_err(Into::<StorageError>::into)?
        else {
            return Ok(None);
        };
        serde_ipld_dagcbor::from_slice(&bytes)
            .map(Some)
            .map_err(|error| StorageError::DecodeFailed(format!("{error}")))
    }

    /// Encodes and writes the profile, replacing any previous version.
    pub async fn save<T>(&mut self, value: &T) -> Result<(), StorageError>
    where
        T: Serialize,
    {
        let bytes = serde_ipld_dagcbor::to_vec(value)
            .map_err(|error| StorageError::EncodeFailed(format!("{error}")))?;
        tracing::debug!(profile = %self.name, size = bytes.len(), "saving profile");
        self.backend
            .set(self.name.as_bytes().to_vec(), bytes)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use async_trait::async_trait;

    use super::{MemoryStorageBackend, StorageBackend};
    use crate::StorageError;

    /// A memory backend whose writes can be switched off.
    #[derive(Clone, Default, Debug)]
    pub(crate) struct SwitchableStorageBackend {
        inner: MemoryStorageBackend<Vec<u8>, Vec<u8>>,
        read_only: Arc<AtomicBool>,
    }

    impl SwitchableStorageBackend {
        pub(crate) fn set_read_only(&self, read_only: bool) {
            self.read_only.store(read_only, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StorageBackend for SwitchableStorageBackend {
        type Key = Vec<u8>;
        type Value = Vec<u8>;
        type Error = StorageError;

        async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
            if self.read_only.load(Ordering::SeqCst) {
                return Err(StorageError::StorageBackend("read-only".into()));
            }
            self.inner.set(key, value).await
        }

        async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
            self.inner.get(key).await
        }
    }
}
