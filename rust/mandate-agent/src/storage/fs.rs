use async_trait::async_trait;
use base58::ToBase58;
use mandate_common::ConditionalSync;
use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use crate::StorageError;

use super::StorageBackend;

/// A basic file-system-based [StorageBackend] implementation. All values are
/// stored inside a root directory as files named after their (base58-encoded)
/// keys.
#[derive(Clone, Debug)]
pub struct FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone,
    Value: AsRef<[u8]> + From<Vec<u8>> + Clone,
{
    root_dir: PathBuf,
    key_type: PhantomData<Key>,
    value_type: PhantomData<Value>,
}

impl<Key, Value> FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone,
    Value: AsRef<[u8]> + From<Vec<u8>> + Clone,
{
    /// Creates a new [`FileSystemStorageBackend`] that stores files in
    /// `root_dir`.
    pub async fn new<Pathlike>(root_dir: Pathlike) -> Result<Self, StorageError>
    where
        Pathlike: AsRef<Path>,
    {
        let root_dir = root_dir.as_ref().to_owned();
        tokio::fs::create_dir_all(&root_dir)
            .await
            .map_err(|error| StorageError::StorageBackend(format!("{error}")))?;
        Ok(Self {
            root_dir,
            key_type: PhantomData,
            value_type: PhantomData,
        })
    }

    /// The directory values are written to.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn make_path(&self, key: &Key) -> PathBuf {
        self.root_dir.join(key.as_ref().to_base58())
    }
}

#[async_trait]
impl<Key, Value> StorageBackend for FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone + ConditionalSync,
    Value: AsRef<[u8]> + Clone + From<Vec<u8>> + ConditionalSync,
{
    type Key = Key;
    type Value = Value;
    type Error = StorageError;

    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        let path = self.make_path(&key);
        // Replace atomically: write a sibling file, then rename over the target.
        let staging = path.with_extension("tmp");
        tokio::fs::write(&staging, value)
            .await
            .map_err(|error| StorageError::StorageBackend(format!("{error}")))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|error| StorageError::StorageBackend(format!("{error}")))?;
        Ok(())
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        let path = self.make_path(key);
        if !path.exists() {
            return Ok(None);
        }

        tokio::fs::read(path)
            .await
            .map(|value| Some(Value::from(value)))
            .map_err(|error| StorageError::StorageBackend(format!("{error}")))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[tokio::test]
    async fn it_persists_values_across_instances() -> Result<()> {
        let root = tempfile::tempdir()?;
        let mut backend = FileSystemStorageBackend::<Vec<u8>, Vec<u8>>::new(root.path()).await?;

        backend.set(b"profile".to_vec(), vec![1, 2, 3]).await?;
        backend.set(b"profile".to_vec(), vec![4, 5]).await?;

        let reopened = FileSystemStorageBackend::<Vec<u8>, Vec<u8>>::new(root.path()).await?;
        assert_eq!(reopened.get(&b"profile".to_vec()).await?, Some(vec![4, 5]));
        assert_eq!(reopened.get(&b"missing".to_vec()).await?, None);
        Ok(())
    }
}
